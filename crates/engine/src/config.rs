use std::{env, io::Error, path::Path, path::PathBuf};

use dirs_next::config_dir;
use parley_util::{expand_tilde, parse_bool_literal};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "PARLEY_CONFIG_PATH";
pub const HISTORY_LIMIT_ENV: &str = "PARLEY_HISTORY_LIMIT";
pub const WORKERS_ENV: &str = "PARLEY_WORKERS";
pub const SHOW_FAILURE_DETAIL_ENV: &str = "PARLEY_SHOW_FAILURE_DETAIL";

/// Interpreter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Invocation records kept per session; oldest are evicted first.
    pub history_limit: usize,
    /// Background task workers.
    pub worker_threads: usize,
    /// Append the full error chain when rendering handler failures.
    pub show_failure_detail: bool,
    /// Lines of captured output kept per background task.
    pub task_output_limit: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            worker_threads: 4,
            show_failure_detail: false,
            task_output_limit: 10_000,
        }
    }
}

impl InterpreterConfig {
    /// Load from the default path, then apply environment overrides.
    ///
    /// A missing or unreadable file yields the defaults.
    pub fn load() -> Self {
        Self::load_from(&default_config_path()).with_env_overrides()
    }

    /// Reads `path`; a missing or unreadable file yields the defaults.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str::<Self>(&content) {
            Ok(config) => config.normalized(),
            Err(error) => {
                warn!(path = %path.display(), error = %error, "ignoring invalid config file");
                Self::default()
            }
        }
    }

    /// Writes the config as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Applies `PARLEY_HISTORY_LIMIT`, `PARLEY_WORKERS` and `PARLEY_SHOW_FAILURE_DETAIL` when set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(limit) = env_number(HISTORY_LIMIT_ENV) {
            self.history_limit = limit;
        }
        if let Some(workers) = env_number(WORKERS_ENV) {
            self.worker_threads = workers;
        }
        if let Ok(value) = env::var(SHOW_FAILURE_DETAIL_ENV)
            && let Some(flag) = parse_bool_literal(&value)
        {
            self.show_failure_detail = flag;
        }
        self.normalized()
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self.normalized()
    }

    /// Sets the worker count; zero is raised to one.
    pub fn with_worker_threads(mut self, workers: usize) -> Self {
        self.worker_threads = workers;
        self.normalized()
    }

    pub fn with_failure_detail(mut self, show: bool) -> Self {
        self.show_failure_detail = show;
        self
    }

    /// Worker and buffer sizes of zero are raised to one.
    fn normalized(mut self) -> Self {
        self.worker_threads = self.worker_threads.max(1);
        self.task_output_limit = self.task_output_limit.max(1);
        self
    }
}

fn env_number(name: &str) -> Option<usize> {
    let value = env::var(name).ok()?;
    match value.trim().parse() {
        Ok(number) => Some(number),
        Err(_) => {
            warn!(variable = name, value = %value, "ignoring non-numeric override");
            None
        }
    }
}

/// Get the default path for the interpreter configuration file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parley")
        .join("config.json")
}
