use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use parley_engine::{Interpreter, InterpreterConfig};
use tracing::warn;

mod commands;

/// Line-oriented shell over the Parley interpreter.
#[derive(Debug, Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Config file to use instead of the default location.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Invocation records kept per session.
    #[arg(long, value_name = "N")]
    history_limit: Option<usize>,

    /// Background task workers.
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Show the full error chain for failed commands.
    #[arg(long)]
    show_detail: bool,

    /// Run these lines and exit instead of reading stdin.
    #[arg(short = 'c', long = "command", value_name = "LINE")]
    commands: Vec<String>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => InterpreterConfig::load_from(path).with_env_overrides(),
        None => InterpreterConfig::load(),
    };
    if let Some(limit) = cli.history_limit {
        config = config.with_history_limit(limit);
    }
    if let Some(workers) = cli.workers {
        config = config.with_worker_threads(workers);
    }
    if cli.show_detail {
        config = config.with_failure_detail(true);
    }

    let shell = commands::build(config)?;
    shell.interpreter.init().context("startup aborted")?;

    if cli.commands.is_empty() {
        repl(&shell)?;
    } else {
        for line in &cli.commands {
            run_line(&shell.interpreter, line);
            if shell.exit_requested() {
                break;
            }
        }
    }

    for failure in shell.interpreter.shutdown() {
        warn!(error = %failure, "shutdown");
    }
    Ok(())
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn repl(shell: &commands::Shell) -> Result<()> {
    let stdin = std::io::stdin();
    let interactive = stdin.is_terminal();
    let mut lines = stdin.lock().lines();
    loop {
        if interactive {
            print!("parley> ");
            std::io::stdout().flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        run_line(&shell.interpreter, &line.context("reading stdin")?);
        if shell.exit_requested() {
            break;
        }
    }
    Ok(())
}

fn run_line(interpreter: &Interpreter, line: &str) {
    let Some(record) = interpreter.execute(line) else {
        return;
    };
    let rendered = interpreter.render(&record);
    if record.success {
        if !rendered.is_empty() {
            println!("{rendered}");
        }
    } else {
        eprintln!("error: {rendered}");
    }
}
