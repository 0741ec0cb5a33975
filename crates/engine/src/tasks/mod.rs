//! Background tasks: handles, the per-session task index, and the worker pool.

mod output;
mod runner;

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parley_types::{Console, InvocationRecord};
use serde::Serialize;

pub use output::OutputBuffer;
pub use runner::TaskRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Done,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug, Clone)]
struct Completion {
    record: InvocationRecord,
    elapsed: Duration,
}

/// One submitted background invocation.
///
/// The handle owns the task's output buffer and receives the invocation record
/// exactly once, when the worker finishes.
pub struct TaskHandle {
    name: String,
    generation: u64,
    line: String,
    submitted_at: DateTime<Utc>,
    started: Instant,
    output: Arc<OutputBuffer>,
    completion: Mutex<Option<Completion>>,
    completed: Condvar,
}

impl TaskHandle {
    /// A running handle whose console keeps at most `output_limit` lines.
    pub fn new(name: impl Into<String>, generation: u64, line: impl Into<String>, output_limit: usize) -> Self {
        Self {
            name: name.into(),
            generation,
            line: line.into(),
            submitted_at: Utc::now(),
            started: Instant::now(),
            output: Arc::new(OutputBuffer::new(output_limit)),
            completion: Mutex::new(None),
            completed: Condvar::new(),
        }
    }

    fn completion(&self) -> MutexGuard<'_, Option<Completion>> {
        self.completion.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submission counter value; later submissions have larger generations.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The command line the task runs.
    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Console whose output lands in this task's buffer.
    pub fn console(&self) -> Console {
        Console::new(self.output.clone())
    }

    /// Captured console output.
    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    pub fn status(&self) -> TaskStatus {
        if self.completion().is_some() { TaskStatus::Done } else { TaskStatus::Running }
    }

    pub fn is_done(&self) -> bool {
        self.status() == TaskStatus::Done
    }

    /// Time from submission to completion, or to now while running.
    pub fn elapsed(&self) -> Duration {
        match self.completion().as_ref() {
            Some(completion) => completion.elapsed,
            None => self.started.elapsed(),
        }
    }

    /// The finished task's record; `None` while running.
    pub fn record(&self) -> Option<InvocationRecord> {
        self.completion().as_ref().map(|completion| completion.record.clone())
    }

    /// Store the record. Only the first call has an effect.
    pub fn complete(&self, record: InvocationRecord) {
        let mut completion = self.completion();
        if completion.is_some() {
            return;
        }
        self.output.finish();
        *completion = Some(Completion {
            record,
            elapsed: self.started.elapsed(),
        });
        self.completed.notify_all();
    }

    /// Block until the task completes or `timeout` passes.
    pub fn wait(&self, timeout: Duration) -> Option<InvocationRecord> {
        let guard = self.completion();
        let (guard, _) = self
            .completed
            .wait_timeout_while(guard, timeout, |completion| completion.is_none())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.as_ref().map(|completion| completion.record.clone())
    }

    /// Listing row for this task; `live` tells whether it is the current handle for its name.
    pub fn summary(&self, live: bool) -> TaskSummary {
        TaskSummary {
            name: self.name.clone(),
            generation: self.generation,
            status: self.status(),
            elapsed_ms: self.elapsed().as_millis() as u64,
            live,
        }
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.name)
            .field("generation", &self.generation)
            .field("status", &self.status())
            .finish()
    }
}

/// Listing entry for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub name: String,
    pub generation: u64,
    pub status: TaskStatus,
    pub elapsed_ms: u64,
    /// `false` once a newer submission took over the name.
    pub live: bool,
}

#[derive(Debug, Default)]
struct TaskTable {
    live: IndexMap<String, Arc<TaskHandle>>,
    retired: Vec<Arc<TaskHandle>>,
    next_generation: u64,
}

/// A session's tasks: at most one live handle per name, plus retired ones.
#[derive(Debug, Default)]
pub struct TaskIndex {
    table: Mutex<TaskTable>,
}

impl TaskIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, TaskTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create and index a handle for `name`, retiring any previous live one.
    pub fn open(&self, name: &str, line: &str, output_limit: usize) -> Arc<TaskHandle> {
        let mut table = self.table();
        table.next_generation += 1;
        let handle = Arc::new(TaskHandle::new(name, table.next_generation, line, output_limit));
        if let Some(previous) = table.live.shift_remove(name) {
            table.retired.push(previous);
        }
        table.live.insert(name.to_string(), Arc::clone(&handle));
        handle
    }

    /// The live handle for `name`.
    pub fn get(&self, name: &str) -> Option<Arc<TaskHandle>> {
        self.table().live.get(name).cloned()
    }

    /// Retired handles for `name`, oldest first.
    pub fn retired(&self, name: &str) -> Vec<Arc<TaskHandle>> {
        self.table().retired.iter().filter(|handle| handle.name() == name).cloned().collect()
    }

    /// Live tasks in submission order, then retired ones.
    pub fn list(&self) -> Vec<TaskSummary> {
        let table = self.table();
        table
            .live
            .values()
            .map(|handle| handle.summary(true))
            .chain(table.retired.iter().map(|handle| handle.summary(false)))
            .collect()
    }

    /// Output of the live task `name`.
    ///
    /// A negative `last` returns every retained line.
    pub fn show_output(&self, name: &str, last: i64) -> Option<Vec<String>> {
        let handle = self.get(name)?;
        let lines = match usize::try_from(last) {
            Ok(count) => handle.output().tail(count),
            Err(_) => handle.output().lines(),
        };
        Some(lines)
    }

    /// Drop handles from the index; running tasks keep running.
    ///
    /// Returns how many handles were removed.
    pub fn clear(&self, only_completed: bool) -> usize {
        let mut table = self.table();
        let before = table.live.len() + table.retired.len();
        if only_completed {
            table.live.retain(|_, handle| !handle.is_done());
            table.retired.retain(|handle| !handle.is_done());
        } else {
            table.live.clear();
            table.retired.clear();
        }
        before - table.live.len() - table.retired.len()
    }

    /// Live and retired handles together.
    pub fn len(&self) -> usize {
        let table = self.table();
        table.live.len() + table.retired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn finish(handle: &TaskHandle) {
        let record = InvocationRecord::new(handle.name(), "").complete(Ok(json!("ok")), Duration::from_millis(1));
        handle.complete(record);
    }

    #[test]
    fn resubmission_retires_previous_handle() {
        let index = TaskIndex::new();
        let first = index.open("build", "build", 10);
        let second = index.open("build", "build --release", 10);

        assert_eq!(index.get("build").map(|handle| handle.generation()), Some(second.generation()));
        let retired = index.retired("build");
        assert_eq!(retired.len(), 1);
        assert!(Arc::ptr_eq(&retired[0], &first));
        assert!(second.generation() > first.generation());

        let summaries = index.list();
        assert_eq!(summaries.len(), 2);
        assert!(summaries[0].live);
        assert!(!summaries[1].live);
    }

    #[test]
    fn completion_is_recorded_once() {
        let handle = TaskHandle::new("job", 1, "job", 10);
        assert_eq!(handle.status(), TaskStatus::Running);
        finish(&handle);
        let replacement = InvocationRecord::new("other", "").complete(Ok(json!(2)), Duration::ZERO);
        handle.complete(replacement);
        assert_eq!(handle.record().map(|record| record.command), Some("job".to_string()));
        assert_eq!(handle.wait(Duration::from_millis(1)).map(|record| record.result), Some(json!("ok")));
    }

    #[test]
    fn show_output_with_negative_count_returns_all() {
        let index = TaskIndex::new();
        let handle = index.open("log", "log", 10);
        handle.console().println("a");
        handle.console().println("b");
        handle.console().println("c");
        assert_eq!(index.show_output("log", 2), Some(vec!["b".to_string(), "c".to_string()]));
        assert_eq!(index.show_output("log", -1).map(|lines| lines.len()), Some(3));
        assert_eq!(index.show_output("missing", -1), None);
    }

    #[test]
    fn clear_only_completed_keeps_running_tasks() {
        let index = TaskIndex::new();
        let done = index.open("done", "done", 10);
        finish(&done);
        index.open("running", "running", 10);
        assert_eq!(index.clear(true), 1);
        assert!(index.get("running").is_some());
        assert_eq!(index.clear(false), 1);
        assert!(index.is_empty());
    }
}
