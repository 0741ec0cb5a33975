use std::io;
use std::sync::Arc;
use std::time::Duration;

use parley_types::InvocationRecord;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, warn};

use super::TaskHandle;

/// Fixed-size pool running background invocations.
///
/// Jobs run on the blocking pool of a dedicated runtime, so at most
/// `workers` jobs execute at once and the rest queue.
pub struct TaskRunner {
    runtime: Option<Runtime>,
    workers: usize,
}

impl TaskRunner {
    /// Starts a runtime that runs at most `workers` tasks at once.
    ///
    /// # Errors
    ///
    /// Fails when the tokio runtime cannot be built.
    pub fn new(workers: usize) -> io::Result<Self> {
        let workers = workers.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers)
            .thread_name("parley-task")
            .enable_time()
            .build()?;
        Ok(Self {
            runtime: Some(runtime),
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` on a worker and store its record on `handle`.
    ///
    /// Returns `false` when the runner has already shut down.
    pub fn spawn<F>(&self, handle: Arc<TaskHandle>, job: F) -> bool
    where
        F: FnOnce() -> InvocationRecord + Send + 'static,
    {
        let Some(runtime) = self.runtime.as_ref() else {
            warn!(task = handle.name(), "task runner is shut down; dropping task");
            return false;
        };
        debug!(task = handle.name(), generation = handle.generation(), "queueing background task");
        runtime.spawn_blocking(move || {
            let record = job();
            debug!(task = handle.name(), success = record.success, "background task finished");
            handle.complete(record);
        });
        true
    }

    /// Stop accepting work and wait up to `timeout` for running jobs.
    pub fn shutdown(&mut self, timeout: Duration) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(timeout);
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.runtime.is_none()
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("workers", &self.workers)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_jobs_and_completes_handles() {
        let runner = TaskRunner::new(2).expect("runtime");
        let handle = Arc::new(TaskHandle::new("sum", 1, "sum 1 2", 10));
        let console = handle.console();
        assert!(runner.spawn(Arc::clone(&handle), move || {
            console.println("working");
            InvocationRecord::new("sum", "1 2").complete(Ok(json!(3)), Duration::ZERO)
        }));
        let record = handle.wait(Duration::from_secs(5)).expect("task completes");
        assert_eq!(record.result, json!(3));
        assert_eq!(handle.output().lines(), vec!["working"]);
    }

    #[test]
    fn concurrency_is_bounded_by_worker_count() {
        let runner = TaskRunner::new(2).expect("runtime");
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..6)
            .map(|index| {
                let handle = Arc::new(TaskHandle::new(format!("t{index}"), index, "", 10));
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                runner.spawn(Arc::clone(&handle), move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(30));
                    active.fetch_sub(1, Ordering::SeqCst);
                    InvocationRecord::new("t", "").complete(Ok(json!(null)), Duration::ZERO)
                });
                handle
            })
            .collect();
        for handle in &handles {
            assert!(handle.wait(Duration::from_secs(5)).is_some());
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn spawn_after_shutdown_is_refused() {
        let mut runner = TaskRunner::new(1).expect("runtime");
        runner.shutdown(Duration::from_millis(100));
        let handle = Arc::new(TaskHandle::new("late", 1, "", 10));
        assert!(!runner.spawn(handle, || InvocationRecord::new("late", "")));
    }
}
