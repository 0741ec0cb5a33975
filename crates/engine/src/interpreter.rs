use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use parley_registry::{CoercionRegistry, CommandRegistry, FormFiller, ParserSet};
use parley_types::{ArgValue, CoercionError, CommandDescriptor, Console, DestroyFailure, InitializationFailure, InvocationRecord};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::InterpreterConfig;
use crate::dispatch::Dispatcher;
use crate::session::{SessionContext, SessionGuard, SessionKey, SessionManager, run_as};
use crate::tasks::{TaskHandle, TaskRunner, TaskSummary};

/// How long shutdown waits for running background tasks.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("cannot submit an empty command line")]
    EmptyLine,

    #[error("the task runner has shut down")]
    Stopped,
}

/// Collects registrations and settings before the interpreter starts.
pub struct InterpreterBuilder {
    config: InterpreterConfig,
    registry: CommandRegistry,
    coercion: CoercionRegistry,
    presets: HashMap<String, ArgValue>,
    console: Console,
    sessions: Arc<SessionManager>,
}

impl InterpreterBuilder {
    /// Starts from an empty registry with the built-in strategies.
    pub fn new(config: InterpreterConfig) -> Self {
        Self {
            sessions: Arc::new(SessionManager::new(config.history_limit)),
            config,
            registry: CommandRegistry::new(),
            coercion: CoercionRegistry::new(),
            presets: HashMap::new(),
            console: Console::stdout(),
        }
    }

    /// Replace the parsing strategies. Call before registering commands.
    pub fn parsers(mut self, parsers: ParserSet) -> Self {
        self.registry = CommandRegistry::with_parsers(parsers);
        self
    }

    /// Register a descriptor; invalid command descriptors are logged and dropped.
    pub fn register(mut self, descriptor: CommandDescriptor) -> Self {
        self.registry.register(descriptor);
        self
    }

    /// Session manager the built interpreter will use.
    ///
    /// Handlers that read or write the caller's session capture this before
    /// they are registered.
    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }

    /// Direct access for registrations that need the `bool` result of [`CommandRegistry::register`].
    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    /// Add a coercion rule for the type whose display name is `type_name`.
    pub fn coercion<F>(mut self, type_name: impl Into<String>, coerce: F) -> Self
    where
        F: Fn(&str) -> Result<ArgValue, CoercionError> + Send + Sync + 'static,
    {
        self.coercion.register(type_name, coerce);
        self
    }

    /// Fallback for custom types without a registered coercer.
    pub fn form_filler(mut self, filler: Arc<dyn FormFiller>) -> Self {
        self.coercion.set_form_filler(filler);
        self
    }

    /// Value supplied to parameters of the ambient type `type_name`.
    pub fn preset(mut self, type_name: impl Into<String>, value: ArgValue) -> Self {
        self.presets.insert(type_name.into(), value);
        self
    }

    /// Console handed to foreground dispatches (stdout by default).
    pub fn console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    /// Freezes the registry and starts the worker pool.
    ///
    /// # Errors
    ///
    /// Fails when the task runtime cannot be started.
    pub fn build(self) -> io::Result<Interpreter> {
        let runner = TaskRunner::new(self.config.worker_threads)?;
        info!(
            commands = self.registry.commands().count(),
            workers = runner.workers(),
            history_limit = self.config.history_limit,
            "interpreter ready"
        );
        Ok(Interpreter {
            inner: Arc::new(InterpreterInner {
                dispatcher: Arc::new(Dispatcher::new(self.registry, self.coercion, self.presets)),
                sessions: self.sessions,
                runner: Mutex::new(runner),
                console: self.console,
                config: self.config,
                destroyed: AtomicBool::new(false),
            }),
        })
    }
}

impl Default for InterpreterBuilder {
    fn default() -> Self {
        Self::new(InterpreterConfig::default())
    }
}

struct InterpreterInner {
    dispatcher: Arc<Dispatcher>,
    sessions: Arc<SessionManager>,
    runner: Mutex<TaskRunner>,
    console: Console,
    config: InterpreterConfig,
    destroyed: AtomicBool,
}

/// Command interpreter shared by every caller thread.
///
/// Cloning is cheap; clones share registry, sessions and worker pool.
#[derive(Clone)]
pub struct Interpreter {
    inner: Arc<InterpreterInner>,
}

impl Interpreter {
    pub fn builder(config: InterpreterConfig) -> InterpreterBuilder {
        InterpreterBuilder::new(config)
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.inner.config
    }

    /// Registered descriptors, for listing and introspection.
    pub fn registry(&self) -> &CommandRegistry {
        self.inner.dispatcher.registry()
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.inner.sessions
    }

    /// Non-owning handle, for handlers that call back into the interpreter
    /// that owns them.
    pub fn downgrade(&self) -> WeakInterpreter {
        WeakInterpreter {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn runner(&self) -> MutexGuard<'_, TaskRunner> {
        self.inner.runner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run every init handler. Callers should abort startup on failure.
    pub fn init(&self) -> Result<(), InitializationFailure> {
        self.registry().init_all()
    }

    /// Session of the calling thread.
    pub fn session(&self) -> Arc<SessionContext> {
        self.inner.sessions.current()
    }

    /// Open a named session bound to the calling thread until the guard is disposed.
    pub fn create_explicit(&self, name: impl Into<String>) -> SessionGuard {
        self.inner.sessions.create_explicit(name)
    }

    /// Dispatch `line` in the calling thread's session.
    ///
    /// Returns `None` for blank lines.
    pub fn execute(&self, line: &str) -> Option<InvocationRecord> {
        let session = self.session();
        self.inner.dispatcher.dispatch(&session, line, &self.inner.console)
    }

    /// Dispatch `line` in the session identified by `key`.
    pub fn execute_as(&self, key: &SessionKey, line: &str) -> Option<InvocationRecord> {
        run_as(key, || self.execute(line))
    }

    /// Call `name` with already-typed arguments, bypassing parsing.
    pub fn invoke(&self, name: &str, values: Vec<ArgValue>) -> InvocationRecord {
        let session = self.session();
        self.inner.dispatcher.invoke(&session, name, values)
    }

    /// Run `line` on the worker pool as task `task_name`.
    ///
    /// The task dispatches under the caller's session, and any live task with the
    /// same name is retired. Its console output is captured in the handle.
    pub fn submit(&self, task_name: &str, line: &str) -> Result<Arc<TaskHandle>, SubmitError> {
        if line.trim().is_empty() {
            return Err(SubmitError::EmptyLine);
        }
        let key = SessionKey::current();
        let session = self.inner.sessions.get_or_create(&key);

        let runner = self.runner();
        if runner.is_shut_down() {
            return Err(SubmitError::Stopped);
        }
        let handle = session.tasks().open(task_name, line, self.inner.config.task_output_limit);
        let console = handle.console();
        let dispatcher = Arc::clone(&self.inner.dispatcher);
        let line = line.to_string();
        let task_session = Arc::clone(&session);

        runner.spawn(Arc::clone(&handle), move || {
            let record = run_as(&key, || dispatcher.dispatch(&task_session, &line, &console));
            console.flush();
            record.unwrap_or_else(|| InvocationRecord::new("", "").complete(Ok(serde_json::Value::Null), Duration::ZERO))
        });
        debug!(task = task_name, session = %session.key(), "submitted background task");
        Ok(handle)
    }

    /// Tasks of the calling thread's session.
    pub fn list_tasks(&self) -> Vec<TaskSummary> {
        self.session().tasks().list()
    }

    /// Captured output of the live task `name`; all lines when `last` is negative.
    pub fn show_output(&self, name: &str, last: i64) -> Option<Vec<String>> {
        self.session().tasks().show_output(name, last)
    }

    /// Drops task handles from the calling session, returning how many went.
    pub fn clear_tasks(&self, only_completed: bool) -> usize {
        self.session().tasks().clear(only_completed)
    }

    /// Text shown to the caller for `record`.
    pub fn render(&self, record: &InvocationRecord) -> String {
        record.render(self.inner.config.show_failure_detail)
    }

    /// Run destroy handlers and stop the worker pool.
    ///
    /// Destroy handlers run only once, however often this is called.
    pub fn shutdown(&self) -> Vec<DestroyFailure> {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return Vec::new();
        }
        let failures = self.registry().destroy_all();
        if !failures.is_empty() {
            warn!(failures = failures.len(), "destroy handlers reported failures");
        }
        self.runner().shutdown(SHUTDOWN_GRACE);
        info!("interpreter shut down");
        failures
    }
}

/// An [`Interpreter`] reference that does not keep it alive.
#[derive(Debug, Clone, Default)]
pub struct WeakInterpreter {
    inner: Weak<InterpreterInner>,
}

impl WeakInterpreter {
    /// The interpreter, unless every owning handle has been dropped.
    pub fn upgrade(&self) -> Option<Interpreter> {
        self.inner.upgrade().map(|inner| Interpreter { inner })
    }
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("dispatcher", &self.inner.dispatcher)
            .field("sessions", &self.inner.sessions.len())
            .field("config", &self.inner.config)
            .finish()
    }
}
