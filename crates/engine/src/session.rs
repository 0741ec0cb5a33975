//! Per-caller sessions.
//!
//! Every thread gets an implicit session the first time it dispatches. A caller
//! can also open an explicit, named session; the name is bound to the calling
//! thread until the returned guard is disposed, after which the thread falls
//! back to whatever it was bound to before.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use parley_types::InvocationRecord;
use serde_json::{Map, Value};
use tracing::debug;

use crate::tasks::TaskIndex;

thread_local! {
    static BOUND_SESSION: RefCell<Option<SessionKey>> = const { RefCell::new(None) };
}

/// Identity of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionKey {
    /// Implicit session of a thread.
    Thread(ThreadId),
    /// Explicit session opened by name.
    Named(String),
}

impl SessionKey {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Key the calling thread dispatches under: its bound session, else its own.
    pub fn current() -> Self {
        BOUND_SESSION
            .with(|bound| bound.borrow().clone())
            .unwrap_or_else(|| Self::Thread(thread::current().id()))
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thread(id) => write!(f, "{id:?}"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

fn bind(key: Option<SessionKey>) -> Option<SessionKey> {
    BOUND_SESSION.with(|bound| bound.replace(key))
}

/// Run `work` with `key` bound to the calling thread, restoring the previous
/// binding afterwards (also on unwind).
pub fn run_as<R>(key: &SessionKey, work: impl FnOnce() -> R) -> R {
    struct Restore(Option<SessionKey>);
    impl Drop for Restore {
        fn drop(&mut self) {
            bind(self.0.take());
        }
    }
    let _restore = Restore(bind(Some(key.clone())));
    work()
}

/// Which records to return from a session's history, and which fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Only records of this command.
    pub command: Option<String>,
    /// At most this many records, newest first.
    pub limit: Option<usize>,
    /// Project each record onto these fields; empty keeps every field.
    pub fields: Vec<String>,
}

impl HistoryQuery {
    /// A query returning every record with every field.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only records of `command`.
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Adds `field` to the projection, e.g. `result` or `elapsed_ms`.
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }
}

/// State owned by one session.
pub struct SessionContext {
    key: SessionKey,
    variables: Mutex<HashMap<String, Value>>,
    history: Mutex<VecDeque<InvocationRecord>>,
    history_limit: usize,
    tasks: TaskIndex,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionContext {
    /// An empty context keeping at most `history_limit` records.
    pub fn new(key: SessionKey, history_limit: usize) -> Self {
        Self {
            key,
            variables: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            history_limit,
            tasks: TaskIndex::new(),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Identity shown to filters and logs.
    pub fn label(&self) -> String {
        self.key.to_string()
    }

    /// Stores `value` for `${name}` placeholders, returning the previous value.
    pub fn set_variable(&self, name: impl Into<String>, value: Value) -> Option<Value> {
        lock(&self.variables).insert(name.into(), value)
    }

    pub fn variable(&self, name: &str) -> Option<Value> {
        lock(&self.variables).get(name).cloned()
    }

    pub fn remove_variable(&self, name: &str) -> Option<Value> {
        lock(&self.variables).remove(name)
    }

    /// Snapshot of every variable, sorted by name.
    pub fn variables(&self) -> Vec<(String, Value)> {
        let mut variables: Vec<_> = lock(&self.variables).iter().map(|(name, value)| (name.clone(), value.clone())).collect();
        variables.sort_by(|left, right| left.0.cmp(&right.0));
        variables
    }

    /// Append a record, evicting the oldest past the history limit.
    pub fn push_record(&self, record: InvocationRecord) {
        let mut history = lock(&self.history);
        history.push_back(record);
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }

    /// Most recent record, if any.
    pub fn last_record(&self) -> Option<InvocationRecord> {
        lock(&self.history).back().cloned()
    }

    /// History, oldest first.
    pub fn history(&self) -> Vec<InvocationRecord> {
        lock(&self.history).iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        lock(&self.history).len()
    }

    /// Matching records as JSON objects, newest first.
    pub fn query(&self, query: &HistoryQuery) -> Vec<Value> {
        let history = lock(&self.history);
        let matching = history
            .iter()
            .rev()
            .filter(|record| query.command.as_deref().is_none_or(|command| record.command == command));
        let limit = query.limit.unwrap_or(usize::MAX);
        matching.take(limit).map(|record| project(record, &query.fields)).collect()
    }

    /// Background tasks submitted from this session.
    pub fn tasks(&self) -> &TaskIndex {
        &self.tasks
    }

    /// Drop variables, history and indexed tasks.
    pub fn reset(&self) {
        lock(&self.variables).clear();
        lock(&self.history).clear();
        self.tasks.clear(false);
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("key", &self.key)
            .field("history_len", &self.history_len())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

fn project(record: &InvocationRecord, fields: &[String]) -> Value {
    let full = serde_json::to_value(record).unwrap_or(Value::Null);
    if fields.is_empty() {
        return full;
    }
    let mut projected = Map::with_capacity(fields.len());
    for field in fields {
        projected.insert(field.clone(), full.get(field).cloned().unwrap_or(Value::Null));
    }
    Value::Object(projected)
}

/// All live sessions.
#[derive(Debug)]
pub struct SessionManager {
    sessions: Mutex<HashMap<SessionKey, Arc<SessionContext>>>,
    history_limit: usize,
}

impl SessionManager {
    /// A manager whose sessions keep at most `history_limit` records each.
    pub fn new(history_limit: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            history_limit,
        }
    }

    /// Session of the calling thread, created on first use.
    pub fn current(&self) -> Arc<SessionContext> {
        self.get_or_create(&SessionKey::current())
    }

    /// The context for `key`, without creating one.
    pub fn get(&self, key: &SessionKey) -> Option<Arc<SessionContext>> {
        lock(&self.sessions).get(key).cloned()
    }

    /// The one context for `key`, created on first use.
    ///
    /// Every caller asking for the same key receives the same `Arc`.
    pub fn get_or_create(&self, key: &SessionKey) -> Arc<SessionContext> {
        let mut sessions = lock(&self.sessions);
        let session = sessions.entry(key.clone()).or_insert_with(|| {
            debug!(session = %key, "creating session");
            Arc::new(SessionContext::new(key.clone(), self.history_limit))
        });
        Arc::clone(session)
    }

    /// Forgets `key`. Holders of the returned context keep it, detached from the manager.
    pub fn remove(&self, key: &SessionKey) -> Option<Arc<SessionContext>> {
        lock(&self.sessions).remove(key)
    }

    /// Number of known identities.
    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open (or reuse) the named session and bind it to the calling thread.
    pub fn create_explicit(&self, name: impl Into<String>) -> SessionGuard {
        let key = SessionKey::Named(name.into());
        let session = self.get_or_create(&key);
        let previous = bind(Some(key.clone()));
        debug!(session = %key, "bound explicit session");
        SessionGuard {
            session,
            previous: Some(previous),
            _thread_bound: PhantomData,
        }
    }
}

/// Disposer for an explicit session.
///
/// Disposing (or dropping) clears the session's variables, history and tasks in
/// place and restores the thread's previous binding. The context itself stays
/// registered, so every holder keeps seeing the one context for its identity.
/// The guard must be dropped on the thread that opened it.
#[must_use = "dropping the guard disposes the session immediately"]
pub struct SessionGuard {
    session: Arc<SessionContext>,
    /// `None` once disposed.
    previous: Option<Option<SessionKey>>,
    _thread_bound: PhantomData<Rc<()>>,
}

impl SessionGuard {
    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn key(&self) -> &SessionKey {
        self.session.key()
    }

    /// Clears the session and restores the previous binding.
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(previous) = self.previous.take() else {
            return;
        };
        self.session.reset();
        bind(previous);
        debug!(session = %self.session.key(), "disposed explicit session");
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard").field("key", self.key()).finish()
    }
}
