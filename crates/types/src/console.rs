//! Console handle passed to handlers as an ambient argument.
//!
//! Handlers never write to stdout directly; they receive a [`Console`] bound to
//! whatever sink the dispatcher chose. Foreground dispatches get the process
//! stdout, background tasks get their own capture buffer.

use std::fmt;
use std::io::Write;
use std::sync::Arc;

/// Destination for console text.
pub trait ConsoleSink: Send + Sync {
    /// Write raw text. Line breaks are part of `text`.
    fn write(&self, text: &str);

    /// Flush any buffered partial output.
    fn flush(&self) {}
}

/// Cloneable handle over a shared [`ConsoleSink`].
#[derive(Clone)]
pub struct Console {
    sink: Arc<dyn ConsoleSink>,
}

impl Console {
    pub fn new(sink: Arc<dyn ConsoleSink>) -> Self {
        Self { sink }
    }

    /// Console writing to the process stdout.
    pub fn stdout() -> Self {
        Self::new(Arc::new(StdoutSink))
    }

    pub fn print(&self, text: &str) {
        self.sink.write(text);
    }

    pub fn println(&self, text: impl AsRef<str>) {
        let mut line = String::with_capacity(text.as_ref().len() + 1);
        line.push_str(text.as_ref());
        line.push('\n');
        self.sink.write(&line);
    }

    pub fn flush(&self) {
        self.sink.flush();
    }

    /// Whether both handles point at the same sink.
    pub fn same_sink(&self, other: &Console) -> bool {
        Arc::ptr_eq(&self.sink, &other.sink)
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Console")
    }
}

struct StdoutSink;

impl ConsoleSink for StdoutSink {
    fn write(&self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
    }

    fn flush(&self) {
        let _ = std::io::stdout().lock().flush();
    }
}
