//! Line buffer capturing the console output of one background task.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use parley_types::ConsoleSink;

#[derive(Debug, Default)]
struct OutputState {
    lines: VecDeque<String>,
    /// Text written since the last newline.
    partial: String,
    /// Lines evicted to stay within the limit.
    dropped: usize,
}

/// Bounded line buffer. Oldest lines are evicted once `limit` is reached.
#[derive(Debug)]
pub struct OutputBuffer {
    state: Mutex<OutputState>,
    limit: usize,
}

impl OutputBuffer {
    /// Buffer keeping the newest `limit` complete lines.
    pub fn new(limit: usize) -> Self {
        Self {
            state: Mutex::new(OutputState::default()),
            limit: limit.max(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, OutputState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every retained line, oldest first, including an unterminated last line.
    pub fn lines(&self) -> Vec<String> {
        let state = self.state();
        let mut lines: Vec<String> = state.lines.iter().cloned().collect();
        if !state.partial.is_empty() {
            lines.push(state.partial.clone());
        }
        lines
    }

    /// The most recent `count` lines, oldest first.
    pub fn tail(&self, count: usize) -> Vec<String> {
        let lines = self.lines();
        let skip = lines.len().saturating_sub(count);
        lines.into_iter().skip(skip).collect()
    }

    pub fn line_count(&self) -> usize {
        let state = self.state();
        state.lines.len() + usize::from(!state.partial.is_empty())
    }

    /// Lines discarded to stay within the limit.
    pub fn dropped(&self) -> usize {
        self.state().dropped
    }

    /// Turn a pending partial line into a complete one.
    pub fn finish(&self) {
        let mut state = self.state();
        if !state.partial.is_empty() {
            let line = std::mem::take(&mut state.partial);
            self.push_line(&mut state, line);
        }
    }

    fn push_line(&self, state: &mut OutputState, line: String) {
        if state.lines.len() >= self.limit {
            state.lines.pop_front();
            state.dropped += 1;
        }
        state.lines.push_back(line);
    }
}

impl ConsoleSink for OutputBuffer {
    fn write(&self, text: &str) {
        let mut state = self.state();
        let mut segments = text.split('\n').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                state.partial.push_str(segment);
                break;
            }
            let mut line = std::mem::take(&mut state.partial);
            line.push_str(segment);
            self.push_line(&mut state, line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_writes_into_lines() {
        let buffer = OutputBuffer::new(10);
        buffer.write("one\ntw");
        buffer.write("o\nthree");
        assert_eq!(buffer.lines(), vec!["one", "two", "three"]);
        buffer.finish();
        assert_eq!(buffer.line_count(), 3);
        buffer.write("four\n");
        assert_eq!(buffer.tail(2), vec!["three", "four"]);
    }

    #[test]
    fn evicts_oldest_lines_past_limit() {
        let buffer = OutputBuffer::new(2);
        buffer.write("a\nb\nc\n");
        assert_eq!(buffer.lines(), vec!["b", "c"]);
        assert_eq!(buffer.dropped(), 1);
    }

    #[test]
    fn tail_larger_than_buffer_returns_everything() {
        let buffer = OutputBuffer::new(5);
        buffer.write("x\n");
        assert_eq!(buffer.tail(100), vec!["x"]);
        assert!(buffer.tail(0).is_empty());
    }
}
