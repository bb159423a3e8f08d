//! Bounded log buffer shared by the handlers of one scheduler.
//!
//! Handlers log through [`ModeControl::log`](crate::ModeControl::log); lines are
//! held here until the scheduler flushes them to its [`LogSink`] at the start
//! of the next tick. The buffer never allocates: each line is truncated to
//! [`MAX_LOG_LINE`] bytes and at most [`LOG_CAPACITY`] lines are kept.

use alloc::boxed::Box;
use core::fmt::{self, Write as _};

use heapless::{Deque, String};

/// Number of lines buffered between flushes.
pub const LOG_CAPACITY: usize = 64;

/// Maximum length of a single buffered line, in bytes.
pub const MAX_LOG_LINE: usize = 120;

/// One buffered log line.
pub type LogLine = String<MAX_LOG_LINE>;

/// Destination for flushed log lines.
pub trait LogSink {
    fn write_line(&mut self, line: &str);
}

impl<F> LogSink for F
where
    F: FnMut(&str),
{
    fn write_line(&mut self, line: &str) {
        self(line);
    }
}

/// Fixed-capacity FIFO of log lines with an optional sink.
///
/// When the buffer fills up it flushes to the sink if one is attached;
/// otherwise the oldest line is dropped and counted. The drop count is
/// reported as a line of its own on the next flush.
pub struct LogBuffer {
    lines: Deque<LogLine, LOG_CAPACITY>,
    sink: Option<Box<dyn LogSink>>,
    dropped: usize,
    enabled: bool,
}

impl LogBuffer {
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self {
            lines: Deque::new(),
            sink: None,
            dropped: 0,
            enabled,
        }
    }

    /// Installs (or replaces) the flush destination.
    pub fn set_sink(&mut self, sink: Box<dyn LogSink>) {
        self.sink = Some(sink);
    }

    /// Removes the flush destination, returning it.
    pub fn take_sink(&mut self) -> Option<Box<dyn LogSink>> {
        self.sink.take()
    }

    #[must_use]
    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Formats and buffers one line.
    pub fn push(&mut self, args: fmt::Arguments<'_>) {
        if !self.enabled {
            return;
        }

        let mut line = LogLine::new();
        let _ = Truncating(&mut line).write_fmt(args);

        if self.lines.is_full() {
            if self.sink.is_some() {
                self.flush();
            } else {
                self.lines.pop_front();
                self.dropped += 1;
            }
        }
        let _ = self.lines.push_back(line);
    }

    /// Writes buffered lines to the sink, or discards them when none is set.
    pub fn flush(&mut self) {
        let Some(sink) = self.sink.as_mut() else {
            self.lines.clear();
            return;
        };

        if self.dropped > 0 {
            let mut notice = LogLine::new();
            let _ = write!(Truncating(&mut notice), "({} log lines dropped)", self.dropped);
            sink.write_line(notice.as_str());
            self.dropped = 0;
        }
        while let Some(line) = self.lines.pop_front() {
            sink.write_line(line.as_str());
        }
    }

    /// Buffered lines, oldest first.
    pub fn lines(&self) -> impl Iterator<Item = &str> + '_ {
        self.lines.iter().map(LogLine::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines dropped since the last flush.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl fmt::Debug for LogBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogBuffer")
            .field("lines", &self.lines.len())
            .field("dropped", &self.dropped)
            .field("enabled", &self.enabled)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

// Cuts a line at capacity instead of failing the whole write.
struct Truncating<'a>(&'a mut LogLine);

impl fmt::Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.chars() {
            if self.0.push(ch).is_err() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use alloc::string::String as StdString;
    use alloc::vec::Vec as StdVec;
    use core::cell::RefCell;

    fn capture() -> (Rc<RefCell<StdVec<StdString>>>, Box<dyn LogSink>) {
        let lines = Rc::new(RefCell::new(StdVec::new()));
        let sink_lines = Rc::clone(&lines);
        let sink: Box<dyn LogSink> =
            Box::new(move |line: &str| sink_lines.borrow_mut().push(line.into()));
        (lines, sink)
    }

    #[test]
    fn flush_drains_in_order() {
        let (lines, sink) = capture();
        let mut buffer = LogBuffer::default();
        buffer.set_sink(sink);
        buffer.push(format_args!("first {}", 1));
        buffer.push(format_args!("second"));
        assert_eq!(buffer.len(), 2);

        buffer.flush();
        assert!(buffer.is_empty());
        assert_eq!(*lines.borrow(), ["first 1", "second"]);
    }

    #[test]
    fn long_lines_are_truncated() {
        let mut buffer = LogBuffer::default();
        let long = "x".repeat(MAX_LOG_LINE * 2);
        buffer.push(format_args!("{long}"));
        let line = buffer.lines().next().expect("line buffered");
        assert_eq!(line.len(), MAX_LOG_LINE);
    }

    #[test]
    fn overflow_without_sink_drops_oldest() {
        let mut buffer = LogBuffer::default();
        for index in 0..LOG_CAPACITY + 3 {
            buffer.push(format_args!("line {index}"));
        }
        assert_eq!(buffer.len(), LOG_CAPACITY);
        assert_eq!(buffer.dropped(), 3);
        assert_eq!(buffer.lines().next(), Some("line 3"));

        let (lines, sink) = capture();
        buffer.set_sink(sink);
        buffer.flush();
        assert_eq!(lines.borrow()[0], "(3 log lines dropped)");
        assert_eq!(lines.borrow().len(), LOG_CAPACITY + 1);
        assert_eq!(buffer.dropped(), 0);
    }

    #[test]
    fn overflow_with_sink_flushes_early() {
        let (lines, sink) = capture();
        let mut buffer = LogBuffer::default();
        buffer.set_sink(sink);
        for index in 0..=LOG_CAPACITY {
            buffer.push(format_args!("line {index}"));
        }
        assert_eq!(lines.borrow().len(), LOG_CAPACITY);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.dropped(), 0);
    }

    #[test]
    fn disabled_buffer_ignores_lines() {
        let mut buffer = LogBuffer::new(false);
        buffer.push(format_args!("ignored"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn flush_without_sink_discards() {
        let mut buffer = LogBuffer::default();
        buffer.push(format_args!("gone"));
        buffer.flush();
        assert!(buffer.is_empty());
    }
}
