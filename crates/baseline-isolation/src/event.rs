//! Lifecycle events passed to isolators at each phase.
//!
//! Events are immutable and handed to isolators by shared reference. The
//! suite-start and restore events carry an [`OutputSink`] for progress lines.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Shared, line-oriented writer for progress messages.
#[derive(Clone)]
pub struct OutputSink {
    inner: Arc<Mutex<dyn Write + Send>>,
}

impl OutputSink {
    /// Wraps an arbitrary writer.
    pub fn new<W>(writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// Writes progress to standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Discards everything written.
    #[must_use]
    pub fn discard() -> Self {
        Self::new(io::sink())
    }

    /// Creates a sink whose output can be read back through the returned
    /// [`CapturedOutput`].
    #[must_use]
    pub fn capture() -> (Self, CapturedOutput) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Self::new(SharedBuffer {
            buffer: Arc::clone(&buffer),
        });
        (sink, CapturedOutput { buffer })
    }

    /// Writes `line` followed by a newline and flushes.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the writer fails.
    pub fn writeln(&self, line: &str) -> io::Result<()> {
        let mut writer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{line}")?;
        writer.flush()
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("OutputSink").finish_non_exhaustive()
    }
}

impl Default for OutputSink {
    fn default() -> Self {
        Self::discard()
    }
}

/// Read side of an [`OutputSink::capture`] pair.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedOutput {
    /// Returns everything written so far, lossily decoded as UTF-8.
    #[must_use]
    pub fn contents(&self) -> String {
        let bytes = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

struct SharedBuffer {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for SharedBuffer {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Fired once when the suite starts, before any test runs.
#[derive(Debug, Clone, Default)]
pub struct BeforeStartTestsEvent {
    output: OutputSink,
}

impl BeforeStartTestsEvent {
    /// Creates the event with the sink that receives progress lines.
    #[must_use]
    pub const fn new(output: OutputSink) -> Self {
        Self { output }
    }

    /// Progress sink for the suite.
    #[must_use]
    pub const fn output(&self) -> &OutputSink {
        &self.output
    }
}

/// Fired before each isolated test unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeforeIsolatedTestEvent {
    test: Option<String>,
}

impl BeforeIsolatedTestEvent {
    /// Creates the event, optionally naming the test about to run.
    #[must_use]
    pub const fn new(test: Option<String>) -> Self {
        Self { test }
    }

    /// Title of the test about to run.
    #[must_use]
    pub fn test(&self) -> Option<&str> {
        self.test.as_deref()
    }
}

/// Fired after each isolated test unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AfterIsolatedTestEvent {
    test: Option<String>,
}

impl AfterIsolatedTestEvent {
    /// Creates the event, optionally naming the test that finished.
    #[must_use]
    pub const fn new(test: Option<String>) -> Self {
        Self { test }
    }

    /// Title of the test that finished.
    #[must_use]
    pub fn test(&self) -> Option<&str> {
        self.test.as_deref()
    }
}

/// Fired once when the suite finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AfterFinishTestsEvent;

/// Fired when the harness asks isolators to re-sync to their baseline.
#[derive(Debug, Clone, Default)]
pub struct RestoreStateEvent {
    output: OutputSink,
}

impl RestoreStateEvent {
    /// Creates the event with the sink that receives progress lines.
    #[must_use]
    pub const fn new(output: OutputSink) -> Self {
        Self { output }
    }

    /// Progress sink for the restore.
    #[must_use]
    pub const fn output(&self) -> &OutputSink {
        &self.output
    }
}

#[cfg(test)]
#[expect(
    clippy::expect_used,
    reason = "test code uses expect for clarity and assertions"
)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn captured_output_collects_lines() {
        let (sink, captured) = OutputSink::capture();
        let event = BeforeStartTestsEvent::new(sink.clone());
        event.output().writeln("first").expect("write first line");
        sink.writeln("second").expect("write second line");
        assert_eq!(captured.contents(), "first\nsecond\n");
    }

    #[rstest]
    fn test_events_expose_titles() {
        let before = BeforeIsolatedTestEvent::new(Some(String::from("Checkout")));
        assert_eq!(before.test(), Some("Checkout"));
        assert_eq!(AfterIsolatedTestEvent::default().test(), None);
    }
}
