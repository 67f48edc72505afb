//! Run-scoped logging context.
//!
//! No global subscriber is installed. A `RunLog` owns a tracing dispatcher,
//! is built once at process start, and is handed by reference to whatever
//! needs to emit events. `in_scope` makes it the active dispatcher for the
//! duration of a closure, so plain `tracing::*!` macros inside land there.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tracing::{Dispatch, Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;

/// Explicit observability context for a pipeline invocation.
#[derive(Clone)]
pub struct RunLog {
    dispatch: Dispatch,
}

impl RunLog {
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    pub fn from_subscriber<S>(subscriber: S) -> Self
    where
        S: Subscriber + Send + Sync + 'static,
    {
        Self::new(Dispatch::new(subscriber))
    }

    /// A context that drops every event.
    pub fn disabled() -> Self {
        Self::new(Dispatch::none())
    }

    /// A context that records formatted events in memory.
    pub fn capture(level: Level) -> (Self, LogBuffer) {
        let buffer = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buffer.clone())
            .with_ansi(false)
            .with_target(false)
            .with_max_level(level)
            .finish();
        (Self::from_subscriber(subscriber), buffer)
    }

    /// Run `f` with this context as the active dispatcher.
    pub fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

impl std::fmt::Debug for RunLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLog").finish_non_exhaustive()
    }
}

/// Shared in-memory sink for captured log lines.
#[derive(Clone, Default)]
pub struct LogBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl LogBuffer {
    /// Everything captured so far.
    pub fn contents(&self) -> String {
        self.bytes
            .lock()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default()
    }

    /// Number of captured lines containing `needle`.
    pub fn count_lines(&self, needle: &str) -> usize {
        self.contents()
            .lines()
            .filter(|line| line.contains(needle))
            .count()
    }
}

/// Writer handed out to the formatter for each event.
pub struct LogBufferWriter {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl Write for LogBufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self
            .bytes
            .lock()
            .map_err(|_| io::Error::other("log buffer lock poisoned"))?;
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogBufferWriter {
            bytes: Arc::clone(&self.bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_records_events_in_scope() {
        let (log, buffer) = RunLog::capture(Level::DEBUG);

        log.in_scope(|| {
            tracing::debug!(attempt = 1, "Trying to connect to URL");
            tracing::info!("done");
        });

        assert_eq!(buffer.count_lines("Trying to connect"), 1);
        assert!(buffer.contents().contains("attempt=1"));
        assert_eq!(buffer.count_lines("done"), 1);
    }

    #[test]
    fn test_capture_respects_level() {
        let (log, buffer) = RunLog::capture(Level::INFO);

        log.in_scope(|| {
            tracing::debug!("hidden");
            tracing::warn!("shown");
        });

        assert_eq!(buffer.count_lines("hidden"), 0);
        assert_eq!(buffer.count_lines("shown"), 1);
    }

    #[test]
    fn test_events_outside_scope_are_not_captured() {
        let (log, buffer) = RunLog::capture(Level::DEBUG);

        tracing::info!("outside");
        log.in_scope(|| tracing::info!("inside"));

        assert_eq!(buffer.count_lines("outside"), 0);
        assert_eq!(buffer.count_lines("inside"), 1);
    }

    #[test]
    fn test_disabled_log_runs_closure() {
        let log = RunLog::disabled();
        let value = log.in_scope(|| {
            tracing::error!("nobody listens");
            42
        });
        assert_eq!(value, 42);
    }
}
