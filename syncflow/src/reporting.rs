//! Process-wide reporting of errors that end processing of a key.
//!
//! When an error is classified as not worth retrying, the key is dropped
//! from the queue. The error is never swallowed: it goes to the installed
//! [`ErrorSink`], or to a logging sink that also counts it.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::error;

/// Receives errors that stopped processing of a key.
#[cfg_attr(test, mockall::automock)]
pub trait ErrorSink: Send + Sync {
    /// Handles one error. Must not panic.
    fn handle_error(&self, err: &anyhow::Error);
}

/// An error sink that logs through `tracing` and counts what it saw.
#[derive(Debug, Default)]
pub struct LoggingErrorSink {
    reported: AtomicU64,
}

impl LoggingErrorSink {
    /// Creates a new logging sink.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reported: AtomicU64::new(0),
        }
    }

    /// Returns how many errors this sink has handled.
    #[must_use]
    pub fn reported(&self) -> u64 {
        self.reported.load(Ordering::Relaxed)
    }
}

impl ErrorSink for LoggingErrorSink {
    fn handle_error(&self, err: &anyhow::Error) {
        self.reported.fetch_add(1, Ordering::Relaxed);
        error!(error = %format!("{err:#}"), "giving up on key after non-retryable error");
    }
}

static DEFAULT_ERROR_SINK: LoggingErrorSink = LoggingErrorSink::new();

static GLOBAL_ERROR_SINK: RwLock<Option<Arc<dyn ErrorSink>>> = RwLock::new(None);

/// Installs the process-wide error sink.
pub fn set_error_sink(sink: Arc<dyn ErrorSink>) {
    *GLOBAL_ERROR_SINK.write() = Some(sink);
}

/// Restores the default logging sink.
pub fn clear_error_sink() {
    *GLOBAL_ERROR_SINK.write() = None;
}

/// Returns the installed error sink, if any.
#[must_use]
pub fn error_sink() -> Option<Arc<dyn ErrorSink>> {
    GLOBAL_ERROR_SINK.read().clone()
}

/// Reports an error to the installed sink, or to the default logging sink.
pub fn handle_error(err: &anyhow::Error) {
    match error_sink() {
        Some(sink) => sink.handle_error(err),
        None => DEFAULT_ERROR_SINK.handle_error(err),
    }
}

/// Returns how many errors the default logging sink has reported.
#[must_use]
pub fn default_reported_count() -> u64 {
    DEFAULT_ERROR_SINK.reported()
}
