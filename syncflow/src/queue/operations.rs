//! Per-key terminal operations.

use super::classify::{should_retry, RetryDecision};
use crate::cancellation::CancellationToken;
use crate::context::{Context, Key};
use crate::reporting::{self, ErrorSink};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Callback that marks the key fully processed.
pub type DoneFn = Arc<dyn Fn() + Send + Sync>;

/// Callback that re-adds the key after a delay. A zero delay asks the driver
/// for an immediate, rate-limited re-add.
pub type RequeueAfterFn = Arc<dyn Fn(Duration) + Send + Sync>;

/// The terminal action taken for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// The key was marked processed.
    Done,
    /// The key was re-added immediately, rate limited.
    Requeue,
    /// The key was re-added after a delay.
    RequeueAfter(Duration),
}

/// Control surface a handler pipeline uses to finish processing one key.
///
/// Every terminal call cancels the pass's token. Only the first terminal call
/// reaches the driver; later ones are logged and ignored.
pub struct Operations {
    done: DoneFn,
    requeue_after: RequeueAfterFn,
    cancel: Arc<CancellationToken>,
    error_sink: Option<Arc<dyn ErrorSink>>,
    terminal: Mutex<Option<Terminal>>,
    last_error: Mutex<Option<Arc<anyhow::Error>>>,
}

impl Operations {
    /// Binds operations to the driver's callbacks and the pass's token.
    pub fn new(
        done: impl Fn() + Send + Sync + 'static,
        requeue_after: impl Fn(Duration) + Send + Sync + 'static,
        cancel: Arc<CancellationToken>,
    ) -> Self {
        Self {
            done: Arc::new(done),
            requeue_after: Arc::new(requeue_after),
            cancel,
            error_sink: None,
            terminal: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    /// Sends non-retryable errors to `sink` instead of the process-wide one.
    #[must_use]
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = Some(sink);
        self
    }

    /// Marks the key processed.
    pub fn done(&self) {
        self.finish(Terminal::Done);
    }

    /// Re-adds the key immediately, subject to rate limiting.
    pub fn requeue(&self) {
        self.finish(Terminal::Requeue);
    }

    /// Re-adds the key after `delay`, bypassing rate limiting.
    pub fn requeue_after(&self, delay: Duration) {
        if delay.is_zero() {
            self.requeue();
        } else {
            self.finish(Terminal::RequeueAfter(delay));
        }
    }

    /// Records `err` and re-adds the key immediately.
    pub fn requeue_err(&self, err: anyhow::Error) {
        if self.ignore_late(&err) {
            return;
        }
        debug!(error = %format!("{err:#}"), "requeueing after error");
        self.record(err);
        self.requeue();
    }

    /// Classifies `err` and requeues after the suggested delay, requeues
    /// immediately, or reports the error and marks the key done.
    pub fn requeue_api_err(&self, err: anyhow::Error) {
        if self.ignore_late(&err) {
            return;
        }
        let decision = should_retry(&err);
        debug!(error = %format!("{err:#}"), ?decision, "classified api error");
        match decision {
            RetryDecision::RetryAfter(delay) => {
                self.record(err);
                self.requeue_after(delay);
            }
            RetryDecision::RetryNow => {
                self.record(err);
                self.requeue();
            }
            RetryDecision::GiveUp => {
                match &self.error_sink {
                    Some(sink) => sink.handle_error(&err),
                    None => reporting::handle_error(&err),
                }
                self.record(err);
                self.done();
            }
        }
    }

    /// Returns the terminal action taken, if any.
    #[must_use]
    pub fn terminal(&self) -> Option<Terminal> {
        *self.terminal.lock()
    }

    /// Returns true once a terminal call has been made.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.terminal.lock().is_some()
    }

    /// Returns the most recently recorded error.
    #[must_use]
    pub fn last_error(&self) -> Option<Arc<anyhow::Error>> {
        self.last_error.lock().clone()
    }

    /// Returns true, after logging, if a terminal call already happened.
    /// A late error neither replaces the recorded one nor reaches the sink.
    fn ignore_late(&self, err: &anyhow::Error) -> bool {
        let Some(first) = self.terminal() else {
            return false;
        };
        warn!(?first, error = %format!("{err:#}"), "error reported after terminal operation; ignoring");
        true
    }

    fn record(&self, err: anyhow::Error) {
        *self.last_error.lock() = Some(Arc::new(err));
    }

    fn finish(&self, terminal: Terminal) {
        {
            let mut slot = self.terminal.lock();
            if let Some(first) = *slot {
                warn!(?first, ignored = ?terminal, "terminal operation already called for this key");
                return;
            }
            *slot = Some(terminal);
        }

        match terminal {
            Terminal::Done => (self.done)(),
            Terminal::Requeue => (self.requeue_after)(Duration::ZERO),
            Terminal::RequeueAfter(delay) => (self.requeue_after)(delay),
        }
        self.cancel.cancel(format!("{terminal:?}"));
    }
}

impl std::fmt::Debug for Operations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operations")
            .field("terminal", &self.terminal())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// A strict context slot holding the current key's [`Operations`], with
/// shortcuts that resolve it from a context.
///
/// # Panics
///
/// Every shortcut panics if no `Operations` was stored upstream.
#[derive(Debug, Clone)]
pub struct OperationsKey(Key<Arc<Operations>>);

impl OperationsKey {
    /// Creates a new slot.
    #[must_use]
    pub fn new() -> Self {
        Self(Key::new("queue-operations"))
    }

    /// Returns a context holding `operations`.
    #[must_use]
    pub fn with_value(&self, ctx: &Context, operations: Arc<Operations>) -> Context {
        self.0.with_value(ctx, operations)
    }

    /// Returns the operations stored in `ctx`, if any.
    #[must_use]
    pub fn value(&self, ctx: &Context) -> Option<Arc<Operations>> {
        self.0.value(ctx)
    }

    /// Returns the operations stored in `ctx`.
    #[must_use]
    #[track_caller]
    pub fn must_value(&self, ctx: &Context) -> Arc<Operations> {
        self.0.must_value(ctx)
    }

    /// See [`Operations::done`].
    #[track_caller]
    pub fn done(&self, ctx: &Context) {
        self.must_value(ctx).done();
    }

    /// See [`Operations::requeue`].
    #[track_caller]
    pub fn requeue(&self, ctx: &Context) {
        self.must_value(ctx).requeue();
    }

    /// See [`Operations::requeue_after`].
    #[track_caller]
    pub fn requeue_after(&self, ctx: &Context, delay: Duration) {
        self.must_value(ctx).requeue_after(delay);
    }

    /// See [`Operations::requeue_err`].
    #[track_caller]
    pub fn requeue_err(&self, ctx: &Context, err: anyhow::Error) {
        self.must_value(ctx).requeue_err(err);
    }

    /// See [`Operations::requeue_api_err`].
    #[track_caller]
    pub fn requeue_api_err(&self, ctx: &Context, err: anyhow::Error) {
        self.must_value(ctx).requeue_api_err(err);
    }
}

impl Default for OperationsKey {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::classify::ApiError;
    use crate::reporting::MockErrorSink;
    use crate::testing::{QueueEvent, RecordingQueue};
    use pretty_assertions::assert_eq;

    fn operations(queue: &RecordingQueue) -> (Operations, Arc<CancellationToken>) {
        let token = Arc::new(CancellationToken::new());
        (queue.operations(Arc::clone(&token)), token)
    }

    #[test]
    fn test_done_calls_driver_and_cancels() {
        let queue = RecordingQueue::new();
        let (ops, token) = operations(&queue);

        ops.done();

        assert_eq!(queue.events(), vec![QueueEvent::Done]);
        assert_eq!(ops.terminal(), Some(Terminal::Done));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_requeue_uses_zero_delay() {
        let queue = RecordingQueue::new();
        let (ops, token) = operations(&queue);

        ops.requeue();

        assert_eq!(queue.events(), vec![QueueEvent::RequeueAfter(Duration::ZERO)]);
        assert_eq!(ops.terminal(), Some(Terminal::Requeue));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_requeue_after_passes_delay() {
        let queue = RecordingQueue::new();
        let (ops, _token) = operations(&queue);

        ops.requeue_after(Duration::from_secs(30));

        assert_eq!(
            queue.events(),
            vec![QueueEvent::RequeueAfter(Duration::from_secs(30))]
        );
    }

    #[test]
    fn test_only_first_terminal_call_counts() {
        let queue = RecordingQueue::new();
        let (ops, token) = operations(&queue);

        ops.requeue_after(Duration::from_secs(1));
        ops.done();
        ops.requeue();

        assert_eq!(
            queue.events(),
            vec![QueueEvent::RequeueAfter(Duration::from_secs(1))]
        );
        assert_eq!(ops.terminal(), Some(Terminal::RequeueAfter(Duration::from_secs(1))));
        assert_eq!(token.reason(), Some("RequeueAfter(1s)".to_string()));
    }

    #[test]
    fn test_requeue_err_records_error() {
        let queue = RecordingQueue::new();
        let (ops, _token) = operations(&queue);

        ops.requeue_err(anyhow::anyhow!("disk full"));

        assert_eq!(queue.events(), vec![QueueEvent::RequeueAfter(Duration::ZERO)]);
        assert_eq!(ops.last_error().unwrap().to_string(), "disk full");
    }

    #[test]
    fn test_requeue_api_err_uses_server_hint() {
        let queue = RecordingQueue::new();
        let (ops, _token) = operations(&queue);

        ops.requeue_api_err(
            ApiError::too_many_requests("throttled")
                .with_retry_after(Duration::from_secs(5))
                .into(),
        );

        assert_eq!(
            queue.events(),
            vec![QueueEvent::RequeueAfter(Duration::from_secs(5))]
        );
        assert_eq!(ops.terminal(), Some(Terminal::RequeueAfter(Duration::from_secs(5))));
    }

    #[test]
    fn test_requeue_api_err_retries_transient_now() {
        let queue = RecordingQueue::new();
        let (ops, _token) = operations(&queue);

        ops.requeue_api_err(ApiError::internal("etcd leader changed").into());

        assert_eq!(ops.terminal(), Some(Terminal::Requeue));
        assert!(ops.last_error().is_some());
    }

    #[test]
    fn test_requeue_api_err_gives_up_and_reports() {
        let queue = RecordingQueue::new();
        let mut sink = MockErrorSink::new();
        sink.expect_handle_error()
            .withf(|err| err.to_string().contains("not found"))
            .times(1)
            .return_const(());

        let token = Arc::new(CancellationToken::new());
        let ops = queue
            .operations(Arc::clone(&token))
            .with_error_sink(Arc::new(sink));

        ops.requeue_api_err(ApiError::not_found("not found").into());

        assert_eq!(queue.events(), vec![QueueEvent::Done]);
        assert_eq!(ops.terminal(), Some(Terminal::Done));
        assert!(ops.last_error().is_some());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_errors_after_terminal_call_are_ignored() {
        let queue = RecordingQueue::new();
        let mut sink = MockErrorSink::new();
        sink.expect_handle_error().times(0);

        let token = Arc::new(CancellationToken::new());
        let ops = queue
            .operations(Arc::clone(&token))
            .with_error_sink(Arc::new(sink));

        ops.done();
        ops.requeue_err(anyhow::anyhow!("late error"));
        ops.requeue_api_err(ApiError::not_found("late 404").into());

        assert_eq!(queue.events(), vec![QueueEvent::Done]);
        assert_eq!(ops.terminal(), Some(Terminal::Done));
        assert!(ops.last_error().is_none());
    }

    #[test]
    fn test_operations_key_shortcuts() {
        let queue = RecordingQueue::new();
        let (ops, token) = operations(&queue);
        let key = OperationsKey::new();
        let ctx = key.with_value(&Context::background(), Arc::new(ops));

        key.requeue_after(&ctx, Duration::from_millis(250));

        assert_eq!(
            queue.events(),
            vec![QueueEvent::RequeueAfter(Duration::from_millis(250))]
        );
        assert!(token.is_cancelled());
    }

    #[test]
    #[should_panic(expected = "queue-operations")]
    fn test_operations_key_panics_without_operations() {
        OperationsKey::new().done(&Context::background());
    }
}
