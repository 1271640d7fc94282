//! Per-key processing: terminal operations, retry classification and the
//! dispatcher drivers call for each dequeued key.

mod classify;
mod dispatcher;
mod operations;

pub use classify::{classify_error, should_retry, ApiError, RetryDecision, StatusReason};
pub use dispatcher::{Dispatcher, DispatcherConfig, QueueKey};
pub use operations::{DoneFn, Operations, OperationsKey, RequeueAfterFn, Terminal};
