//! Retry classification of downstream failures.
//!
//! [`should_retry`] is the single place failure policy is decided. Handlers
//! hand errors to [`Operations::requeue_api_err`](super::Operations::requeue_api_err)
//! rather than choosing delays themselves.

use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Machine-readable reason attached to an API failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusReason {
    /// The request was malformed.
    BadRequest,
    /// The caller is not authenticated.
    Unauthorized,
    /// The caller may not perform the request.
    Forbidden,
    /// The target does not exist.
    NotFound,
    /// The target already exists.
    AlreadyExists,
    /// The write conflicted with a concurrent one.
    Conflict,
    /// The submitted object failed validation.
    Invalid,
    /// The requested resource version is gone.
    Gone,
    /// The server is rate limiting the caller.
    TooManyRequests,
    /// The server hit an internal error.
    InternalError,
    /// The request timed out before completing.
    Timeout,
    /// The server could not complete the request in time.
    ServerTimeout,
    /// The server is temporarily unavailable.
    ServiceUnavailable,
    /// No reason was given.
    Unknown,
}

/// A failure reported by a downstream API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({reason:?}, status {code})")]
pub struct ApiError {
    /// HTTP-style status code.
    pub code: u16,
    /// Reason classification.
    pub reason: StatusReason,
    /// Human-readable message.
    pub message: String,
    /// Delay the server asked the client to wait before retrying.
    pub retry_after: Option<Duration>,
}

impl ApiError {
    /// Creates a new API error.
    #[must_use]
    pub fn new(code: u16, reason: StatusReason, message: impl Into<String>) -> Self {
        Self {
            code,
            reason,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Attaches a server-suggested retry delay.
    #[must_use]
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    /// Creates a 404 error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, StatusReason::NotFound, message)
    }

    /// Creates a 409 error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(409, StatusReason::Conflict, message)
    }

    /// Creates a 422 error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(422, StatusReason::Invalid, message)
    }

    /// Creates a 429 error.
    #[must_use]
    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(429, StatusReason::TooManyRequests, message)
    }

    /// Creates a 500 error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, StatusReason::InternalError, message)
    }

    /// Creates a 504 error.
    #[must_use]
    pub fn server_timeout(message: impl Into<String>) -> Self {
        Self::new(504, StatusReason::ServerTimeout, message)
    }

    /// Returns the retry delay the server suggested, if non-zero.
    #[must_use]
    pub fn suggested_delay(&self) -> Option<Duration> {
        self.retry_after.filter(|delay| !delay.is_zero())
    }

    /// Returns how this failure should be retried.
    #[must_use]
    pub fn retry_decision(&self) -> RetryDecision {
        if let Some(delay) = self.suggested_delay() {
            return RetryDecision::RetryAfter(delay);
        }
        match self.reason {
            StatusReason::InternalError
            | StatusReason::Timeout
            | StatusReason::ServerTimeout
            | StatusReason::TooManyRequests => RetryDecision::RetryNow,
            _ if self.code >= 500 => RetryDecision::RetryNow,
            _ => RetryDecision::GiveUp,
        }
    }
}

/// Outcome of classifying an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the delay the server suggested.
    RetryAfter(Duration),
    /// Retry immediately, subject to the driver's rate limiting.
    RetryNow,
    /// Don't retry; the error is not transient.
    GiveUp,
}

impl RetryDecision {
    /// Returns true unless the decision is [`RetryDecision::GiveUp`].
    #[must_use]
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::GiveUp)
    }
}

fn is_transient_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
    )
}

fn classify_chain<'a>(chain: impl Iterator<Item = &'a (dyn StdError + 'static)>) -> RetryDecision {
    for cause in chain {
        if let Some(api) = cause.downcast_ref::<ApiError>() {
            return api.retry_decision();
        }
        if let Some(io) = cause.downcast_ref::<io::Error>() {
            if is_transient_io(io.kind()) {
                return RetryDecision::RetryNow;
            }
        }
    }
    RetryDecision::GiveUp
}

/// Classifies an error by walking its cause chain.
///
/// The first [`ApiError`] found decides; a transient I/O failure (connection
/// reset or aborted, broken pipe, timeout) is retried immediately; anything
/// else is not retried.
#[must_use]
pub fn should_retry(err: &anyhow::Error) -> RetryDecision {
    classify_chain(err.chain())
}

/// Like [`should_retry`] for a plain `std::error::Error`.
#[must_use]
pub fn classify_error(err: &(dyn StdError + 'static)) -> RetryDecision {
    classify_chain(std::iter::successors(Some(err), |&e| e.source()))
}
