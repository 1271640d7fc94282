//! Error types for the syncflow framework.
//!
//! Everything in here describes a wiring bug in a handler pipeline: a slot
//! read before anything wrote it, a continuation lookup that can't be
//! satisfied, or a bad configuration. Failures of the work a handler performs
//! are never returned as `SyncflowError`; they are routed into
//! [`Operations`](crate::queue::Operations) instead.

use thiserror::Error;

/// The main error type for syncflow operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncflowError {
    /// A strict context slot was read before any handler set it.
    #[error("no value set for context slot '{slot}'")]
    MissingValue {
        /// The slot name.
        slot: &'static str,
    },

    /// A context slot resolved to its type's zero value.
    #[error("context slot '{slot}' holds its zero value")]
    ZeroValue {
        /// The slot name.
        slot: &'static str,
    },

    /// No candidate continuation carries the requested key.
    #[error("no handler with key '{key}' among [{}]", .candidates.join(", "))]
    HandlerNotFound {
        /// The requested key.
        key: String,
        /// Keys of the candidates that were searched.
        candidates: Vec<String>,
    },

    /// More than one candidate continuation carries the requested key.
    #[error("handler key '{key}' matches {count} handlers")]
    AmbiguousHandler {
        /// The requested key.
        key: String,
        /// How many candidates matched.
        count: usize,
    },

    /// A single continuation was required but the list had a different size.
    #[error("expected exactly one handler, found {count}: [{}]", .keys.join(", "))]
    HandlerCount {
        /// The number of handlers found.
        count: usize,
        /// Their keys.
        keys: Vec<String>,
    },

    /// Two handlers were registered under the same key.
    #[error("duplicate handler key '{key}'")]
    DuplicateHandler {
        /// The duplicated key.
        key: String,
    },

    /// Configuration could not be parsed or applied.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias used across the crate.
pub type Result<T, E = SyncflowError> = std::result::Result<T, E>;

/// Stops the process on a pipeline wiring bug.
///
/// Wiring bugs are found at assembly time or on the first key that reaches
/// the broken step; retrying cannot fix them.
#[track_caller]
pub(crate) fn fatal(err: SyncflowError) -> ! {
    tracing::error!(error = %err, "fatal pipeline wiring error");
    panic!("{err}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_value_message() {
        let err = SyncflowError::MissingValue { slot: "owner" };
        assert_eq!(err.to_string(), "no value set for context slot 'owner'");
    }

    #[test]
    fn test_not_found_lists_candidates() {
        let err = SyncflowError::HandlerNotFound {
            key: "delete".to_string(),
            candidates: vec!["create".to_string(), "update".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "no handler with key 'delete' among [create, update]"
        );
    }

    #[test]
    fn test_handler_count_message() {
        let err = SyncflowError::HandlerCount {
            count: 0,
            keys: Vec::new(),
        };
        assert!(err.to_string().contains("found 0"));
    }

    #[test]
    #[should_panic(expected = "duplicate handler key 'a'")]
    fn test_fatal_panics_with_error_message() {
        fatal(SyncflowError::DuplicateHandler {
            key: "a".to_string(),
        });
    }
}
