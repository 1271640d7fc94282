//! The driver-facing entry point: run one key through a handler graph.

use super::operations::{Operations, OperationsKey, Terminal};
use crate::context::{Context, Key};
use crate::errors::{Result, SyncflowError};
use crate::handler::Handler;
use crate::reporting::ErrorSink;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

/// The work item a pass processes.
///
/// The engine never interprets it; drivers that embed structure (a resource
/// type, a namespace and name) decode it in their own handlers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueKey(String);

impl QueueKey {
    /// Creates a key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueueKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for QueueKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

fn default_terminal_grace_ms() -> u64 {
    30_000
}

/// Configuration for a [`Dispatcher`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// How long to wait for a terminal operation after the handler graph
    /// returns before giving up on the pass.
    #[serde(default = "default_terminal_grace_ms")]
    pub terminal_grace_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            terminal_grace_ms: default_terminal_grace_ms(),
        }
    }
}

impl DispatcherConfig {
    /// Creates a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the terminal grace period.
    #[must_use]
    pub fn with_terminal_grace_ms(mut self, ms: u64) -> Self {
        self.terminal_grace_ms = ms;
        self
    }

    /// Returns the terminal grace period.
    #[must_use]
    pub fn terminal_grace(&self) -> Duration {
        Duration::from_millis(self.terminal_grace_ms)
    }

    /// Parses a config from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| SyncflowError::Config(err.to_string()))
    }
}

/// Runs one key through a resolved handler graph.
///
/// For every key the dispatcher derives a fresh cancellable context, stores
/// the key and a bound [`Operations`] in it, runs the graph inside a `sync`
/// span and waits for a terminal operation.
pub struct Dispatcher {
    handler: Handler,
    key: Key<QueueKey>,
    operations: OperationsKey,
    error_sink: Option<Arc<dyn ErrorSink>>,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Creates a dispatcher for `handler` with fresh slots.
    #[must_use]
    pub fn new(handler: Handler) -> Self {
        Self {
            handler,
            key: Key::new("queue-key"),
            operations: OperationsKey::new(),
            error_sink: None,
            config: DispatcherConfig::default(),
        }
    }

    /// Uses `slot` to store the key, so handlers built against it can read it.
    #[must_use]
    pub fn with_key_slot(mut self, slot: Key<QueueKey>) -> Self {
        self.key = slot;
        self
    }

    /// Uses `slot` to store the operations.
    #[must_use]
    pub fn with_operations_key(mut self, slot: OperationsKey) -> Self {
        self.operations = slot;
        self
    }

    /// Sends non-retryable errors to `sink` instead of the process-wide one.
    #[must_use]
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = Some(sink);
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the slot holding the current key.
    #[must_use]
    pub fn key_slot(&self) -> &Key<QueueKey> {
        &self.key
    }

    /// Returns the slot holding the current operations.
    #[must_use]
    pub fn operations_key(&self) -> &OperationsKey {
        &self.operations
    }

    /// Processes one key.
    ///
    /// `done` and `requeue_after` are the driver's queue mutations; a zero
    /// delay passed to `requeue_after` means "re-add now, rate limited".
    /// Returns the terminal action the pipeline took, or `None` if it ended
    /// without one within the grace period or `parent` was cancelled.
    pub async fn process(
        &self,
        parent: &Context,
        key: impl Into<QueueKey>,
        done: impl Fn() + Send + Sync + 'static,
        requeue_after: impl Fn(Duration) + Send + Sync + 'static,
    ) -> Option<Terminal> {
        let key = key.into();
        let (ctx, token) = parent.with_cancel();

        let mut operations = Operations::new(done, requeue_after, Arc::clone(&token));
        if let Some(sink) = &self.error_sink {
            operations = operations.with_error_sink(Arc::clone(sink));
        }
        let operations = Arc::new(operations);

        let ctx = self.key.with_value(&ctx, key.clone());
        let ctx = self.operations.with_value(&ctx, Arc::clone(&operations));

        let span = info_span!("sync", key = %key, pass_id = %Uuid::new_v4());
        async {
            self.handler.handle(ctx).await;
            let grace = self.config.terminal_grace();
            if tokio::time::timeout(grace, token.cancelled()).await.is_err() {
                warn!(
                    handler = %self.handler.key(),
                    grace_ms = self.config.terminal_grace_ms,
                    "handler graph returned without a terminal operation"
                );
            }
        }
        .instrument(span)
        .await;

        operations.terminal()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handler", self.handler.key())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
