//! # Syncflow
//!
//! Composable handler pipelines for reconciliation loops.
//!
//! A reconcile pass is written as a graph of small, separately testable
//! steps instead of one large function. Syncflow provides:
//!
//! - **Typed context slots**: strict, defaulting and boxed values threaded
//!   through an immutable [`Context`](context::Context)
//! - **Builders and composers**: [`chain`](handler::chain) and
//!   [`parallel`](handler::parallel) wire steps together at assembly time
//! - **Middleware**: cross-cutting behavior applied to every step of a graph
//! - **Queue operations**: the terminal calls that finish a key, with a
//!   retry classifier for downstream API errors
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use syncflow::prelude::*;
//!
//! let ops = OperationsKey::new();
//! let pipeline = chain(vec![fetch_builder(), apply_builder(ops.clone())]);
//! let dispatcher = Dispatcher::new(pipeline(Handlers::default()))
//!     .with_operations_key(ops);
//!
//! let terminal = dispatcher
//!     .process(&Context::background(), "default/widget", done, requeue_after)
//!     .await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod context;
pub mod errors;
pub mod handler;
pub mod middleware;
pub mod observability;
pub mod queue;
pub mod reporting;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::context::{BoxedKey, Context, DefaultingKey, Key};
    pub use crate::errors::{Result, SyncflowError};
    pub use crate::handler::{
        builder, chain, noop_handler, parallel, Builder, BuilderComposer, ContextHandler,
        Handler, HandlerKey, Handlers,
    };
    pub use crate::middleware::{
        chain_with_middleware, handler_middleware, logging_middleware,
        make_builder_middleware, parallel_with_middleware, with_middleware, BuilderMiddleware,
        HandlerMiddleware,
    };
    pub use crate::observability::{init_logging, LogConfig, LogFormat};
    pub use crate::queue::{
        should_retry, ApiError, Dispatcher, DispatcherConfig, Operations, OperationsKey,
        QueueKey, RetryDecision, StatusReason, Terminal,
    };
    pub use crate::reporting::{set_error_sink, ErrorSink, LoggingErrorSink};
}
