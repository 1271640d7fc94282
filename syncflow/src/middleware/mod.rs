//! Middleware for handlers and builders.
//!
//! Middleware injects cross-cutting behavior, such as logging on entry,
//! around handlers that know nothing about it. Applied through a composer it
//! reaches every node of the composed graph, not just the root.

mod logging;
mod wrap;

pub use logging::logging_middleware;
pub use wrap::{
    chain_with_middleware, handler_middleware, make_builder_middleware,
    parallel_with_middleware, with_middleware, BuilderMiddleware, HandlerMiddleware,
};
