//! Structured logging on handler entry.

use super::wrap::{handler_middleware, HandlerMiddleware};
use crate::handler::{Handler, HandlerKey};
use tracing::{debug, error, info, trace, warn, Level};

fn log_entry(level: Level, key: &HandlerKey) {
    match level {
        Level::TRACE => trace!(handler = %key, "entering handler"),
        Level::DEBUG => debug!(handler = %key, "entering handler"),
        Level::INFO => info!(handler = %key, "entering handler"),
        Level::WARN => warn!(handler = %key, "entering handler"),
        _ => error!(handler = %key, "entering handler"),
    }
}

/// Middleware that emits a `tracing` event carrying the handler key every
/// time a wrapped handler is entered.
///
/// Events inherit the span of the current sync pass, so they also carry the
/// queue key.
#[must_use]
pub fn logging_middleware(level: Level) -> HandlerMiddleware {
    handler_middleware(move |inner: Handler| {
        let key = inner.key().clone();
        Handler::from_fn(key, move |ctx| {
            log_entry(level, inner.key());
            let inner = inner.clone();
            async move { inner.handle(ctx).await }
        })
    })
}
