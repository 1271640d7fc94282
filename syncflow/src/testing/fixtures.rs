//! Builders and middleware that record what ran.

use crate::handler::{builder, noop_handler, Builder, Handler, Handlers};
use crate::middleware::{handler_middleware, HandlerMiddleware};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A shared, append-only list of lines.
#[derive(Debug, Clone, Default)]
pub struct OutputLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl OutputLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line.
    pub fn push(&self, line: impl Into<String>) {
        self.lines.lock().push(line.into());
    }

    /// Returns every line written so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Clears the log.
    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

fn continuation(next: &Handlers) -> Handler {
    if next.is_empty() {
        noop_handler()
    } else {
        next.must_one()
    }
}

/// A builder whose handler, keyed `key`, writes `text` to `log` and then
/// invokes its continuation. With no continuation the handler just ends.
#[must_use]
pub fn print_builder(log: &OutputLog, key: &str, text: &str) -> Builder {
    let log = log.clone();
    let key = key.to_string();
    let text = text.to_string();
    builder(move |next| {
        let next = continuation(&next);
        let log = log.clone();
        let text = text.clone();
        Handler::from_fn(key.as_str(), move |ctx| {
            log.push(text.as_str());
            let next = next.clone();
            async move { next.handle(ctx).await }
        })
    })
}

/// Like [`print_builder`], but sleeps for `delay` before writing.
#[must_use]
pub fn delayed_print_builder(log: &OutputLog, key: &str, text: &str, delay: Duration) -> Builder {
    let log = log.clone();
    let key = key.to_string();
    let text = text.to_string();
    builder(move |next| {
        let next = continuation(&next);
        let log = log.clone();
        let text = text.clone();
        Handler::from_fn(key.as_str(), move |ctx| {
            let log = log.clone();
            let text = text.clone();
            let next = next.clone();
            async move {
                tokio::time::sleep(delay).await;
                log.push(text);
                next.handle(ctx).await;
            }
        })
    })
}

/// Middleware that writes `enter <key>` to `log` before the wrapped handler.
#[must_use]
pub fn recording_middleware(log: &OutputLog) -> HandlerMiddleware {
    let log = log.clone();
    handler_middleware(move |inner: Handler| {
        let log = log.clone();
        let key = inner.key().clone();
        Handler::from_fn(key, move |ctx| {
            log.push(format!("enter {}", inner.key()));
            let inner = inner.clone();
            async move { inner.handle(ctx).await }
        })
    })
}
