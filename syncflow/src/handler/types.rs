//! Handlers, handler lists and builders.

use crate::context::Context;
use crate::errors::{fatal, Result, SyncflowError};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Key of the handler every composer uses as an empty continuation.
pub const NOOP_KEY: &str = "noop";

/// Identity of a handler.
///
/// Keys are opaque diagnostic strings. Branching handlers usually convert a
/// closed enum of branch names into keys so that lookups stay exhaustive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerKey(String);

impl HandlerKey {
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

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HandlerKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for HandlerKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&HandlerKey> for HandlerKey {
    fn from(key: &HandlerKey) -> Self {
        key.clone()
    }
}

/// The logic of one pipeline step.
///
/// An implementation must end by invoking exactly one continuation or one
/// terminal [`Operations`](crate::queue::Operations) call. Returning without
/// doing either silently ends the pipeline for the current key.
#[async_trait]
pub trait ContextHandler: Send + Sync {
    /// Runs the step against `ctx`.
    async fn handle(&self, ctx: Context);
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ContextHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, ctx: Context) {
        (self.0)(ctx).await;
    }
}

/// An identified, invocable pipeline step.
///
/// Handlers are assembled once and invoked once per key per pass. Cloning is
/// cheap; clones share the same logic.
#[derive(Clone)]
pub struct Handler {
    key: HandlerKey,
    inner: Arc<dyn ContextHandler>,
}

impl Handler {
    /// Creates a handler from a [`ContextHandler`] implementation.
    pub fn new(key: impl Into<HandlerKey>, handler: impl ContextHandler + 'static) -> Self {
        Self {
            key: key.into(),
            inner: Arc::new(handler),
        }
    }

    /// Creates a handler from an async closure.
    pub fn from_fn<F, Fut>(key: impl Into<HandlerKey>, func: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::new(key, FnHandler(func))
    }

    /// Returns the handler key.
    #[must_use]
    pub fn key(&self) -> &HandlerKey {
        &self.key
    }

    /// Runs the handler.
    pub async fn handle(&self, ctx: Context) {
        self.inner.handle(ctx).await;
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("key", &self.key).finish()
    }
}

/// A handler that does nothing.
#[must_use]
pub fn noop_handler() -> Handler {
    Handler::from_fn(NOOP_KEY, |_ctx| async {})
}

/// Candidate continuations handed to a [`Builder`].
#[derive(Debug, Clone, Default)]
pub struct Handlers(Vec<Handler>);

impl Handlers {
    /// Creates a list from handlers.
    #[must_use]
    pub fn new(handlers: Vec<Handler>) -> Self {
        Self(handlers)
    }

    /// Creates a single-element list.
    #[must_use]
    pub fn one(handler: Handler) -> Self {
        Self(vec![handler])
    }

    /// Returns the number of handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no handlers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the handlers.
    pub fn iter(&self) -> std::slice::Iter<'_, Handler> {
        self.0.iter()
    }

    /// Returns the keys of all handlers, in order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.0.iter().map(|h| h.key.to_string()).collect()
    }

    /// Returns the only handler, or an error if there isn't exactly one.
    pub fn try_one(&self) -> Result<Handler> {
        match self.0.as_slice() {
            [handler] => Ok(handler.clone()),
            _ => Err(SyncflowError::HandlerCount {
                count: self.0.len(),
                keys: self.keys(),
            }),
        }
    }

    /// Returns the only handler.
    ///
    /// Use this in ordinary single-continuation builders to reject mis-wired
    /// graphs at assembly time.
    ///
    /// # Panics
    ///
    /// Panics unless the list holds exactly one handler.
    #[must_use]
    #[track_caller]
    pub fn must_one(&self) -> Handler {
        self.try_one().unwrap_or_else(|err| fatal(err))
    }

    /// Returns the first handler with the given key.
    #[must_use]
    pub fn find(&self, key: impl Into<HandlerKey>) -> Option<Handler> {
        let key = key.into();
        self.0.iter().find(|h| h.key == key).cloned()
    }

    /// Returns the handler with the given key, or an error if none or more
    /// than one match.
    pub fn try_find(&self, key: impl Into<HandlerKey>) -> Result<Handler> {
        let key = key.into();
        let mut matches = self.0.iter().filter(|h| h.key == key);
        match (matches.next(), matches.count()) {
            (Some(handler), 0) => Ok(handler.clone()),
            (Some(_), rest) => Err(SyncflowError::AmbiguousHandler {
                key: key.to_string(),
                count: rest + 1,
            }),
            (None, _) => Err(SyncflowError::HandlerNotFound {
                key: key.to_string(),
                candidates: self.keys(),
            }),
        }
    }

    /// Returns the handler with the given key.
    ///
    /// # Panics
    ///
    /// Panics when no handler or more than one handler carries `key`.
    #[must_use]
    #[track_caller]
    pub fn must_find(&self, key: impl Into<HandlerKey>) -> Handler {
        self.try_find(key).unwrap_or_else(|err| fatal(err))
    }

    /// Returns an error naming the first key that appears more than once.
    pub fn ensure_unique(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for handler in &self.0 {
            if !seen.insert(&handler.key) {
                return Err(SyncflowError::DuplicateHandler {
                    key: handler.key.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl From<Vec<Handler>> for Handlers {
    fn from(handlers: Vec<Handler>) -> Self {
        Self(handlers)
    }
}

impl From<Handler> for Handlers {
    fn from(handler: Handler) -> Self {
        Self::one(handler)
    }
}

impl FromIterator<Handler> for Handlers {
    fn from_iter<I: IntoIterator<Item = Handler>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Handlers {
    type Item = Handler;
    type IntoIter = std::vec::IntoIter<Handler>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Handlers {
    type Item = &'a Handler;
    type IntoIter = std::slice::Iter<'a, Handler>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A factory that turns candidate continuations into one handler.
///
/// Builders only run at assembly time; the handler graph they resolve to is
/// what gets invoked per key.
pub type Builder = Arc<dyn Fn(Handlers) -> Handler + Send + Sync>;

/// Combines several builders into one, e.g. [`chain`](super::chain).
pub type BuilderComposer = Arc<dyn Fn(Vec<Builder>) -> Builder + Send + Sync>;

/// Wraps a closure as a [`Builder`].
pub fn builder<F>(func: F) -> Builder
where
    F: Fn(Handlers) -> Handler + Send + Sync + 'static,
{
    Arc::new(func)
}
