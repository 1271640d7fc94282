//! Handler and builder middleware.

use crate::handler::{chain, parallel, Builder, BuilderComposer, Handler, Handlers};
use std::sync::Arc;

/// Wraps a handler in cross-cutting behavior.
///
/// The wrapped handler must keep the key of the handler it wraps.
pub type HandlerMiddleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Wraps a builder so that every handler it resolves is wrapped too.
pub type BuilderMiddleware = Arc<dyn Fn(Builder) -> Builder + Send + Sync>;

/// Wraps a closure as a [`HandlerMiddleware`].
pub fn handler_middleware<F>(func: F) -> HandlerMiddleware
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    Arc::new(func)
}

/// Lifts a handler middleware to a builder middleware.
#[must_use]
pub fn make_builder_middleware(middleware: HandlerMiddleware) -> BuilderMiddleware {
    Arc::new(move |builder: Builder| -> Builder {
        let middleware = Arc::clone(&middleware);
        Arc::new(move |next: Handlers| middleware(builder(next)))
    })
}

/// Applies builder middleware to every builder handed to `composer`.
///
/// Middlewares wrap in the order supplied, so the last one is outermost and
/// its entry logic runs first.
#[must_use]
pub fn with_middleware(
    composer: BuilderComposer,
    middleware: Vec<BuilderMiddleware>,
) -> BuilderComposer {
    Arc::new(move |builders: Vec<Builder>| {
        let wrapped = builders
            .into_iter()
            .map(|builder| middleware.iter().fold(builder, |builder, m| m(builder)))
            .collect();
        composer(wrapped)
    })
}

fn lift(middleware: Vec<HandlerMiddleware>) -> Vec<BuilderMiddleware> {
    middleware.into_iter().map(make_builder_middleware).collect()
}

/// A [`chain`] composer whose steps are all wrapped in `middleware`.
#[must_use]
pub fn chain_with_middleware(middleware: Vec<HandlerMiddleware>) -> BuilderComposer {
    let composer: BuilderComposer = Arc::new(chain);
    with_middleware(composer, lift(middleware))
}

/// A [`parallel`] composer whose branches are all wrapped in `middleware`.
#[must_use]
pub fn parallel_with_middleware(middleware: Vec<HandlerMiddleware>) -> BuilderComposer {
    let composer: BuilderComposer = Arc::new(parallel);
    with_middleware(composer, lift(middleware))
}
