//! Sequential and concurrent builder composition.

use super::types::{noop_handler, Builder, ContextHandler, Handler, HandlerKey, Handlers};
use crate::context::Context;
use crate::errors::fatal;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn, Instrument};

fn or_noop(next: Handlers) -> Handlers {
    if next.is_empty() {
        Handlers::one(noop_handler())
    } else {
        next
    }
}

/// Composes builders sequentially.
///
/// The builders are resolved right to left: the last one receives the
/// continuations handed to the chain (or a no-op), and each earlier builder
/// receives the handler produced by the one after it. Invoking the result is
/// equivalent to `b1(b2(...bn(next)))`.
#[must_use]
pub fn chain(builders: Vec<Builder>) -> Builder {
    Arc::new(move |next: Handlers| {
        let handler = builders
            .iter()
            .rev()
            .fold(or_noop(next), |next, builder| Handlers::one(builder(next)))
            .must_one();
        debug!(handler = %handler.key(), steps = builders.len(), "resolved chain");
        handler
    })
}

/// Composes builders concurrently.
///
/// Each builder is resolved on its own with a no-op continuation, so
/// branches never see the shared continuation. When invoked, every branch
/// runs as a separate task on the same incoming context; once all of them
/// have returned, the continuation runs with that same pre-fork context.
///
/// Strict and defaulting slot writes made by a branch are therefore lost;
/// writes into a boxed cell allocated before the fork are not.
///
/// # Panics
///
/// Resolving the builder panics if two branches share a key or more than
/// one continuation is supplied.
#[must_use]
pub fn parallel(builders: Vec<Builder>) -> Builder {
    Arc::new(move |next: Handlers| {
        let branches: Handlers = builders
            .iter()
            .map(|builder| builder(Handlers::one(noop_handler())))
            .collect();
        if let Err(err) = branches.ensure_unique() {
            fatal(err);
        }

        let key = HandlerKey::new(branches.keys().join("|"));
        let next = or_noop(next).must_one();
        debug!(handler = %key, branches = branches.len(), "resolved parallel");

        Handler::new(
            key,
            Parallel {
                branches: Arc::new(branches),
                next,
            },
        )
    })
}

struct Parallel {
    branches: Arc<Handlers>,
    next: Handler,
}

#[async_trait]
impl ContextHandler for Parallel {
    async fn handle(&self, ctx: Context) {
        let mut tasks = JoinSet::new();
        for branch in self.branches.iter().cloned() {
            let ctx = ctx.clone();
            tasks.spawn(async move { branch.handle(ctx).await }.in_current_span());
        }

        let mut panicked = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(()) => {}
                Err(err) if err.is_panic() => {
                    if panicked.is_none() {
                        panicked = Some(err.into_panic());
                    }
                }
                Err(err) => warn!(error = %err, "parallel branch did not complete"),
            }
        }

        // Re-raised only after every branch has finished so no branch is left
        // running detached.
        if let Some(payload) = panicked {
            std::panic::resume_unwind(payload);
        }

        self.next.handle(ctx).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BoxedKey, Key};
    use crate::handler::builder;
    use crate::testing::{print_builder, OutputLog};
    use pretty_assertions::assert_eq;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let log = OutputLog::new();
        let handler = chain(vec![
            print_builder(&log, "first", "first"),
            print_builder(&log, "second", "second"),
        ])(Handlers::default());

        handler.handle(Context::background()).await;

        assert_eq!(log.lines(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_chain_matches_manual_nesting() {
        let composed_log = OutputLog::new();
        let nested_log = OutputLog::new();

        let composed = chain(vec![
            print_builder(&composed_log, "a", "a"),
            print_builder(&composed_log, "b", "b"),
            print_builder(&composed_log, "c", "c"),
        ])(Handlers::default());

        let a = print_builder(&nested_log, "a", "a");
        let b = print_builder(&nested_log, "b", "b");
        let c = print_builder(&nested_log, "c", "c");
        let nested = a(Handlers::one(b(Handlers::one(c(Handlers::one(noop_handler()))))));

        composed.handle(Context::background()).await;
        nested.handle(Context::background()).await;

        assert_eq!(composed.key(), nested.key());
        assert_eq!(composed_log.lines(), nested_log.lines());
    }

    #[tokio::test]
    async fn test_chain_feeds_continuation_to_last_step() {
        let log = OutputLog::new();
        let tail = print_builder(&log, "tail", "tail")(Handlers::default());
        let handler = chain(vec![print_builder(&log, "head", "head")])(Handlers::one(tail));

        handler.handle(Context::background()).await;

        assert_eq!(log.lines(), vec!["head", "tail"]);
    }

    #[tokio::test]
    async fn test_chain_threads_context() {
        let name = Key::<String>::new("name");
        let seen = OutputLog::new();

        let set = {
            let name = name.clone();
            builder(move |next| {
                let next = next.must_one();
                let name = name.clone();
                Handler::from_fn("set", move |ctx| {
                    let next = next.clone();
                    let ctx = name.with_value(&ctx, "widget".to_string());
                    async move { next.handle(ctx).await }
                })
            })
        };
        let read = {
            let seen = seen.clone();
            builder(move |next| {
                let next = next.must_one();
                let name = name.clone();
                let seen = seen.clone();
                Handler::from_fn("read", move |ctx| {
                    seen.push(name.must_value(&ctx));
                    let next = next.clone();
                    async move { next.handle(ctx).await }
                })
            })
        };

        chain(vec![set, read])(Handlers::default())
            .handle(Context::background())
            .await;

        assert_eq!(seen.lines(), vec!["widget"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parallel_joins_before_continuation() {
        let log = OutputLog::new();
        let handler = chain(vec![
            parallel(vec![
                crate::testing::delayed_print_builder(
                    &log,
                    "slow",
                    "first",
                    Duration::from_millis(5),
                ),
                print_builder(&log, "fast", "second"),
            ]),
            print_builder(&log, "after", "continuation"),
        ])(Handlers::default());

        handler.handle(Context::background()).await;

        assert_eq!(log.lines(), vec!["second", "first", "continuation"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parallel_joins_when_last_branch_is_slowest() {
        let log = OutputLog::new();
        let handler = chain(vec![
            parallel(vec![
                print_builder(&log, "fast", "first"),
                crate::testing::delayed_print_builder(
                    &log,
                    "slow",
                    "second",
                    Duration::from_millis(5),
                ),
            ]),
            print_builder(&log, "after", "continuation"),
        ])(Handlers::default());

        handler.handle(Context::background()).await;

        assert_eq!(log.lines(), vec!["first", "second", "continuation"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_branches_run_concurrently() {
        let log = OutputLog::new();
        let delay = Duration::from_millis(50);
        let handler = parallel(vec![
            crate::testing::delayed_print_builder(&log, "a", "a", delay),
            crate::testing::delayed_print_builder(&log, "b", "b", delay),
            crate::testing::delayed_print_builder(&log, "c", "c", delay),
        ])(Handlers::default());

        let start = Instant::now();
        handler.handle(Context::background()).await;

        assert!(start.elapsed() < delay * 3);
        assert_eq!(log.lines().len(), 3);
    }

    #[test]
    fn test_parallel_key_joins_branch_keys() {
        let log = OutputLog::new();
        let handler = parallel(vec![
            print_builder(&log, "left", "l"),
            print_builder(&log, "right", "r"),
        ])(Handlers::default());

        assert_eq!(handler.key().as_str(), "left|right");
    }

    #[test]
    #[should_panic(expected = "duplicate handler key 'same'")]
    fn test_parallel_rejects_duplicate_branch_keys() {
        let log = OutputLog::new();
        let _ = parallel(vec![
            print_builder(&log, "same", "1"),
            print_builder(&log, "same", "2"),
        ])(Handlers::default());
    }

    #[tokio::test]
    async fn test_parallel_continuation_sees_pre_fork_context() {
        let strict = Key::<u32>::new("strict");
        let boxed = BoxedKey::new("boxed", 0_u32);
        let seen = OutputLog::new();

        let writer = {
            let strict = strict.clone();
            let boxed = boxed.clone();
            builder(move |next| {
                let next = next.must_one();
                let strict = strict.clone();
                let boxed = boxed.clone();
                Handler::from_fn("writer", move |ctx| {
                    let ctx = strict.with_value(&ctx, 1);
                    let ctx = boxed.with_value(&ctx, 2);
                    let next = next.clone();
                    async move { next.handle(ctx).await }
                })
            })
        };
        let reader = {
            let seen = seen.clone();
            let boxed = boxed.clone();
            Handler::from_fn("reader", move |ctx| {
                seen.push(format!("{:?}/{}", strict.value(&ctx), boxed.value(&ctx)));
                async {}
            })
        };

        let ctx = boxed.with_box(&Context::background());
        parallel(vec![writer])(Handlers::one(reader)).handle(ctx).await;

        assert_eq!(seen.lines(), vec!["None/2"]);
    }

    #[tokio::test]
    async fn test_parallel_propagates_branch_panic() {
        let log = OutputLog::new();
        let boom = builder(|_next| {
            Handler::from_fn("boom", |_ctx| async { panic!("branch exploded") })
        });
        let handler = parallel(vec![boom])(Handlers::one(
            print_builder(&log, "after", "continuation")(Handlers::default()),
        ));

        let outcome = tokio::spawn(async move { handler.handle(Context::background()).await }).await;

        assert!(outcome.unwrap_err().is_panic());
        assert!(log.lines().is_empty());
    }
}
