//! Cancellation token for cooperative cancellation.

use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A token for cooperative cancellation.
///
/// Cancellation is idempotent - only the first cancellation reason is kept.
/// A child token reports itself cancelled as soon as any ancestor is.
#[derive(Default)]
pub struct CancellationToken {
    /// Whether cancellation has been requested on this token.
    cancelled: AtomicBool,
    /// The reason for cancellation (first one wins).
    reason: RwLock<Option<String>>,
    /// Wakes tasks parked in [`CancellationToken::cancelled`].
    notify: Notify,
    /// The token this one was derived from.
    parent: Option<Arc<CancellationToken>>,
}

impl CancellationToken {
    /// Creates a new root cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a child token that is cancelled with its parent but can also
    /// be cancelled on its own without affecting the parent.
    #[must_use]
    pub fn child(self: &Arc<Self>) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(Arc::clone(self)),
            ..Self::default()
        })
    }

    /// Requests cancellation with a reason.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        *self.reason.write() = Some(reason.into());
        self.notify.notify_waiters();
        true
    }

    /// Returns whether this token or any ancestor has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason
            .read()
            .clone()
            .or_else(|| self.parent.as_ref().and_then(|p| p.reason()))
    }

    /// Completes once this token or any ancestor is cancelled.
    pub fn cancelled(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            loop {
                let notified = self.notify.notified();
                tokio::pin!(notified);
                // Register before checking the flag so a concurrent cancel
                // between the check and the await is not missed.
                notified.as_mut().enable();

                if self.is_cancelled() {
                    return;
                }

                match &self.parent {
                    Some(parent) => {
                        tokio::select! {
                            () = &mut notified => {}
                            () = parent.cancelled() => return,
                        }
                    }
                    None => notified.await,
                }
            }
        })
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_token_default_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_token_cancel_idempotent() {
        let token = CancellationToken::new();
        assert!(token.cancel("first"));
        assert!(!token.cancel("second"));

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("first".to_string()));
    }

    #[test]
    fn test_child_follows_parent() {
        let parent = Arc::new(CancellationToken::new());
        let child = parent.child();

        parent.cancel("shutdown");

        assert!(child.is_cancelled());
        assert_eq!(child.reason(), Some("shutdown".to_string()));
    }

    #[test]
    fn test_child_cancel_does_not_reach_parent() {
        let parent = Arc::new(CancellationToken::new());
        let child = parent.child();

        child.cancel("done");

        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel("early");

        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = Arc::new(CancellationToken::new());
        let waiter = {
            let token = Arc::clone(&token);
            tokio::spawn(async move { token.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel("wake");

        tokio::time::timeout(Duration::from_millis(500), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_child_cancelled_wakes_on_parent_cancel() {
        let parent = Arc::new(CancellationToken::new());
        let child = parent.child();
        let waiter = tokio::spawn(async move { child.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        parent.cancel("shutdown");

        tokio::time::timeout(Duration::from_millis(500), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
