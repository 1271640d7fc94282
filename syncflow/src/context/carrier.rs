//! The immutable, explicitly threaded execution context.

use crate::cancellation::CancellationToken;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque identity of a context slot.
///
/// Every slot constructor allocates a fresh id, so two slots never alias even
/// when they share a name and value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u64);

impl SlotId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) type SlotValue = Arc<dyn Any + Send + Sync>;

struct Entry {
    slot: SlotId,
    value: SlotValue,
    parent: Option<Arc<Entry>>,
}

/// Execution context threaded through every handler invocation.
///
/// A `Context` is a persistent linked list of slot values plus the
/// cancellation token of the current sync pass. Writing a slot never touches
/// the receiver; it returns a new `Context` that shares every older entry.
/// Callers only observe a callee's writes if they adopt the context the
/// callee hands on.
#[derive(Clone)]
pub struct Context {
    values: Option<Arc<Entry>>,
    token: Arc<CancellationToken>,
}

impl Context {
    /// Creates an empty context with a fresh, never-cancelled root token.
    #[must_use]
    pub fn background() -> Self {
        Self {
            values: None,
            token: Arc::new(CancellationToken::new()),
        }
    }

    /// Derives a context with its own cancellation token.
    ///
    /// The returned token is cancelled when this context's token is, but
    /// cancelling it leaves this context untouched.
    #[must_use]
    pub fn with_cancel(&self) -> (Self, Arc<CancellationToken>) {
        let token = self.token.child();
        let ctx = Self {
            values: self.values.clone(),
            token: Arc::clone(&token),
        };
        (ctx, token)
    }

    /// Returns the cancellation token of this context.
    #[must_use]
    pub fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }

    /// Returns whether the current pass has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once the current pass is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Returns the number of slot writes visible from this context,
    /// including shadowed ones.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.entries().count()
    }

    pub(crate) fn with_slot(&self, slot: SlotId, value: SlotValue) -> Self {
        Self {
            values: Some(Arc::new(Entry {
                slot,
                value,
                parent: self.values.clone(),
            })),
            token: Arc::clone(&self.token),
        }
    }

    /// Returns the most recent value written for `slot`.
    pub(crate) fn lookup(&self, slot: SlotId) -> Option<&SlotValue> {
        self.entries()
            .find(|entry| entry.slot == slot)
            .map(|entry| &entry.value)
    }

    fn entries(&self) -> impl Iterator<Item = &Entry> {
        std::iter::successors(self.values.as_deref(), |entry| entry.parent.as_deref())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("depth", &self.depth())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
