//! A stand-in for a driver's work queue.

use crate::cancellation::CancellationToken;
use crate::queue::Operations;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A queue mutation observed by a [`RecordingQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEvent {
    /// The key was marked processed.
    Done,
    /// The key was re-added after the given delay. Zero means rate limited.
    RequeueAfter(Duration),
}

/// Records the queue mutations a pipeline makes.
#[derive(Debug, Clone, Default)]
pub struct RecordingQueue {
    events: Arc<Mutex<Vec<QueueEvent>>>,
}

impl RecordingQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a `done` callback that records [`QueueEvent::Done`].
    #[must_use]
    pub fn done_fn(&self) -> impl Fn() + Send + Sync + 'static {
        let events = Arc::clone(&self.events);
        move || events.lock().push(QueueEvent::Done)
    }

    /// Returns a `requeue_after` callback that records
    /// [`QueueEvent::RequeueAfter`].
    #[must_use]
    pub fn requeue_after_fn(&self) -> impl Fn(Duration) + Send + Sync + 'static {
        let events = Arc::clone(&self.events);
        move |delay| events.lock().push(QueueEvent::RequeueAfter(delay))
    }

    /// Creates operations bound to this queue and `cancel`.
    #[must_use]
    pub fn operations(&self, cancel: Arc<CancellationToken>) -> Operations {
        Operations::new(self.done_fn(), self.requeue_after_fn(), cancel)
    }

    /// Returns every recorded mutation, in order.
    #[must_use]
    pub fn events(&self) -> Vec<QueueEvent> {
        self.events.lock().clone()
    }
}
