//! Cooperative cancellation for sync passes.
//!
//! Every key processed by a [`Dispatcher`](crate::queue::Dispatcher) owns one
//! [`CancellationToken`]. Terminal queue operations cancel it; the dispatcher
//! waits on it before handing the worker its next key.

mod token;

pub use token::CancellationToken;
