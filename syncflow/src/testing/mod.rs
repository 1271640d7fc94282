//! Testing utilities for handler graphs.
//!
//! This module provides:
//! - An append-only output log and builders that write to it
//! - A recording queue standing in for a driver's work queue

mod fixtures;
mod mocks;

pub use fixtures::{delayed_print_builder, print_builder, recording_middleware, OutputLog};
pub use mocks::{QueueEvent, RecordingQueue};
