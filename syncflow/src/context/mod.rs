//! Execution context management.
//!
//! This module provides:
//! - The immutable [`Context`] carried through every handler invocation
//! - Typed slots over it with strict, defaulting and boxed write contracts

mod carrier;
mod keys;

pub use carrier::{Context, SlotId};
pub use keys::{BoxedKey, DefaultingKey, Key};
