//! Handlers, builders and their composition.
//!
//! A [`Handler`] is one identified pipeline step. A [`Builder`] resolves a
//! handler given its candidate continuations, and is the unit of composition:
//! [`chain`] runs builders one after another, [`parallel`] fans them out and
//! joins before continuing.

mod compose;
mod types;

pub use compose::{chain, parallel};
pub use types::{
    builder, noop_handler, Builder, BuilderComposer, ContextHandler, Handler, HandlerKey,
    Handlers, NOOP_KEY,
};
