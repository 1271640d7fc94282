//! Typed slots over [`Context`].
//!
//! Three slot kinds share the same `with_value`/`value` shape but differ in
//! what a read of an unset slot does and in how writes propagate:
//!
//! - [`Key`] is strict: reading an unset slot is a wiring bug.
//! - [`DefaultingKey`] returns a fixed default when unset.
//! - [`BoxedKey`] stores its value in a shared cell so that writes made by a
//!   callee are visible to the caller that allocated the cell, even if the
//!   callee's returned context is discarded.

use super::carrier::{Context, SlotId};
use crate::errors::{fatal, Result, SyncflowError};
use parking_lot::RwLock;
use std::marker::PhantomData;
use std::sync::Arc;

/// A strict context slot.
pub struct Key<V> {
    id: SlotId,
    name: &'static str,
    _value: PhantomData<fn() -> V>,
}

impl<V> Key<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a new slot. The name is only used in diagnostics.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            id: SlotId::next(),
            name,
            _value: PhantomData,
        }
    }

    /// Returns the slot name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns a context with `value` stored in this slot.
    #[must_use]
    pub fn with_value(&self, ctx: &Context, value: V) -> Context {
        ctx.with_slot(self.id, Arc::new(value))
    }

    /// Returns the value, if any handler upstream set it.
    #[must_use]
    pub fn value(&self, ctx: &Context) -> Option<V> {
        ctx.lookup(self.id)
            .and_then(|value| value.downcast_ref::<V>())
            .cloned()
    }

    /// Returns the value or a [`SyncflowError::MissingValue`].
    pub fn try_value(&self, ctx: &Context) -> Result<V> {
        self.value(ctx)
            .ok_or(SyncflowError::MissingValue { slot: self.name })
    }

    /// Returns the value, stopping the process if it was never set.
    ///
    /// # Panics
    ///
    /// Panics when no upstream handler wrote this slot.
    #[must_use]
    #[track_caller]
    pub fn must_value(&self, ctx: &Context) -> V {
        self.try_value(ctx).unwrap_or_else(|err| fatal(err))
    }
}

impl<V> Clone for Key<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name,
            _value: PhantomData,
        }
    }
}

impl<V> std::fmt::Debug for Key<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Key").field("name", &self.name).finish()
    }
}

/// A context slot that falls back to a default when unset.
#[derive(Clone)]
pub struct DefaultingKey<V> {
    id: SlotId,
    name: &'static str,
    default: V,
}

impl<V> DefaultingKey<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a new slot with the value returned when unset.
    #[must_use]
    pub fn new(name: &'static str, default: V) -> Self {
        Self {
            id: SlotId::next(),
            name,
            default,
        }
    }

    /// Returns the slot name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns a context with `value` stored in this slot.
    #[must_use]
    pub fn with_value(&self, ctx: &Context, value: V) -> Context {
        ctx.with_slot(self.id, Arc::new(value))
    }

    /// Returns the stored value or the default.
    #[must_use]
    pub fn value(&self, ctx: &Context) -> V {
        ctx.lookup(self.id)
            .and_then(|value| value.downcast_ref::<V>())
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

impl<V> DefaultingKey<V>
where
    V: Clone + Default + PartialEq + Send + Sync + 'static,
{
    /// Returns the value or [`SyncflowError::ZeroValue`] if it equals
    /// `V::default()`.
    pub fn try_value(&self, ctx: &Context) -> Result<V> {
        let value = self.value(ctx);
        if value == V::default() {
            return Err(SyncflowError::ZeroValue { slot: self.name });
        }
        Ok(value)
    }

    /// Returns the value, stopping the process if it is the type's zero
    /// value. Use this to assert a value was actually computed upstream.
    ///
    /// # Panics
    ///
    /// Panics when the resolved value equals `V::default()`.
    #[must_use]
    #[track_caller]
    pub fn must_value(&self, ctx: &Context) -> V {
        self.try_value(ctx).unwrap_or_else(|err| fatal(err))
    }
}

impl<V> std::fmt::Debug for DefaultingKey<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultingKey")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A context slot backed by a shared, in-place writable cell.
///
/// An outer handler calls [`BoxedKey::with_box`] before running an inner
/// handler; whatever the inner handler writes through
/// [`BoxedKey::with_value`] lands in that cell and is visible to the outer
/// handler afterwards, without the inner handler knowing it was boxed.
#[derive(Clone)]
pub struct BoxedKey<V> {
    id: SlotId,
    name: &'static str,
    default: V,
}

type Cell<V> = RwLock<V>;

impl<V> BoxedKey<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a new boxed slot with the value returned when unset.
    #[must_use]
    pub fn new(name: &'static str, default: V) -> Self {
        Self {
            id: SlotId::next(),
            name,
            default,
        }
    }

    /// Returns the slot name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Allocates a fresh cell holding the default.
    ///
    /// Every context derived from the returned one shares the cell.
    #[must_use]
    pub fn with_box(&self, ctx: &Context) -> Context {
        ctx.with_slot(self.id, Arc::new(Cell::new(self.default.clone())))
    }

    /// Stores `value`.
    ///
    /// If a cell is reachable from `ctx` it is overwritten in place and an
    /// equivalent context is returned; otherwise a new cell is allocated.
    #[must_use]
    pub fn with_value(&self, ctx: &Context, value: V) -> Context {
        match self.cell(ctx) {
            Some(cell) => {
                *cell.write() = value;
                ctx.clone()
            }
            None => ctx.with_slot(self.id, Arc::new(Cell::new(value))),
        }
    }

    /// Returns the current cell contents or the default.
    #[must_use]
    pub fn value(&self, ctx: &Context) -> V {
        self.cell(ctx)
            .map_or_else(|| self.default.clone(), |cell| cell.read().clone())
    }

    /// Returns whether a cell is reachable from `ctx`.
    #[must_use]
    pub fn is_boxed(&self, ctx: &Context) -> bool {
        self.cell(ctx).is_some()
    }

    fn cell<'a>(&self, ctx: &'a Context) -> Option<&'a Cell<V>> {
        ctx.lookup(self.id)
            .and_then(|value| value.downcast_ref::<Cell<V>>())
    }
}

impl<V> BoxedKey<V>
where
    V: Clone + Default + PartialEq + Send + Sync + 'static,
{
    /// Returns the value, stopping the process if it is the type's zero
    /// value.
    ///
    /// # Panics
    ///
    /// Panics when the resolved value equals `V::default()`.
    #[must_use]
    #[track_caller]
    pub fn must_value(&self, ctx: &Context) -> V {
        let value = self.value(ctx);
        if value == V::default() {
            fatal(SyncflowError::ZeroValue { slot: self.name });
        }
        value
    }
}

impl<V> std::fmt::Debug for BoxedKey<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxedKey")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
