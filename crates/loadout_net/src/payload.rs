//! Object-safe payload contract
//!
//! A payload is a mutable, replicated piece of item state. Each concrete
//! type spells out its own wire layout member by member; the codec only
//! ever sees the object-safe [`NetPayload`] surface plus the typed
//! decode entry points captured in the registry.

use core::any::Any;
use core::fmt;

use loadout_core::ItemId;

use crate::bit::{BitReader, BitWriter};
use crate::error::NetError;

/// Replicated payload surface used by the codec and the item store.
///
/// `write`/`write_delta`/`payload_eq`/`assign_from` all operate on the
/// replicated member set only; local-only bookkeeping fields are excluded
/// from comparison and never touch the wire.
pub trait NetPayload: fmt::Debug {
    /// Stable type key, unique across the registry
    fn type_key(&self) -> &'static str;

    /// Write the full replicated state
    fn write(&self, w: &mut BitWriter);

    /// Write a delta against `prev`, which is always the same concrete type
    fn write_delta(&self, prev: &dyn NetPayload, w: &mut BitWriter);

    /// Compare replicated state with another payload of any type
    fn payload_eq(&self, other: &dyn NetPayload) -> bool;

    /// Copy replicated state from `src`, keeping local-only state intact.
    /// `src` is always the same concrete type.
    fn assign_from(&mut self, src: &dyn NetPayload);

    /// Deep copy, local-only state included
    fn clone_payload(&self) -> Box<dyn NetPayload>;

    /// Deep copy with local-only state reset to defaults
    fn quantized(&self) -> Box<dyn NetPayload> {
        self.clone_payload()
    }

    /// Append every item id this payload references
    fn collect_refs(&self, _out: &mut Vec<ItemId>) {}

    /// Check decoded state for out-of-range values
    fn validate(&self) -> bool {
        true
    }

    /// Downcast support
    fn as_any(&self) -> &dyn Any;

    /// Downcast support
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Typed decode entry points, captured by the registry at registration
pub trait DecodePayload: NetPayload + Sized {
    /// Type key, must match [`NetPayload::type_key`]
    const KEY: &'static str;

    /// Decode a full state written by [`NetPayload::write`]
    fn read(r: &mut BitReader) -> Result<Self, NetError>;

    /// Apply a delta written by [`NetPayload::write_delta`] onto a copy of
    /// the previous state
    fn read_delta(&mut self, r: &mut BitReader) -> Result<(), NetError>;
}

/// Downcast a payload reference to a concrete type
pub fn payload_downcast_ref<T: 'static>(payload: &dyn NetPayload) -> Option<&T> {
    payload.as_any().downcast_ref::<T>()
}

/// Downcast a mutable payload reference to a concrete type
pub fn payload_downcast_mut<T: 'static>(payload: &mut dyn NetPayload) -> Option<&mut T> {
    payload.as_any_mut().downcast_mut::<T>()
}
