//! Polymorphic payload codec
//!
//! Encode path: live payload -> [`Quantized`] scratch -> bit stream.
//! Decode path: bit stream -> [`Quantized`] -> materialized live payload.
//!
//! Materialization preserves identity: the codec keeps one live payload
//! per item id and mutates it in place while the incoming type stays the
//! same, so handles held by gameplay code keep observing updates instead
//! of going stale. Freeing quantized state is just dropping it; the
//! materialization table is the only state that needs explicit eviction,
//! via [`PolymorphicCodec::evict`] when an item is removed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use loadout_core::ItemId;

use crate::bit::{BitReader, BitWriter};
use crate::error::NetError;
use crate::payload::NetPayload;
use crate::registry::{PayloadRegistry, INVALID_TYPE_INDEX, TYPE_INDEX_BITS};

/// Wire-ready snapshot of a polymorphic payload.
///
/// Holds the resolved type index and a deep copy of the replicated state
/// with local-only fields reset. An empty value (no payload, or a payload
/// whose type was not registered) carries [`INVALID_TYPE_INDEX`].
#[derive(Debug, Default)]
pub struct Quantized {
    slot: Option<(u8, Box<dyn NetPayload>)>,
}

impl Quantized {
    /// The empty snapshot
    pub fn none() -> Self {
        Self { slot: None }
    }

    /// Check if this snapshot carries no payload
    #[inline]
    pub fn is_none(&self) -> bool {
        self.slot.is_none()
    }

    /// Check if this snapshot carries a payload
    #[inline]
    pub fn is_some(&self) -> bool {
        self.slot.is_some()
    }

    /// Resolved type index, [`INVALID_TYPE_INDEX`] when empty
    #[inline]
    pub fn type_index(&self) -> u8 {
        match &self.slot {
            Some((index, _)) => *index,
            None => INVALID_TYPE_INDEX,
        }
    }

    /// Snapshotted state, if any
    pub fn state(&self) -> Option<&dyn NetPayload> {
        self.slot.as_ref().map(|(_, state)| state.as_ref())
    }
}

/// Handle to a payload materialized by [`PolymorphicCodec::dequantize`]
pub type MaterializedPayload = Rc<RefCell<Box<dyn NetPayload>>>;

/// Stateful codec for one replicated polymorphic field per item
pub struct PolymorphicCodec {
    registry: Arc<PayloadRegistry>,
    materialized: HashMap<ItemId, MaterializedPayload>,
}

impl PolymorphicCodec {
    /// Create a codec over a finalized registry
    pub fn new(registry: Arc<PayloadRegistry>) -> Self {
        Self {
            registry,
            materialized: HashMap::new(),
        }
    }

    /// The registry this codec encodes against
    pub fn registry(&self) -> &PayloadRegistry {
        &self.registry
    }

    /// Snapshot a live payload for encoding.
    ///
    /// A payload whose type is not registered cannot cross the wire; it is
    /// logged as a protocol error and snapshotted as empty.
    pub fn quantize(&self, value: Option<&dyn NetPayload>) -> Quantized {
        let Some(value) = value else {
            return Quantized::none();
        };
        let index = self.registry.type_index(value.type_key());
        if index == INVALID_TYPE_INDEX {
            log::error!(
                "cannot replicate unregistered payload type {:?}",
                value.type_key()
            );
            return Quantized::none();
        }
        Quantized {
            slot: Some((index, value.quantized())),
        }
    }

    /// Write a full snapshot: present bit, then type index and state
    pub fn serialize(&self, quantized: &Quantized, w: &mut BitWriter) {
        match &quantized.slot {
            Some((index, state)) => {
                w.write_bool(true);
                w.write_bits(*index as u32, TYPE_INDEX_BITS);
                state.write(w);
            }
            None => w.write_bool(false),
        }
    }

    /// Write a delta against the previous snapshot.
    ///
    /// When the type index changed (including to or from empty) the delta
    /// degrades to a nested full encode; deltas never cross types.
    pub fn serialize_delta(&self, current: &Quantized, prev: &Quantized, w: &mut BitWriter) {
        match (&current.slot, &prev.slot) {
            (Some((cur_index, cur_state)), Some((prev_index, prev_state)))
                if cur_index == prev_index =>
            {
                w.write_bool(true);
                cur_state.write_delta(prev_state.as_ref(), w);
            }
            _ => {
                w.write_bool(false);
                self.serialize(current, w);
            }
        }
    }

    /// Read a full snapshot
    pub fn deserialize(&self, r: &mut BitReader) -> Result<Quantized, NetError> {
        if !r.read_bool()? {
            return Ok(Quantized::none());
        }
        let index = r.read_bits(TYPE_INDEX_BITS)? as u8;
        let descriptor = self
            .registry
            .descriptor(index)
            .ok_or(NetError::UnknownTypeIndex(index))?;
        let state = descriptor.read(r)?;
        Ok(Quantized {
            slot: Some((index, state)),
        })
    }

    /// Read a delta written against `prev`
    pub fn deserialize_delta(
        &self,
        prev: &Quantized,
        r: &mut BitReader,
    ) -> Result<Quantized, NetError> {
        if !r.read_bool()? {
            return self.deserialize(r);
        }
        let Some((index, prev_state)) = &prev.slot else {
            return Err(NetError::MissingBaseline);
        };
        let descriptor = self
            .registry
            .descriptor(*index)
            .ok_or(NetError::UnknownTypeIndex(*index))?;
        let state = descriptor.read_delta(prev_state.as_ref(), r)?;
        Ok(Quantized {
            slot: Some((*index, state)),
        })
    }

    /// Materialize a decoded snapshot as a live payload for `item`.
    ///
    /// While the incoming type matches the existing live payload, state is
    /// assigned in place and the same handle is returned. A type change
    /// allocates a fresh payload; an empty snapshot drops the entry.
    pub fn dequantize(
        &mut self,
        item: ItemId,
        quantized: &Quantized,
    ) -> Option<MaterializedPayload> {
        let Some((_, state)) = &quantized.slot else {
            self.materialized.remove(&item);
            return None;
        };

        if let Some(existing) = self.materialized.get(&item) {
            if existing.borrow().type_key() == state.type_key() {
                existing.borrow_mut().assign_from(state.as_ref());
                return Some(Rc::clone(existing));
            }
        }

        let fresh: MaterializedPayload = Rc::new(RefCell::new(state.clone_payload()));
        self.materialized.insert(item, Rc::clone(&fresh));
        Some(fresh)
    }

    /// Drop the materialized payload for a removed item
    pub fn evict(&mut self, item: ItemId) {
        self.materialized.remove(&item);
    }

    /// Number of currently materialized payloads
    pub fn materialized_len(&self) -> usize {
        self.materialized.len()
    }

    /// Compare two snapshots by type index and replicated state
    pub fn is_equal(&self, a: &Quantized, b: &Quantized) -> bool {
        if a.type_index() != b.type_index() {
            return false;
        }
        match (a.state(), b.state()) {
            (Some(a), Some(b)) => a.payload_eq(b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Compare two live payloads, treating two empties as equal
    pub fn is_equal_live(&self, a: Option<&dyn NetPayload>, b: Option<&dyn NetPayload>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => a.type_key() == b.type_key() && a.payload_eq(b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Validate a snapshot's state; empty snapshots are valid
    pub fn validate(&self, quantized: &Quantized) -> bool {
        quantized.state().map_or(true, |s| s.validate())
    }

    /// Deep copy of a snapshot
    pub fn clone_quantized(&self, quantized: &Quantized) -> Quantized {
        Quantized {
            slot: quantized
                .slot
                .as_ref()
                .map(|(index, state)| (*index, state.clone_payload())),
        }
    }

    /// Collect every item id referenced by a snapshot
    pub fn collect_refs(&self, quantized: &Quantized, out: &mut Vec<ItemId>) {
        if let Some(state) = quantized.state() {
            state.collect_refs(out);
        }
    }
}

impl core::fmt::Debug for PolymorphicCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PolymorphicCodec")
            .field("registered", &self.registry.len())
            .field("materialized", &self.materialized.len())
            .finish()
    }
}
