//! Dirty-driven store replication
//!
//! The authoritative store accumulates dirty item ids and removal
//! notices; [`StoreReplicator::write_update`] drains both into a bit
//! stream, delta-encoding every item against the baseline from the last
//! update. [`StoreReplicator::apply_update`] replays the stream into a
//! replica store in two passes: first every record is brought up to date,
//! then change hooks and observers fire, so a hook never observes a
//! half-applied update.

use std::collections::HashMap;
use std::sync::Arc;

use loadout_core::{ItemId, SlotTag};
use loadout_net::{
    BitReader, BitWriter, NetError, PayloadRegistry, PolymorphicCodec, Quantized,
};

use crate::dispatcher::ExternalSystems;
use crate::item::{ChangeFlags, ItemData};
use crate::store::ItemStore;

/// Replicated record-level fields of one item
#[derive(Debug, Clone, PartialEq)]
struct RecordFields {
    definition_id: String,
    owner: Option<ItemId>,
    attached_to: Option<ItemId>,
    slot: Option<SlotTag>,
    attach_slot: Option<SlotTag>,
    stacks: u32,
    level: u8,
}

impl RecordFields {
    fn of(item: &ItemData) -> Self {
        Self {
            definition_id: item.definition().id().to_owned(),
            owner: item.owner(),
            attached_to: item.attached_to(),
            slot: item.slot().cloned(),
            attach_slot: item.attach_slot().cloned(),
            stacks: item.stacks(),
            level: item.level(),
        }
    }

    fn apply_to(&self, item: &mut ItemData) {
        item.set_owner(self.owner);
        item.set_attachment(self.attached_to, self.attach_slot.clone());
        item.set_slot(self.slot.clone());
        item.set_stacks(self.stacks);
        item.set_level(self.level);
    }

    fn write_full(&self, w: &mut BitWriter) {
        w.write_str(&self.definition_id);
        write_opt_id(w, self.owner);
        write_opt_id(w, self.attached_to);
        write_opt_tag(w, self.slot.as_ref());
        write_opt_tag(w, self.attach_slot.as_ref());
        w.write_u32(self.stacks);
        w.write_bits(self.level as u32, 8);
    }

    fn read_full(r: &mut BitReader) -> Result<Self, NetError> {
        Ok(Self {
            definition_id: r.read_str()?,
            owner: read_opt_id(r)?,
            attached_to: read_opt_id(r)?,
            slot: read_opt_tag(r)?,
            attach_slot: read_opt_tag(r)?,
            stacks: r.read_u32()?,
            level: r.read_bits(8)? as u8,
        })
    }

    /// One changed bit per field, followed by the new value when set
    fn write_delta(&self, prev: &RecordFields, w: &mut BitWriter) {
        write_changed(w, self.definition_id != prev.definition_id, |w| {
            w.write_str(&self.definition_id)
        });
        write_changed(w, self.owner != prev.owner, |w| write_opt_id(w, self.owner));
        write_changed(w, self.attached_to != prev.attached_to, |w| {
            write_opt_id(w, self.attached_to)
        });
        write_changed(w, self.slot != prev.slot, |w| {
            write_opt_tag(w, self.slot.as_ref())
        });
        write_changed(w, self.attach_slot != prev.attach_slot, |w| {
            write_opt_tag(w, self.attach_slot.as_ref())
        });
        write_changed(w, self.stacks != prev.stacks, |w| w.write_u32(self.stacks));
        write_changed(w, self.level != prev.level, |w| {
            w.write_bits(self.level as u32, 8)
        });
    }

    fn read_delta(prev: &RecordFields, r: &mut BitReader) -> Result<Self, NetError> {
        let mut fields = prev.clone();
        if r.read_bool()? {
            fields.definition_id = r.read_str()?;
        }
        if r.read_bool()? {
            fields.owner = read_opt_id(r)?;
        }
        if r.read_bool()? {
            fields.attached_to = read_opt_id(r)?;
        }
        if r.read_bool()? {
            fields.slot = read_opt_tag(r)?;
        }
        if r.read_bool()? {
            fields.attach_slot = read_opt_tag(r)?;
        }
        if r.read_bool()? {
            fields.stacks = r.read_u32()?;
        }
        if r.read_bool()? {
            fields.level = r.read_bits(8)? as u8;
        }
        Ok(fields)
    }
}

fn write_changed(w: &mut BitWriter, changed: bool, value: impl FnOnce(&mut BitWriter)) {
    w.write_bool(changed);
    if changed {
        value(w);
    }
}

fn write_opt_id(w: &mut BitWriter, id: Option<ItemId>) {
    w.write_bool(id.is_some());
    if let Some(id) = id {
        w.write_u128(id.to_bits());
    }
}

fn read_opt_id(r: &mut BitReader) -> Result<Option<ItemId>, NetError> {
    if r.read_bool()? {
        Ok(Some(ItemId::from_bits(r.read_u128()?)))
    } else {
        Ok(None)
    }
}

fn write_opt_tag(w: &mut BitWriter, tag: Option<&SlotTag>) {
    w.write_bool(tag.is_some());
    if let Some(tag) = tag {
        w.write_str(tag.name());
    }
}

fn read_opt_tag(r: &mut BitReader) -> Result<Option<SlotTag>, NetError> {
    if r.read_bool()? {
        Ok(Some(SlotTag::new(&r.read_str()?)))
    } else {
        Ok(None)
    }
}

/// Clamp a count to its wire field's range; overflow desyncs the stream
fn clamped_count(len: usize, max: usize, what: &str) -> usize {
    if len > max {
        log::error!("{what} count {len} exceeds wire limit {max}, truncating");
        return max;
    }
    len
}

struct ItemBaseline {
    fields: RecordFields,
    instances: Vec<Quantized>,
}

/// Per-connection replication driver.
///
/// Each side of a connection owns one replicator; its baselines mirror
/// what the peer last saw (sender side) or last sent (receiver side), so
/// deltas decode against exactly the state they were encoded against.
pub struct StoreReplicator {
    codec: PolymorphicCodec,
    baselines: HashMap<ItemId, ItemBaseline>,
}

impl StoreReplicator {
    /// Create a replicator over a payload registry
    pub fn new(registry: Arc<PayloadRegistry>) -> Self {
        Self {
            codec: PolymorphicCodec::new(registry),
            baselines: HashMap::new(),
        }
    }

    /// The codec used for instance payloads
    pub fn codec(&self) -> &PolymorphicCodec {
        &self.codec
    }

    /// Drain the store's removals and dirty items into an update.
    ///
    /// Removals are written first so a removal plus re-add of the same
    /// definition applies in the right order. Dirty items are written in
    /// store order; each becomes a delta against this replicator's
    /// baseline, or a full encode on first sight.
    pub fn write_update(&mut self, store: &mut ItemStore, w: &mut BitWriter) {
        let removed = store.take_removed();
        let removal_count = clamped_count(removed.len(), u16::MAX as usize, "removal");
        w.write_u16(removal_count as u16);
        for id in removed.into_iter().take(removal_count) {
            w.write_u128(id.to_bits());
            self.baselines.remove(&id);
            self.codec.evict(id);
        }

        let dirty = store.drain_dirty_in_order();
        let dirty_count = clamped_count(dirty.len(), u16::MAX as usize, "record");
        w.write_u16(dirty_count as u16);
        for id in dirty.into_iter().take(dirty_count) {
            let Some(rc) = store.get(id) else {
                // drain_dirty_in_order only yields live ids
                continue;
            };
            let data = rc.borrow();
            let fields = RecordFields::of(&data);
            let instances: Vec<Quantized> = data
                .instances()
                .iter()
                .map(|i| self.codec.quantize(Some(i.as_ref())))
                .collect();
            drop(data);

            w.write_u128(id.to_bits());
            match self.baselines.get(&id) {
                Some(baseline) => {
                    w.write_bool(true);
                    fields.write_delta(&baseline.fields, w);
                    let count = clamped_count(instances.len(), u8::MAX as usize, "instance");
                    w.write_u8(count as u8);
                    let empty = Quantized::none();
                    for (i, q) in instances.iter().take(count).enumerate() {
                        let prev = baseline.instances.get(i).unwrap_or(&empty);
                        self.codec.serialize_delta(q, prev, w);
                    }
                }
                None => {
                    w.write_bool(false);
                    fields.write_full(w);
                    let count = clamped_count(instances.len(), u8::MAX as usize, "instance");
                    w.write_u8(count as u8);
                    for q in instances.iter().take(count) {
                        self.codec.serialize(q, w);
                    }
                }
            }
            self.baselines.insert(id, ItemBaseline { fields, instances });
        }
    }

    /// Apply an update produced by the peer's `write_update`.
    ///
    /// Pass one applies removals and brings every record up to date; pass
    /// two runs change hooks and observers, in the same order the records
    /// appeared on the wire. A decode error aborts the whole update.
    pub fn apply_update(
        &mut self,
        store: &mut ItemStore,
        r: &mut BitReader,
        ext: &mut ExternalSystems<'_>,
    ) -> Result<(), NetError> {
        let removed = r.read_u16()?;
        for _ in 0..removed {
            let id = ItemId::from_bits(r.read_u128()?);
            self.baselines.remove(&id);
            self.codec.evict(id);
            // The sender enumerated every destroyed id; never recurse here
            store.remove_replica_item(id, ext);
        }

        let count = r.read_u16()?;
        let mut created: Vec<ItemId> = Vec::new();
        let mut changed: Vec<(ItemId, ChangeFlags, Option<SlotTag>, Option<ItemId>)> = Vec::new();

        for _ in 0..count {
            let id = ItemId::from_bits(r.read_u128()?);
            let is_delta = r.read_bool()?;

            let (fields, instances) = if is_delta {
                let baseline = self.baselines.get(&id).ok_or(NetError::MissingBaseline)?;
                let fields = RecordFields::read_delta(&baseline.fields, r)?;
                let instance_count = r.read_u8()? as usize;
                let empty = Quantized::none();
                let mut instances = Vec::with_capacity(instance_count);
                for i in 0..instance_count {
                    let prev = baseline.instances.get(i).unwrap_or(&empty);
                    instances.push(self.codec.deserialize_delta(prev, r)?);
                }
                (fields, instances)
            } else {
                let fields = RecordFields::read_full(r)?;
                let instance_count = r.read_u8()? as usize;
                let mut instances = Vec::with_capacity(instance_count);
                for _ in 0..instance_count {
                    instances.push(self.codec.deserialize(r)?);
                }
                (fields, instances)
            };

            let Some(definition) = store.definitions().get(&fields.definition_id).cloned() else {
                // Keep the baseline in sync so later deltas still decode
                log::error!(
                    "update names unknown definition {:?} for {id}, record skipped",
                    fields.definition_id
                );
                self.baselines.insert(id, ItemBaseline { fields, instances });
                continue;
            };

            let mut incoming = ItemData::new(id, definition);
            fields.apply_to(&mut incoming);
            for q in &instances {
                if let Some(state) = q.state() {
                    incoming.push_instance(state.clone_payload());
                }
            }

            match store.get(id) {
                Some(rc) => {
                    let prev_slot = rc.borrow().slot().cloned();
                    let prev_parent = rc.borrow().attached_to();
                    let flags = rc.borrow_mut().apply(&incoming);
                    if flags.any() {
                        changed.push((id, flags, prev_slot, prev_parent));
                    }
                }
                None => {
                    store.insert_replica(incoming);
                    created.push(id);
                }
            }
            self.baselines.insert(id, ItemBaseline { fields, instances });
        }

        for id in created {
            store.run_replica_added(id, ext);
        }
        for (id, flags, prev_slot, prev_parent) in changed {
            store.run_replica_changed(id, flags, prev_slot, prev_parent, ext);
        }
        Ok(())
    }
}

impl core::fmt::Debug for StoreReplicator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StoreReplicator")
            .field("baselines", &self.baselines.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{DefinitionSet, ItemDefinition};
    use crate::dispatcher::NullSystems;
    use crate::fragment::DurabilityFragment;
    use crate::instance::{builtin_payloads, DurabilityInstance};
    use crate::scalable::ScalableFloat;
    use crate::spec::ItemSpec;
    use loadout_core::Authority;
    use std::rc::Rc;

    fn defs() -> DefinitionSet {
        DefinitionSet::new()
            .with(
                ItemDefinition::new("rifle", "Rifle")
                    .with_fragment(DurabilityFragment::new(ScalableFloat::constant(100.0)))
                    .into(),
            )
            .with(ItemDefinition::new("barrel", "Barrel").into())
    }

    struct Link {
        owner: ItemStore,
        replica: ItemStore,
        sender: StoreReplicator,
        receiver: StoreReplicator,
    }

    impl Link {
        fn new() -> Self {
            let registry: Arc<_> = builtin_payloads().build().into();
            Self {
                owner: ItemStore::new(Authority::Authoritative, defs()),
                replica: ItemStore::new(Authority::Remote, defs()),
                sender: StoreReplicator::new(Arc::clone(&registry)),
                receiver: StoreReplicator::new(registry),
            }
        }

        fn sync(&mut self, systems: &mut NullSystems) {
            let mut w = BitWriter::new();
            self.sender.write_update(&mut self.owner, &mut w);
            let bytes = w.finish();
            self.receiver
                .apply_update(
                    &mut self.replica,
                    &mut BitReader::new(&bytes),
                    &mut systems.as_external(),
                )
                .unwrap();
        }
    }

    fn add_rifle(link: &mut Link, systems: &mut NullSystems) -> loadout_core::ItemId {
        let def = link.owner.definitions().get("rifle").unwrap().clone();
        let (id, _) = link
            .owner
            .add_item(ItemSpec::new(def), &mut systems.as_external());
        id
    }

    #[test]
    fn test_initial_sync_creates_replicas() {
        let mut link = Link::new();
        let mut systems = NullSystems::default();
        let rifle = add_rifle(&mut link, &mut systems);

        link.sync(&mut systems);

        assert_eq!(link.replica.len(), 1);
        let rc = link.replica.get(rifle).unwrap();
        let data = rc.borrow();
        assert_eq!(data.definition().id(), "rifle");
        let durability = data.find_instance::<DurabilityInstance>().unwrap();
        assert_eq!(durability.current, 100.0);
        assert_eq!(durability.max, 100.0);
    }

    #[test]
    fn test_delta_update_preserves_replica_identity() {
        let mut link = Link::new();
        let mut systems = NullSystems::default();
        let rifle = add_rifle(&mut link, &mut systems);
        link.sync(&mut systems);

        let replica_rc = link.replica.get(rifle).unwrap();
        // Replica-local state that replication must not clobber
        replica_rc
            .borrow_mut()
            .find_instance_mut::<DurabilityInstance>()
            .unwrap()
            .last_damage_frame = 1234;

        {
            let owner_rc = link.owner.get(rifle).unwrap();
            owner_rc
                .borrow_mut()
                .find_instance_mut::<DurabilityInstance>()
                .unwrap()
                .current = 60.0;
        }
        link.owner.mark_item_dirty(rifle);
        link.sync(&mut systems);

        // Same live record and instance, updated in place
        let after = link.replica.get(rifle).unwrap();
        assert!(Rc::ptr_eq(&replica_rc, &after));
        let data = after.borrow();
        let durability = data.find_instance::<DurabilityInstance>().unwrap();
        assert_eq!(durability.current, 60.0);
        assert_eq!(durability.last_damage_frame, 1234);
    }

    #[test]
    fn test_clean_store_writes_empty_update() {
        let mut link = Link::new();
        let mut systems = NullSystems::default();
        add_rifle(&mut link, &mut systems);
        link.sync(&mut systems);

        let mut w = BitWriter::new();
        link.sender.write_update(&mut link.owner, &mut w);
        // Two u16 zero counts
        assert_eq!(w.bit_len(), 32);
    }

    #[test]
    fn test_removal_propagates_and_evicts() {
        let mut link = Link::new();
        let mut systems = NullSystems::default();
        let rifle = add_rifle(&mut link, &mut systems);
        link.sync(&mut systems);
        assert_eq!(link.replica.len(), 1);

        link.owner.remove_item(rifle, &mut systems.as_external());
        link.sync(&mut systems);

        assert!(link.replica.is_empty());
        assert!(!link.replica.contains(rifle));
        // A later update never references the removed id again
        link.sync(&mut systems);
        assert!(link.replica.is_empty());
    }

    #[test]
    fn test_delta_without_baseline_is_protocol_error() {
        let mut link = Link::new();
        let mut systems = NullSystems::default();
        let rifle = add_rifle(&mut link, &mut systems);
        link.sync(&mut systems);

        // Sender thinks the peer has a baseline; a fresh receiver does not
        link.owner.mark_item_dirty(rifle);
        let mut w = BitWriter::new();
        link.sender.write_update(&mut link.owner, &mut w);
        let bytes = w.finish();

        let mut fresh = StoreReplicator::new(builtin_payloads().build().into());
        let mut replica = ItemStore::new(Authority::Remote, defs());
        let err = fresh
            .apply_update(
                &mut replica,
                &mut BitReader::new(&bytes),
                &mut systems.as_external(),
            )
            .unwrap_err();
        assert!(matches!(err, NetError::MissingBaseline));
    }

    #[test]
    fn test_wire_counts_clamp_to_field_range() {
        assert_eq!(clamped_count(3, u8::MAX as usize, "instance"), 3);
        assert_eq!(
            clamped_count(70_000, u16::MAX as usize, "record"),
            u16::MAX as usize
        );
    }

    #[test]
    fn test_unknown_definition_skips_record() {
        let mut link = Link::new();
        let mut systems = NullSystems::default();
        // Replica with an empty definition set cannot materialize the item
        link.replica = ItemStore::new(Authority::Remote, DefinitionSet::new());
        add_rifle(&mut link, &mut systems);

        link.sync(&mut systems);
        assert!(link.replica.is_empty());
    }
}
