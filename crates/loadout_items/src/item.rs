//! Runtime item records

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use loadout_core::{ItemId, SlotTag};
use loadout_net::{payload_downcast_mut, payload_downcast_ref, NetPayload};

use crate::definition::ItemDefinition;
use crate::fragment::ScalableFloatFragment;
use crate::scalable::ScalableFloat;

/// What a record assignment actually changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeFlags {
    /// Record-level fields changed (slot, stacks, level, attachment, ...)
    pub record: bool,
    /// Instance payload state changed
    pub instances: bool,
}

impl ChangeFlags {
    /// Check if anything changed
    pub fn any(&self) -> bool {
        self.record || self.instances
    }

    /// Combine with another set of flags
    pub fn merge(&mut self, other: ChangeFlags) {
        self.record |= other.record;
        self.instances |= other.instances;
    }
}

/// Mutable runtime state of one item.
///
/// A record pairs an immutable definition with the replicated fields that
/// change at runtime, plus the item's mutable instances. Records live in
/// an [`ItemStore`](crate::store::ItemStore) behind `Rc<RefCell<..>>`, so
/// replication updates the same object gameplay code holds.
#[derive(Debug)]
pub struct ItemData {
    id: ItemId,
    definition: Arc<ItemDefinition>,
    owner: Option<ItemId>,
    attached_to: Option<ItemId>,
    slot: Option<SlotTag>,
    attach_slot: Option<SlotTag>,
    stacks: u32,
    level: u8,
    instances: Vec<Box<dyn NetPayload>>,
    stat_cache: HashMap<Box<str>, ScalableFloat>,
}

impl ItemData {
    pub(crate) fn new(id: ItemId, definition: Arc<ItemDefinition>) -> Self {
        Self {
            id,
            definition,
            owner: None,
            attached_to: None,
            slot: None,
            attach_slot: None,
            stacks: 1,
            level: 1,
            instances: Vec::new(),
            stat_cache: HashMap::new(),
        }
    }

    /// Stable item id
    #[inline]
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// The item's definition
    #[inline]
    pub fn definition(&self) -> &Arc<ItemDefinition> {
        &self.definition
    }

    /// External owning entity, if any
    #[inline]
    pub fn owner(&self) -> Option<ItemId> {
        self.owner
    }

    /// Parent item this item is attached under
    #[inline]
    pub fn attached_to(&self) -> Option<ItemId> {
        self.attached_to
    }

    /// Equipment slot the item sits in
    #[inline]
    pub fn slot(&self) -> Option<&SlotTag> {
        self.slot.as_ref()
    }

    /// Attachment slot on the parent item
    #[inline]
    pub fn attach_slot(&self) -> Option<&SlotTag> {
        self.attach_slot.as_ref()
    }

    /// Current stack count
    #[inline]
    pub fn stacks(&self) -> u32 {
        self.stacks
    }

    /// Item level
    #[inline]
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Set the external owner
    pub fn set_owner(&mut self, owner: Option<ItemId>) {
        self.owner = owner;
    }

    /// Set the stack count, clamped to the definition's max
    pub fn set_stacks(&mut self, stacks: u32) {
        self.stacks = stacks.min(self.definition.max_stack()).max(1);
    }

    /// Set the item level
    pub fn set_level(&mut self, level: u8) {
        self.level = level.max(1);
    }

    pub(crate) fn set_slot(&mut self, slot: Option<SlotTag>) {
        self.slot = slot;
    }

    pub(crate) fn set_attachment(&mut self, parent: Option<ItemId>, slot: Option<SlotTag>) {
        self.attached_to = parent;
        self.attach_slot = slot;
    }

    pub(crate) fn push_instance(&mut self, instance: Box<dyn NetPayload>) {
        self.instances.push(instance);
    }

    /// All mutable instances
    pub fn instances(&self) -> &[Box<dyn NetPayload>] {
        &self.instances
    }

    /// Check whether an instance of the given type exists
    pub fn has_instance<T: NetPayload + 'static>(&self) -> bool {
        self.find_instance::<T>().is_some()
    }

    /// Find the first instance of a concrete type
    pub fn find_instance<T: NetPayload + 'static>(&self) -> Option<&T> {
        self.instances
            .iter()
            .find_map(|i| payload_downcast_ref::<T>(i.as_ref()))
    }

    /// Find the first instance of a concrete type, mutably
    pub fn find_instance_mut<T: NetPayload + 'static>(&mut self) -> Option<&mut T> {
        self.instances
            .iter_mut()
            .find_map(|i| payload_downcast_mut::<T>(i.as_mut()))
    }

    /// Merged stat value at the item's level.
    ///
    /// The cache covers this item's own stat fragments plus those of every
    /// attached item; it is rebuilt by the store when either set changes.
    pub fn scaled_value(&self, key: &str) -> Option<f32> {
        self.stat_cache.get(key).map(|s| s.value_at(self.level))
    }

    pub(crate) fn rebuild_stat_cache<'a>(
        &mut self,
        attached: impl Iterator<Item = &'a Arc<ItemDefinition>>,
    ) {
        self.stat_cache.clear();
        let own = Arc::clone(&self.definition);
        self.merge_stats_from(&own);
        for definition in attached {
            self.merge_stats_from(definition);
        }
    }

    fn merge_stats_from(&mut self, definition: &ItemDefinition) {
        for fragment in definition.fragments() {
            if let Some(stat) = fragment.as_any().downcast_ref::<ScalableFloatFragment>() {
                self.stat_cache
                    .insert(stat.key().into(), stat.value().clone());
            }
        }
    }

    /// Assign replicated state from another record of the same item.
    ///
    /// Compares field by field and copies only what differs, reporting
    /// what changed. Instances of a matching type are assigned in place so
    /// their identity and local-only state survive; a type or count change
    /// rebuilds the instance list from deep copies.
    pub fn apply(&mut self, incoming: &ItemData) -> ChangeFlags {
        let mut flags = ChangeFlags::default();

        if self.definition.id() != incoming.definition.id() {
            self.definition = Arc::clone(&incoming.definition);
            flags.record = true;
        }
        if self.owner != incoming.owner {
            self.owner = incoming.owner;
            flags.record = true;
        }
        if self.attached_to != incoming.attached_to {
            self.attached_to = incoming.attached_to;
            flags.record = true;
        }
        if self.slot != incoming.slot {
            self.slot = incoming.slot.clone();
            flags.record = true;
        }
        if self.attach_slot != incoming.attach_slot {
            self.attach_slot = incoming.attach_slot.clone();
            flags.record = true;
        }
        if self.stacks != incoming.stacks {
            self.stacks = incoming.stacks;
            flags.record = true;
        }
        if self.level != incoming.level {
            self.level = incoming.level;
            flags.record = true;
        }

        let layout_matches = self.instances.len() == incoming.instances.len()
            && self
                .instances
                .iter()
                .zip(&incoming.instances)
                .all(|(a, b)| a.type_key() == b.type_key());

        if layout_matches {
            for (existing, new) in self.instances.iter_mut().zip(&incoming.instances) {
                if !existing.payload_eq(new.as_ref()) {
                    existing.assign_from(new.as_ref());
                    flags.instances = true;
                }
            }
        } else {
            self.instances = incoming
                .instances
                .iter()
                .map(|i| i.clone_payload())
                .collect();
            flags.instances = true;
        }

        flags
    }

    /// Deep copy of the record, instances included
    pub fn deep_clone(&self) -> ItemData {
        ItemData {
            id: self.id,
            definition: Arc::clone(&self.definition),
            owner: self.owner,
            attached_to: self.attached_to,
            slot: self.slot.clone(),
            attach_slot: self.attach_slot.clone(),
            stacks: self.stacks,
            level: self.level,
            instances: self.instances.iter().map(|i| i.clone_payload()).collect(),
            stat_cache: self.stat_cache.clone(),
        }
    }
}

/// Weak handle to an item record.
///
/// Handles survive item removal and report themselves invalid afterwards;
/// the id they carry is never reassigned to another item.
#[derive(Debug, Clone)]
pub struct ItemHandle {
    id: ItemId,
    item: Weak<RefCell<ItemData>>,
}

impl ItemHandle {
    pub(crate) fn new(id: ItemId, item: &Rc<RefCell<ItemData>>) -> Self {
        Self {
            id,
            item: Rc::downgrade(item),
        }
    }

    /// The id this handle was created for
    #[inline]
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Check whether the item still exists
    pub fn is_valid(&self) -> bool {
        self.item.strong_count() > 0
    }

    /// Resolve to the live record, if it still exists
    pub fn upgrade(&self) -> Option<Rc<RefCell<ItemData>>> {
        self.item.upgrade()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::DurabilityFragment;
    use crate::instance::{DurabilityInstance, GrantedAbilitiesInstance};

    fn record(def: Arc<ItemDefinition>) -> ItemData {
        ItemData::new(ItemId::generate(), def)
    }

    fn sword() -> Arc<ItemDefinition> {
        ItemDefinition::new("sword", "Sword")
            .with_fragment(DurabilityFragment::new(ScalableFloat::constant(50.0)))
            .into()
    }

    #[test]
    fn test_apply_reports_record_changes() {
        let def = sword();
        let mut a = record(Arc::clone(&def));
        let mut b = a.deep_clone();
        b.set_slot(Some(SlotTag::new("slot.weapon")));
        b.set_level(3);

        let flags = a.apply(&b);
        assert!(flags.record);
        assert!(!flags.instances);
        assert_eq!(a.slot().unwrap().name(), "slot.weapon");
        assert_eq!(a.level(), 3);

        // Applying again is a no-op
        let flags = a.apply(&b);
        assert!(!flags.any());
    }

    #[test]
    fn test_apply_assigns_instances_in_place() {
        let def = sword();
        let mut a = record(Arc::clone(&def));
        a.push_instance(Box::new(DurabilityInstance {
            current: 50.0,
            max: 50.0,
            last_damage_frame: 77,
        }));

        let mut b = a.deep_clone();
        b.find_instance_mut::<DurabilityInstance>().unwrap().current = 20.0;

        let flags = a.apply(&b);
        assert!(flags.instances);
        assert!(!flags.record);
        let durability = a.find_instance::<DurabilityInstance>().unwrap();
        assert_eq!(durability.current, 20.0);
        // Local-only state survives an in-place assignment
        assert_eq!(durability.last_damage_frame, 77);
    }

    #[test]
    fn test_apply_rebuilds_on_layout_change() {
        let def = sword();
        let mut a = record(Arc::clone(&def));
        a.push_instance(Box::new(DurabilityInstance::default()));

        let mut b = record(Arc::clone(&def));
        b.push_instance(Box::new(GrantedAbilitiesInstance::default()));

        // Different incoming id is irrelevant to apply; only state matters
        let flags = a.apply(&b);
        assert!(flags.instances);
        assert!(a.find_instance::<DurabilityInstance>().is_none());
        assert!(a.find_instance::<GrantedAbilitiesInstance>().is_some());
    }

    #[test]
    fn test_stat_cache_merges_attached() {
        let rifle: Arc<ItemDefinition> = ItemDefinition::new("rifle", "Rifle")
            .with_fragment(ScalableFloatFragment::new(
                "damage",
                ScalableFloat::constant(12.0),
            ))
            .into();
        let scope: Arc<ItemDefinition> = ItemDefinition::new("scope", "Scope")
            .with_fragment(ScalableFloatFragment::new(
                "zoom",
                ScalableFloat::constant(4.0),
            ))
            .into();

        let mut item = record(Arc::clone(&rifle));
        item.rebuild_stat_cache(core::iter::empty());
        assert_eq!(item.scaled_value("damage"), Some(12.0));
        assert_eq!(item.scaled_value("zoom"), None);

        item.rebuild_stat_cache(core::iter::once(&scope));
        assert_eq!(item.scaled_value("zoom"), Some(4.0));

        // Detach drops the merged entry on the next rebuild
        item.rebuild_stat_cache(core::iter::empty());
        assert_eq!(item.scaled_value("zoom"), None);
    }

    #[test]
    fn test_handle_invalidates_on_drop() {
        let rc = Rc::new(RefCell::new(record(sword())));
        let id = rc.borrow().id();
        let handle = ItemHandle::new(id, &rc);
        assert!(handle.is_valid());
        drop(rc);
        assert!(!handle.is_valid());
        assert!(handle.upgrade().is_none());
        assert_eq!(handle.id(), id);
    }
}
