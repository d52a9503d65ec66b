//! End-to-end store replication over the bit codec

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use loadout_items::prelude::*;
use loadout_net::{BitReader, BitWriter};

fn definitions() -> DefinitionSet {
    DefinitionSet::new()
        .with(
            ItemDefinition::new("rifle", "Rifle")
                .with_fragment(DurabilityFragment::new(
                    ScalableFloat::constant(100.0).with_point(5, 1.5),
                ))
                .with_fragment(GrantedAbilitiesFragment::new(["ability.shoot"]))
                .with_fragment(ScalableFloatFragment::new(
                    "damage",
                    ScalableFloat::constant(12.0),
                ))
                .into(),
        )
        .with(
            ItemDefinition::new("scope", "Scope")
                .with_fragment(ScalableFloatFragment::new(
                    "zoom",
                    ScalableFloat::constant(4.0),
                ))
                .into(),
        )
        .with(
            ItemDefinition::new("ammo_box", "Ammo Box")
                .with_max_stack(999)
                .into(),
        )
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
            owner: ItemStore::new(Authority::Authoritative, definitions()),
            replica: ItemStore::new(Authority::Remote, definitions()),
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
            .expect("update applies");
    }

    fn add(&mut self, systems: &mut NullSystems, def: &str) -> ItemId {
        let def = self.owner.definitions().get(def).unwrap().clone();
        let (id, _) = self
            .owner
            .add_item(ItemSpec::new(def), &mut systems.as_external());
        id
    }
}

#[test]
fn full_loadout_mirrors_to_replica() {
    let mut link = Link::new();
    let mut systems = NullSystems::default();

    let rifle = link.add(&mut systems, "rifle");
    let scope = link.add(&mut systems, "scope");
    link.owner
        .attach_item(scope, rifle, SlotTag::new("slot.optic"), &mut systems.as_external())
        .unwrap();
    link.owner
        .add_item_to_slot(rifle, SlotTag::new("slot.weapon.primary"), &mut systems.as_external())
        .unwrap();

    link.sync(&mut systems);

    assert_eq!(link.replica.len(), 2);

    // Store order matches the owner
    let owner_order: Vec<ItemId> = link.owner.items().map(|e| e.borrow().id()).collect();
    let replica_order: Vec<ItemId> = link.replica.items().map(|e| e.borrow().id()).collect();
    assert_eq!(owner_order, replica_order);

    let replica_rifle = link.replica.get(rifle).unwrap();
    let data = replica_rifle.borrow();
    assert_eq!(data.slot().unwrap().name(), "slot.weapon.primary");
    assert_eq!(data.scaled_value("damage"), Some(12.0));
    // Scope's stat merged into the rifle's cache through the attachment
    assert_eq!(data.scaled_value("zoom"), Some(4.0));

    // Grant handles replicated; the replica itself never granted anything
    let owner_rc = link.owner.get(rifle).unwrap();
    let owner_handles = owner_rc
        .borrow()
        .find_instance::<GrantedAbilitiesInstance>()
        .unwrap()
        .handles
        .clone();
    assert_eq!(owner_handles.len(), 1);
    let grants = data.find_instance::<GrantedAbilitiesInstance>().unwrap();
    assert_eq!(grants.handles, owner_handles);
    assert_eq!(link.replica.pending_grants(), 0);

    assert_eq!(
        link.replica.get(scope).unwrap().borrow().attached_to(),
        Some(rifle)
    );
}

#[test]
fn changed_hooks_fire_after_all_records_apply() {
    let mut link = Link::new();
    let mut systems = NullSystems::default();

    let first = link.add(&mut systems, "ammo_box");
    let second = link.add(&mut systems, "rifle");
    link.sync(&mut systems);

    // Mutate both on the owner in one frame
    link.owner
        .get(first)
        .unwrap()
        .borrow_mut()
        .set_stacks(77);
    link.owner.get(second).unwrap().borrow_mut().set_level(5);
    link.owner.mark_item_dirty(first);
    link.owner.mark_item_dirty(second);

    // When the first item's change hook fires, the second item's record
    // must already hold the new state
    let second_rc = link.replica.get(second).unwrap();
    let checked = Rc::new(Cell::new(false));
    let checked_cb = Rc::clone(&checked);
    link.replica.subscribe_changed(move |id, flags| {
        if id == first {
            assert!(flags.record);
            assert_eq!(second_rc.borrow().level(), 5);
            checked_cb.set(true);
        }
    });

    link.sync(&mut systems);
    assert!(checked.get());
    assert_eq!(link.replica.get(first).unwrap().borrow().stacks(), 77);
}

#[test]
fn unslot_revokes_on_owner_and_mirrors() {
    let mut link = Link::new();
    let mut systems = NullSystems::default();
    let rifle = link.add(&mut systems, "rifle");
    let slot = SlotTag::new("slot.weapon.primary");

    link.owner
        .add_item_to_slot(rifle, slot.clone(), &mut systems.as_external())
        .unwrap();
    link.sync(&mut systems);
    assert!(link.replica.get(rifle).unwrap().borrow().slot().is_some());

    link.owner
        .remove_item_from_slot(rifle, &mut systems.as_external())
        .unwrap();
    assert!(link
        .owner
        .get(rifle)
        .unwrap()
        .borrow()
        .find_instance::<GrantedAbilitiesInstance>()
        .unwrap()
        .handles
        .is_empty());

    link.sync(&mut systems);
    let replica_rc = link.replica.get(rifle).unwrap();
    assert!(replica_rc.borrow().slot().is_none());
    assert!(replica_rc
        .borrow()
        .find_instance::<GrantedAbilitiesInstance>()
        .unwrap()
        .handles
        .is_empty());
}

#[test]
fn detach_then_remove_parent_keeps_child_on_replica() {
    let mut link = Link::new();
    let mut systems = NullSystems::default();
    let rifle = link.add(&mut systems, "rifle");
    let scope = link.add(&mut systems, "scope");
    link.owner
        .attach_item(scope, rifle, SlotTag::new("slot.optic"), &mut systems.as_external())
        .unwrap();
    link.sync(&mut systems);

    let replica_scope = link.replica.get(scope).unwrap();
    let removed = Rc::new(RefCell::new(Vec::new()));
    let removed_cb = Rc::clone(&removed);
    link.replica
        .subscribe_removed(move |id| removed_cb.borrow_mut().push(id));

    // Detach the scope, then remove only the rifle, all in one frame
    link.owner.detach_item(scope, &mut systems.as_external()).unwrap();
    link.owner.remove_item(rifle, &mut systems.as_external());
    link.sync(&mut systems);

    // The removal notice named the rifle alone; the scope must survive
    // in place, not be swept as an attachment and re-created
    assert_eq!(*removed.borrow(), vec![rifle]);
    assert!(!link.replica.contains(rifle));
    let after = link.replica.get(scope).unwrap();
    assert!(Rc::ptr_eq(&replica_scope, &after));
    assert_eq!(after.borrow().attached_to(), None);
}

#[test]
fn removal_and_readd_converge_without_residue() {
    let mut link = Link::new();
    let mut systems = NullSystems::default();

    let mut ids = Vec::new();
    for _ in 0..8 {
        ids.push(link.add(&mut systems, "rifle"));
    }
    link.sync(&mut systems);
    assert_eq!(link.replica.len(), 8);

    for id in &ids {
        link.owner.remove_item(*id, &mut systems.as_external());
    }
    let fresh = link.add(&mut systems, "rifle");
    link.sync(&mut systems);

    assert_eq!(link.replica.len(), 1);
    assert!(link.replica.contains(fresh));
    for id in &ids {
        assert!(!link.replica.contains(*id));
        // Ids of removed items are never reused
        assert_ne!(*id, fresh);
    }

    // Steady state: nothing dirty, the next update carries nothing
    let mut w = BitWriter::new();
    link.sender.write_update(&mut link.owner, &mut w);
    assert_eq!(w.bit_len(), 32);
}

#[test]
fn level_change_rescales_stats_on_replica() {
    let mut link = Link::new();
    let mut systems = NullSystems::default();
    let rifle = link.add(&mut systems, "rifle");
    link.sync(&mut systems);

    link.owner.get(rifle).unwrap().borrow_mut().set_level(5);
    link.owner.mark_item_dirty(rifle);
    link.sync(&mut systems);

    let replica_rc = link.replica.get(rifle).unwrap();
    assert_eq!(replica_rc.borrow().level(), 5);
    // Stat lookups evaluate the curve at the replicated level
    assert_eq!(replica_rc.borrow().scaled_value("damage"), Some(12.0));
}
