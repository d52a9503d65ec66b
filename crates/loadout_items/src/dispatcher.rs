//! Fragment lifecycle dispatch
//!
//! The dispatcher owns the per-item lifecycle bookkeeping: which hooks an
//! item has seen, and which ability grants are still waiting for the
//! host. It never talks to the network; the store drives it for both
//! locally-originated and replicated transitions.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use loadout_core::{Authority, ItemId, SlotTag};

use crate::fragment::Fragment;
use crate::instance::GrantedAbilitiesInstance;
use crate::item::ItemData;

/// Opaque handle to one ability grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GrantHandle(pub u64);

/// Result of asking the ability host for a grant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    /// Ability granted now
    Granted(GrantHandle),
    /// Host not ready; retry next tick
    NotReady,
}

/// External system that owns ability grants
pub trait AbilityHost {
    /// Try to grant an ability on behalf of an item
    fn try_grant(&mut self, item: ItemId, ability: &str) -> GrantOutcome;

    /// Revoke a previously granted ability
    fn revoke(&mut self, item: ItemId, handle: GrantHandle);
}

/// External system that receives item-driven effect specs
pub trait EffectTarget {
    /// Build an effect spec sourced from an item
    fn build_effect_spec(&mut self, item: ItemId, effect: &str);

    /// Drop every effect spec sourced from an item
    fn drop_effect_specs(&mut self, item: ItemId);
}

/// Borrowed bundle of the external systems hooks may reach
pub struct ExternalSystems<'a> {
    /// Ability grant owner
    pub abilities: &'a mut dyn AbilityHost,
    /// Effect spec receiver
    pub effects: &'a mut dyn EffectTarget,
}

/// Context handed to every fragment hook
pub struct HookContext<'a> {
    /// Authority of the store running the hook
    pub authority: Authority,
    /// Ability grant owner
    pub abilities: &'a mut dyn AbilityHost,
    /// Effect spec receiver
    pub effects: &'a mut dyn EffectTarget,
    pending: &'a mut Vec<PendingGrant>,
}

impl HookContext<'_> {
    /// Queue a grant for retry on the next tick
    pub fn defer_grant(&mut self, item: ItemId, ability: Box<str>, slot: SlotTag) {
        self.pending.push(PendingGrant {
            item,
            ability,
            slot,
        });
    }

    /// Drop every pending grant queued for an item
    pub fn discard_grants(&mut self, item: ItemId) {
        self.pending.retain(|g| g.item != item);
    }
}

/// A grant the ability host was not ready for
#[derive(Debug, Clone)]
pub struct PendingGrant {
    item: ItemId,
    ability: Box<str>,
    slot: SlotTag,
}

impl PendingGrant {
    /// Item the grant belongs to
    pub fn item(&self) -> ItemId {
        self.item
    }

    /// Ability to grant
    pub fn ability(&self) -> &str {
        &self.ability
    }

    /// Slot the item occupied when the grant was deferred
    pub fn slot(&self) -> &SlotTag {
        &self.slot
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    Initialized,
    Slotted,
    Unslotted,
}

/// Per-store fragment hook driver
#[derive(Default)]
pub(crate) struct FragmentDispatcher {
    states: HashMap<ItemId, LifecycleState>,
    pending: Vec<PendingGrant>,
}

impl FragmentDispatcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Create missing fragment instances, then run initialize + added hooks
    pub(crate) fn item_added(
        &mut self,
        item: &Rc<RefCell<ItemData>>,
        authority: Authority,
        ext: &mut ExternalSystems<'_>,
    ) {
        let definition = Arc::clone(item.borrow().definition());
        {
            let mut data = item.borrow_mut();
            for fragment in definition.fragments() {
                if !fragment.wants_instance() {
                    continue;
                }
                let Some(instance) = fragment.new_instance() else {
                    continue;
                };
                // A spec-seeded instance of the same type wins
                let exists = data
                    .instances()
                    .iter()
                    .any(|i| i.type_key() == instance.type_key());
                if !exists {
                    data.push_instance(instance);
                }
            }
        }

        self.states.insert(item.borrow().id(), LifecycleState::Initialized);
        self.run_hooks(item, authority, ext, |f, data, ctx| {
            f.on_item_initialize(data, ctx)
        });
        self.run_hooks(item, authority, ext, |f, data, ctx| f.on_item_added(data, ctx));
    }

    pub(crate) fn item_slotted(
        &mut self,
        item: &Rc<RefCell<ItemData>>,
        slot: &SlotTag,
        authority: Authority,
        ext: &mut ExternalSystems<'_>,
    ) {
        let id = item.borrow().id();
        match self.states.get(&id) {
            Some(LifecycleState::Slotted) => {
                log::warn!("item {id} slotted twice without unslotting");
            }
            Some(_) => {}
            None => {
                log::warn!("slotting unknown item {id}");
                return;
            }
        }
        self.states.insert(id, LifecycleState::Slotted);
        self.run_hooks(item, authority, ext, |f, data, ctx| {
            f.on_item_added_to_slot(data, slot, ctx)
        });
    }

    pub(crate) fn item_unslotted(
        &mut self,
        item: &Rc<RefCell<ItemData>>,
        slot: &SlotTag,
        authority: Authority,
        ext: &mut ExternalSystems<'_>,
    ) {
        let id = item.borrow().id();
        if self.states.get(&id) != Some(&LifecycleState::Slotted) {
            log::warn!("unslotting item {id} that is not slotted");
            return;
        }
        self.states.insert(id, LifecycleState::Unslotted);
        self.run_hooks(item, authority, ext, |f, data, ctx| {
            f.on_item_removed_from_slot(data, slot, ctx)
        });
    }

    pub(crate) fn item_changed(
        &mut self,
        item: &Rc<RefCell<ItemData>>,
        authority: Authority,
        ext: &mut ExternalSystems<'_>,
    ) {
        self.run_hooks(item, authority, ext, |f, data, ctx| {
            f.on_item_changed(data, ctx)
        });
    }

    pub(crate) fn item_attached(
        &mut self,
        item: &Rc<RefCell<ItemData>>,
        parent: ItemId,
        authority: Authority,
        ext: &mut ExternalSystems<'_>,
    ) {
        self.run_hooks(item, authority, ext, |f, data, ctx| {
            f.on_item_attached_to(data, parent, ctx)
        });
    }

    pub(crate) fn item_detached(
        &mut self,
        item: &Rc<RefCell<ItemData>>,
        parent: ItemId,
        authority: Authority,
        ext: &mut ExternalSystems<'_>,
    ) {
        self.run_hooks(item, authority, ext, |f, data, ctx| {
            f.on_item_detached_from(data, parent, ctx)
        });
    }

    /// Run pre-remove hooks, then drop all bookkeeping for the item
    pub(crate) fn item_removed(
        &mut self,
        item: &Rc<RefCell<ItemData>>,
        authority: Authority,
        ext: &mut ExternalSystems<'_>,
    ) {
        self.run_hooks(item, authority, ext, |f, data, ctx| {
            f.on_item_pre_remove(data, ctx)
        });
        self.discard(item.borrow().id());
    }

    /// Drop lifecycle state and pending grants without running hooks
    pub(crate) fn discard(&mut self, id: ItemId) {
        self.states.remove(&id);
        self.pending.retain(|g| g.item != id);
    }

    /// Retry pending grants; returns the items that received one
    pub(crate) fn tick<F>(
        &mut self,
        lookup: F,
        ext: &mut ExternalSystems<'_>,
    ) -> Vec<ItemId>
    where
        F: Fn(ItemId) -> Option<Rc<RefCell<ItemData>>>,
    {
        let mut granted = Vec::new();
        let queued = core::mem::take(&mut self.pending);
        for grant in queued {
            let Some(item) = lookup(grant.item) else {
                // Item removed while the grant waited
                continue;
            };
            match ext.abilities.try_grant(grant.item, &grant.ability) {
                GrantOutcome::Granted(handle) => {
                    let mut data = item.borrow_mut();
                    if let Some(grants) = data.find_instance_mut::<GrantedAbilitiesInstance>() {
                        grants.handles.push(handle);
                        grants.pending = grants.pending.saturating_sub(1);
                    }
                    granted.push(grant.item);
                }
                GrantOutcome::NotReady => self.pending.push(grant),
            }
        }
        granted
    }

    fn run_hooks<F>(
        &mut self,
        item: &Rc<RefCell<ItemData>>,
        authority: Authority,
        ext: &mut ExternalSystems<'_>,
        hook: F,
    ) where
        F: Fn(&dyn Fragment, &mut ItemData, &mut HookContext<'_>),
    {
        let definition = Arc::clone(item.borrow().definition());
        let mut data = item.borrow_mut();
        let mut ctx = HookContext {
            authority,
            abilities: &mut *ext.abilities,
            effects: &mut *ext.effects,
            pending: &mut self.pending,
        };
        for fragment in definition.fragments() {
            hook(fragment.as_ref(), &mut data, &mut ctx);
        }
    }
}

/// No-op external systems; every grant succeeds immediately
#[derive(Debug, Default)]
pub struct NullSystems {
    abilities: NullAbilityHost,
    effects: NullEffectTarget,
}

impl NullSystems {
    /// Borrow as the bundle hooks expect
    pub fn as_external(&mut self) -> ExternalSystems<'_> {
        ExternalSystems {
            abilities: &mut self.abilities,
            effects: &mut self.effects,
        }
    }
}

/// Ability host that grants everything with sequential handles
#[derive(Debug, Default)]
pub struct NullAbilityHost {
    next: u64,
}

impl AbilityHost for NullAbilityHost {
    fn try_grant(&mut self, _item: ItemId, _ability: &str) -> GrantOutcome {
        self.next += 1;
        GrantOutcome::Granted(GrantHandle(self.next))
    }

    fn revoke(&mut self, _item: ItemId, _handle: GrantHandle) {}
}

/// Effect target that ignores everything
#[derive(Debug, Default)]
pub struct NullEffectTarget;

impl EffectTarget for NullEffectTarget {
    fn build_effect_spec(&mut self, _item: ItemId, _effect: &str) {}

    fn drop_effect_specs(&mut self, _item: ItemId) {}
}
