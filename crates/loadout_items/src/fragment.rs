//! Item fragments and lifecycle hooks
//!
//! Fragments are immutable pieces of an
//! [`ItemDefinition`](crate::definition::ItemDefinition). They carry
//! authored data, may opt into a mutable per-item instance, and receive
//! lifecycle hooks from the dispatcher as the owning item moves through
//! the store.

use core::any::Any;
use core::fmt;

use loadout_core::{ItemId, SlotTag};
use loadout_net::NetPayload;

use crate::dispatcher::{GrantOutcome, HookContext};
use crate::instance::{DurabilityInstance, GrantedAbilitiesInstance};
use crate::item::ItemData;
use crate::scalable::ScalableFloat;

/// Immutable definition fragment with lifecycle hooks.
///
/// Every hook defaults to a no-op; fragments override only the moments
/// they care about. Hooks run on both endpoints with the store's
/// authority in the context, so grant-like side effects must check it.
pub trait Fragment: fmt::Debug {
    /// Downcast support
    fn as_any(&self) -> &dyn Any;

    /// Whether this fragment needs a mutable per-item instance
    fn wants_instance(&self) -> bool {
        false
    }

    /// Build the default instance for a new item
    fn new_instance(&self) -> Option<Box<dyn NetPayload>> {
        None
    }

    /// Item created and registered, instances exist but no hooks ran yet
    fn on_item_initialize(&self, _item: &mut ItemData, _ctx: &mut HookContext<'_>) {}

    /// Item fully added to a store
    fn on_item_added(&self, _item: &mut ItemData, _ctx: &mut HookContext<'_>) {}

    /// Replicated state of the item changed
    fn on_item_changed(&self, _item: &mut ItemData, _ctx: &mut HookContext<'_>) {}

    /// Item is about to leave the store
    fn on_item_pre_remove(&self, _item: &mut ItemData, _ctx: &mut HookContext<'_>) {}

    /// Item entered an equipment slot
    fn on_item_added_to_slot(
        &self,
        _item: &mut ItemData,
        _slot: &SlotTag,
        _ctx: &mut HookContext<'_>,
    ) {
    }

    /// Item left an equipment slot
    fn on_item_removed_from_slot(
        &self,
        _item: &mut ItemData,
        _slot: &SlotTag,
        _ctx: &mut HookContext<'_>,
    ) {
    }

    /// Item was attached under a parent item
    fn on_item_attached_to(&self, _item: &mut ItemData, _parent: ItemId, _ctx: &mut HookContext<'_>) {
    }

    /// Item was detached from a parent item
    fn on_item_detached_from(
        &self,
        _item: &mut ItemData,
        _parent: ItemId,
        _ctx: &mut HookContext<'_>,
    ) {
    }
}

/// Gives the item a durability pool scaled by level
#[derive(Debug, Clone)]
pub struct DurabilityFragment {
    max: ScalableFloat,
}

impl DurabilityFragment {
    /// Create with a maximum durability curve
    pub fn new(max: ScalableFloat) -> Self {
        Self { max }
    }

    /// Maximum durability curve
    pub fn max(&self) -> &ScalableFloat {
        &self.max
    }
}

impl Fragment for DurabilityFragment {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn wants_instance(&self) -> bool {
        true
    }

    fn new_instance(&self) -> Option<Box<dyn NetPayload>> {
        Some(Box::new(DurabilityInstance::default()))
    }

    fn on_item_initialize(&self, item: &mut ItemData, _ctx: &mut HookContext<'_>) {
        let max = self.max.value_at(item.level());
        if let Some(durability) = item.find_instance_mut::<DurabilityInstance>() {
            durability.max = max;
            if durability.current == 0.0 {
                durability.current = max;
            }
        }
    }
}

/// Grants abilities while the item sits in an equipment slot.
///
/// Grants that the host is not ready for are deferred; the dispatcher
/// retries them every tick until they land or the item unslots.
#[derive(Debug, Clone)]
pub struct GrantedAbilitiesFragment {
    abilities: Vec<Box<str>>,
}

impl GrantedAbilitiesFragment {
    /// Create from ability names
    pub fn new(abilities: impl IntoIterator<Item = impl Into<Box<str>>>) -> Self {
        Self {
            abilities: abilities.into_iter().map(Into::into).collect(),
        }
    }

    /// Ability names granted by this fragment
    pub fn abilities(&self) -> &[Box<str>] {
        &self.abilities
    }
}

impl Fragment for GrantedAbilitiesFragment {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn wants_instance(&self) -> bool {
        true
    }

    fn new_instance(&self) -> Option<Box<dyn NetPayload>> {
        Some(Box::new(GrantedAbilitiesInstance::default()))
    }

    fn on_item_added_to_slot(
        &self,
        item: &mut ItemData,
        slot: &SlotTag,
        ctx: &mut HookContext<'_>,
    ) {
        if !ctx.authority.is_authoritative() {
            return;
        }
        let item_id = item.id();
        let Some(grants) = item.find_instance_mut::<GrantedAbilitiesInstance>() else {
            log::warn!("granted-abilities fragment on {item_id} has no instance");
            return;
        };
        for ability in &self.abilities {
            match ctx.abilities.try_grant(item_id, ability) {
                GrantOutcome::Granted(handle) => grants.handles.push(handle),
                GrantOutcome::NotReady => {
                    grants.pending += 1;
                    ctx.defer_grant(item_id, ability.clone(), slot.clone());
                }
            }
        }
    }

    fn on_item_removed_from_slot(
        &self,
        item: &mut ItemData,
        _slot: &SlotTag,
        ctx: &mut HookContext<'_>,
    ) {
        if !ctx.authority.is_authoritative() {
            return;
        }
        let item_id = item.id();
        ctx.discard_grants(item_id);
        let Some(grants) = item.find_instance_mut::<GrantedAbilitiesInstance>() else {
            return;
        };
        for handle in grants.handles.drain(..) {
            ctx.abilities.revoke(item_id, handle);
        }
        grants.pending = 0;
    }
}

/// Builds effect specs against the owner while the item is slotted
#[derive(Debug, Clone)]
pub struct AbilityEffectsFragment {
    effects: Vec<Box<str>>,
}

impl AbilityEffectsFragment {
    /// Create from effect names
    pub fn new(effects: impl IntoIterator<Item = impl Into<Box<str>>>) -> Self {
        Self {
            effects: effects.into_iter().map(Into::into).collect(),
        }
    }

    /// Effect names applied by this fragment
    pub fn effects(&self) -> &[Box<str>] {
        &self.effects
    }
}

impl Fragment for AbilityEffectsFragment {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn on_item_added_to_slot(
        &self,
        item: &mut ItemData,
        _slot: &SlotTag,
        ctx: &mut HookContext<'_>,
    ) {
        if !ctx.authority.is_authoritative() {
            return;
        }
        for effect in &self.effects {
            ctx.effects.build_effect_spec(item.id(), effect);
        }
    }

    fn on_item_removed_from_slot(
        &self,
        item: &mut ItemData,
        _slot: &SlotTag,
        ctx: &mut HookContext<'_>,
    ) {
        if !ctx.authority.is_authoritative() {
            return;
        }
        ctx.effects.drop_effect_specs(item.id());
    }
}

/// One default attachment spawned with the owning item
#[derive(Debug, Clone)]
pub struct SocketSlot {
    /// Attachment slot on the owning item
    pub slot: SlotTag,
    /// Definition id of the item to spawn into the socket
    pub definition_id: Box<str>,
}

/// Declares attachment sockets filled when the item is added.
///
/// The store resolves each definition id against its [`DefinitionSet`]
/// and attaches a freshly created item per socket.
///
/// [`DefinitionSet`]: crate::definition::DefinitionSet
#[derive(Debug, Clone, Default)]
pub struct SocketSlotsFragment {
    sockets: Vec<SocketSlot>,
}

impl SocketSlotsFragment {
    /// Create an empty socket list
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a socket
    pub fn with_socket(mut self, slot: SlotTag, definition_id: impl Into<Box<str>>) -> Self {
        self.sockets.push(SocketSlot {
            slot,
            definition_id: definition_id.into(),
        });
        self
    }

    /// All declared sockets
    pub fn sockets(&self) -> &[SocketSlot] {
        &self.sockets
    }
}

impl Fragment for SocketSlotsFragment {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A named, level-scaled stat contributed to the owning item.
///
/// Values from attached items merge into the parent's stat cache, so a
/// scope attached to a rifle can contribute to the rifle's stats.
#[derive(Debug, Clone)]
pub struct ScalableFloatFragment {
    key: Box<str>,
    value: ScalableFloat,
}

impl ScalableFloatFragment {
    /// Create a named stat
    pub fn new(key: impl Into<Box<str>>, value: ScalableFloat) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Stat name
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stat curve
    pub fn value(&self) -> &ScalableFloat {
        &self.value
    }
}

impl Fragment for ScalableFloatFragment {
    fn as_any(&self) -> &dyn Any {
        self
    }
}
