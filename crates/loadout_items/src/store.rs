//! Ordered runtime item store

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use loadout_core::{Authority, ItemId, SlotTag};
use thiserror::Error;

use crate::definition::{DefinitionSet, ItemDefinition};
use crate::dispatcher::{ExternalSystems, FragmentDispatcher};
use crate::fragment::SocketSlotsFragment;
use crate::item::{ChangeFlags, ItemData, ItemHandle};
use crate::spec::ItemSpec;

/// Store mutation errors.
///
/// Unknown item ids are deliberately not errors: operations on an id the
/// store does not know log and do nothing, since replication makes such
/// races ordinary. Errors are reserved for requests that are wrong even
/// with perfect knowledge.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Attaching would make the item its own ancestor
    #[error("attaching {child} under {parent} would create a cycle")]
    CycleDetected {
        /// Item being attached
        child: ItemId,
        /// Requested parent
        parent: ItemId,
    },
    /// Attached items cannot enter equipment slots
    #[error("item {0} is attached to another item and cannot be slotted")]
    AttachedItem(ItemId),
    /// Slotted items cannot be attached under another item
    #[error("item {0} is slotted and cannot be attached")]
    SlottedItem(ItemId),
    /// The requested slot already holds another item
    #[error("slot {0} is already occupied")]
    SlotOccupied(SlotTag),
}

/// Ticket returned by `subscribe_*`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

#[derive(Default)]
struct StoreObservers {
    next: u64,
    added: Vec<(SubscriberId, Box<dyn FnMut(ItemId)>)>,
    removed: Vec<(SubscriberId, Box<dyn FnMut(ItemId)>)>,
    changed: Vec<(SubscriberId, Box<dyn FnMut(ItemId, ChangeFlags)>)>,
}

impl StoreObservers {
    fn next_id(&mut self) -> SubscriberId {
        self.next += 1;
        SubscriberId(self.next)
    }

    fn emit_added(&mut self, id: ItemId) {
        for (_, cb) in &mut self.added {
            cb(id);
        }
    }

    fn emit_removed(&mut self, id: ItemId) {
        for (_, cb) in &mut self.removed {
            cb(id);
        }
    }

    fn emit_changed(&mut self, id: ItemId, flags: ChangeFlags) {
        for (_, cb) in &mut self.changed {
            cb(id, flags);
        }
    }

    fn unsubscribe(&mut self, id: SubscriberId) {
        self.added.retain(|(s, _)| *s != id);
        self.removed.retain(|(s, _)| *s != id);
        self.changed.retain(|(s, _)| *s != id);
    }
}

/// Ordered collection of live items.
///
/// Items are kept in insertion order; replication walks the same order,
/// so both endpoints converge on identical sequences. Records live behind
/// `Rc<RefCell<..>>` and keep their identity for their whole life; ids
/// are never reassigned.
pub struct ItemStore {
    authority: Authority,
    definitions: DefinitionSet,
    entries: Vec<Rc<RefCell<ItemData>>>,
    by_id: HashMap<ItemId, Rc<RefCell<ItemData>>>,
    weak_handles: HashMap<ItemId, ItemHandle>,
    dirty: HashSet<ItemId>,
    removed: Vec<ItemId>,
    observers: StoreObservers,
    dispatcher: FragmentDispatcher,
}

impl ItemStore {
    /// Create an empty store
    pub fn new(authority: Authority, definitions: DefinitionSet) -> Self {
        Self {
            authority,
            definitions,
            entries: Vec::new(),
            by_id: HashMap::new(),
            weak_handles: HashMap::new(),
            dirty: HashSet::new(),
            removed: Vec::new(),
            observers: StoreObservers::default(),
            dispatcher: FragmentDispatcher::new(),
        }
    }

    /// This store's authority
    #[inline]
    pub fn authority(&self) -> Authority {
        self.authority
    }

    /// Definitions known to this store
    pub fn definitions(&self) -> &DefinitionSet {
        &self.definitions
    }

    /// Number of live items
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store holds no items
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether an id names a live item
    pub fn contains(&self, id: ItemId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Get the live record for an id
    pub fn get(&self, id: ItemId) -> Option<Rc<RefCell<ItemData>>> {
        self.by_id.get(&id).cloned()
    }

    /// Get (or create) a weak handle for an id
    pub fn handle(&mut self, id: ItemId) -> Option<ItemHandle> {
        if let Some(handle) = self.weak_handles.get(&id) {
            return Some(handle.clone());
        }
        let rc = self.by_id.get(&id)?;
        let handle = ItemHandle::new(id, rc);
        self.weak_handles.insert(id, handle.clone());
        Some(handle)
    }

    /// Iterate live records in insertion order
    pub fn items(&self) -> impl Iterator<Item = &Rc<RefCell<ItemData>>> {
        self.entries.iter()
    }

    /// Number of grants still waiting for the ability host
    pub fn pending_grants(&self) -> usize {
        self.dispatcher.pending_len()
    }

    // ========================================================================
    // Item lifecycle
    // ========================================================================

    /// Add an item from a spec.
    ///
    /// Stackable definitions merge into an existing unslotted, unattached
    /// stack instead of creating a record; the second return value tells
    /// which happened. Merging keeps the existing record's id; a
    /// pre-assigned id on the spec is discarded.
    pub fn add_item(&mut self, spec: ItemSpec, ext: &mut ExternalSystems<'_>) -> (ItemId, bool) {
        if let Some(existing) = self.find_merge_target(&spec) {
            let id = {
                let mut data = existing.borrow_mut();
                let stacks = data.stacks().saturating_add(spec.stacks());
                data.set_stacks(stacks);
                data.id()
            };
            self.mark_dirty_internal(id);
            self.dispatcher.item_changed(&existing, self.authority, ext);
            self.observers.emit_changed(
                id,
                ChangeFlags {
                    record: true,
                    instances: false,
                },
            );
            return (id, true);
        }

        let item = spec.into_item();
        let id = item.id();
        if self.by_id.contains_key(&id) {
            log::warn!("item {id} already exists, ignoring duplicate add");
            return (id, true);
        }

        let definition = Arc::clone(item.definition());
        let rc = Rc::new(RefCell::new(item));
        self.rebuild_stat_cache_for(&rc);
        self.entries.push(Rc::clone(&rc));
        self.by_id.insert(id, Rc::clone(&rc));

        self.dispatcher.item_added(&rc, self.authority, ext);
        self.observers.emit_added(id);
        self.mark_dirty_internal(id);

        // Default attachments spawn on the owner only; replicas receive
        // the children through normal replication.
        if self.authority.is_authoritative() {
            self.fill_sockets(id, &definition, ext);
        }

        (id, false)
    }

    /// Insert a fully-built record, keeping its identity.
    ///
    /// Used when moving an item between stores: deep-clone the record out
    /// of the source store, remove it there, then insert it here. Slot and
    /// attachment are store-local and cleared on the way in. Returns `None`
    /// (after logging) for an invalid or duplicate id.
    pub fn add_internal_item(
        &mut self,
        mut item: ItemData,
        ext: &mut ExternalSystems<'_>,
    ) -> Option<ItemId> {
        let id = item.id();
        if !id.is_valid() {
            log::warn!("refusing to insert a record without an id");
            return None;
        }
        if self.by_id.contains_key(&id) {
            log::warn!("item {id} already exists, ignoring internal insert");
            return None;
        }
        item.set_slot(None);
        item.set_attachment(None, None);

        let rc = Rc::new(RefCell::new(item));
        self.rebuild_stat_cache_for(&rc);
        self.entries.push(Rc::clone(&rc));
        self.by_id.insert(id, Rc::clone(&rc));
        self.dispatcher.item_added(&rc, self.authority, ext);
        self.observers.emit_added(id);
        self.mark_dirty_internal(id);
        Some(id)
    }

    /// Remove an item and everything attached to it.
    ///
    /// Returns `false` (after logging) when the id is unknown.
    pub fn remove_item(&mut self, id: ItemId, ext: &mut ExternalSystems<'_>) -> bool {
        if !self.by_id.contains_key(&id) {
            log::debug!("remove of unknown item {id} ignored");
            return false;
        }
        for child in self.items_attached_to(id) {
            self.remove_item(child, ext);
        }
        self.remove_single(id, ext)
    }

    fn remove_single(&mut self, id: ItemId, ext: &mut ExternalSystems<'_>) -> bool {
        let Some(rc) = self.by_id.get(&id).cloned() else {
            log::debug!("remove of unknown item {id} ignored");
            return false;
        };

        let slot = rc.borrow().slot().cloned();
        if let Some(slot) = slot {
            self.dispatcher
                .item_unslotted(&rc, &slot, self.authority, ext);
            rc.borrow_mut().set_slot(None);
        }

        let parent = rc.borrow().attached_to();
        if let Some(parent) = parent {
            self.dispatcher.item_detached(&rc, parent, self.authority, ext);
            rc.borrow_mut().set_attachment(None, None);
            if let Some(parent_rc) = self.by_id.get(&parent).cloned() {
                self.rebuild_stat_cache_for(&parent_rc);
                self.mark_dirty_internal(parent);
            }
        }

        self.dispatcher.item_removed(&rc, self.authority, ext);
        self.observers.emit_removed(id);

        self.entries.retain(|e| !Rc::ptr_eq(e, &rc));
        self.by_id.remove(&id);
        self.weak_handles.remove(&id);
        self.dirty.remove(&id);
        if self.authority.is_authoritative() {
            self.removed.push(id);
        }
        true
    }

    // ========================================================================
    // Slots
    // ========================================================================

    /// Put an item into an equipment slot.
    ///
    /// Moves the item out of its current slot first if needed. Returns
    /// `Ok(false)` for unknown ids and for items already in the slot.
    pub fn add_item_to_slot(
        &mut self,
        id: ItemId,
        slot: SlotTag,
        ext: &mut ExternalSystems<'_>,
    ) -> Result<bool, StoreError> {
        let Some(rc) = self.by_id.get(&id).cloned() else {
            log::warn!("cannot slot unknown item {id}");
            return Ok(false);
        };
        if rc.borrow().attached_to().is_some() {
            return Err(StoreError::AttachedItem(id));
        }
        if rc.borrow().slot() == Some(&slot) {
            return Ok(false);
        }
        if let Some(occupant) = self.item_in_slot(&slot) {
            log::warn!("slot {slot} refused for {id}, occupied by {occupant}");
            return Err(StoreError::SlotOccupied(slot));
        }

        let old_slot = rc.borrow().slot().cloned();
        if let Some(old) = old_slot {
            self.dispatcher.item_unslotted(&rc, &old, self.authority, ext);
        }
        rc.borrow_mut().set_slot(Some(slot.clone()));
        self.dispatcher.item_slotted(&rc, &slot, self.authority, ext);
        self.mark_dirty_internal(id);
        self.observers.emit_changed(
            id,
            ChangeFlags {
                record: true,
                instances: false,
            },
        );
        Ok(true)
    }

    /// Take an item out of its equipment slot.
    ///
    /// Returns `Ok(false)` for unknown or unslotted items.
    pub fn remove_item_from_slot(
        &mut self,
        id: ItemId,
        ext: &mut ExternalSystems<'_>,
    ) -> Result<bool, StoreError> {
        let Some(rc) = self.by_id.get(&id).cloned() else {
            log::debug!("unslot of unknown item {id} ignored");
            return Ok(false);
        };
        let Some(slot) = rc.borrow().slot().cloned() else {
            return Ok(false);
        };

        self.dispatcher
            .item_unslotted(&rc, &slot, self.authority, ext);
        rc.borrow_mut().set_slot(None);
        self.mark_dirty_internal(id);
        self.observers.emit_changed(
            id,
            ChangeFlags {
                record: true,
                instances: false,
            },
        );
        Ok(true)
    }

    /// Item currently occupying a slot
    pub fn item_in_slot(&self, slot: &SlotTag) -> Option<ItemId> {
        self.entries.iter().find_map(|e| {
            let data = e.borrow();
            (data.slot() == Some(slot)).then(|| data.id())
        })
    }

    /// Slotted items as (slot, id) pairs, in store order
    pub fn slotted_items(&self) -> Vec<(SlotTag, ItemId)> {
        self.entries
            .iter()
            .filter_map(|e| {
                let data = e.borrow();
                data.slot().cloned().map(|slot| (slot, data.id()))
            })
            .collect()
    }

    // ========================================================================
    // Attachments
    // ========================================================================

    /// Attach `child` under `parent` at the given attachment slot.
    ///
    /// The attachment forest stays acyclic: a request that would make an
    /// item its own ancestor fails with [`StoreError::CycleDetected`] and
    /// leaves the store untouched.
    pub fn attach_item(
        &mut self,
        child: ItemId,
        parent: ItemId,
        slot: SlotTag,
        ext: &mut ExternalSystems<'_>,
    ) -> Result<bool, StoreError> {
        let Some(child_rc) = self.by_id.get(&child).cloned() else {
            log::warn!("cannot attach unknown item {child}");
            return Ok(false);
        };
        if !self.by_id.contains_key(&parent) {
            log::warn!("cannot attach {child} to unknown parent {parent}");
            return Ok(false);
        }
        if child_rc.borrow().slot().is_some() {
            return Err(StoreError::SlottedItem(child));
        }
        if child == parent || self.is_ancestor(child, parent) {
            log::error!("rejected attach of {child} under {parent}: cycle");
            return Err(StoreError::CycleDetected { child, parent });
        }

        let old_parent = child_rc.borrow().attached_to();
        if let Some(old_parent) = old_parent {
            if old_parent == parent {
                // Re-attach within the same parent just moves the slot
                child_rc.borrow_mut().set_attachment(Some(parent), Some(slot));
                self.mark_dirty_internal(child);
                return Ok(true);
            }
            self.detach_item(child, ext)?;
        }

        child_rc
            .borrow_mut()
            .set_attachment(Some(parent), Some(slot));
        self.dispatcher
            .item_attached(&child_rc, parent, self.authority, ext);

        if let Some(parent_rc) = self.by_id.get(&parent).cloned() {
            self.rebuild_stat_cache_for(&parent_rc);
        }
        self.mark_dirty_internal(child);
        self.mark_dirty_internal(parent);
        self.observers.emit_changed(
            parent,
            ChangeFlags {
                record: true,
                instances: false,
            },
        );
        Ok(true)
    }

    /// Detach an item from its parent.
    ///
    /// Returns `Ok(false)` for unknown or unattached items.
    pub fn detach_item(
        &mut self,
        child: ItemId,
        ext: &mut ExternalSystems<'_>,
    ) -> Result<bool, StoreError> {
        let Some(child_rc) = self.by_id.get(&child).cloned() else {
            log::debug!("detach of unknown item {child} ignored");
            return Ok(false);
        };
        let Some(parent) = child_rc.borrow().attached_to() else {
            return Ok(false);
        };

        self.dispatcher
            .item_detached(&child_rc, parent, self.authority, ext);
        child_rc.borrow_mut().set_attachment(None, None);

        if let Some(parent_rc) = self.by_id.get(&parent).cloned() {
            self.rebuild_stat_cache_for(&parent_rc);
            self.mark_dirty_internal(parent);
            self.observers.emit_changed(
                parent,
                ChangeFlags {
                    record: true,
                    instances: false,
                },
            );
        }
        self.mark_dirty_internal(child);
        Ok(true)
    }

    /// Items attached directly under a parent, in store order
    pub fn items_attached_to(&self, parent: ItemId) -> Vec<ItemId> {
        self.entries
            .iter()
            .filter_map(|e| {
                let data = e.borrow();
                (data.attached_to() == Some(parent)).then(|| data.id())
            })
            .collect()
    }

    /// Item attached under `parent` at a specific attachment slot
    pub fn item_attached_on(&self, parent: ItemId, slot: &SlotTag) -> Option<ItemId> {
        self.entries.iter().find_map(|e| {
            let data = e.borrow();
            (data.attached_to() == Some(parent) && data.attach_slot() == Some(slot))
                .then(|| data.id())
        })
    }

    /// Unattached items, in store order
    pub fn root_items(&self) -> Vec<ItemId> {
        self.entries
            .iter()
            .filter_map(|e| {
                let data = e.borrow();
                data.attached_to().is_none().then(|| data.id())
            })
            .collect()
    }

    /// Check whether any live item uses the given definition
    pub fn contains_definition(&self, definition_id: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.borrow().definition().id() == definition_id)
    }

    /// Items held by an external owning entity, in store order
    pub fn items_owned_by(&self, owner: ItemId) -> Vec<ItemId> {
        self.entries
            .iter()
            .filter_map(|e| {
                let data = e.borrow();
                (data.owner() == Some(owner)).then(|| data.id())
            })
            .collect()
    }

    // ========================================================================
    // Change tracking and ticking
    // ========================================================================

    /// Mark an item for inclusion in the next replication pass.
    ///
    /// Only the authoritative endpoint may dirty items; a remote store
    /// logs and ignores the request.
    pub fn mark_item_dirty(&mut self, id: ItemId) {
        if !self.authority.is_authoritative() {
            log::warn!("ignoring dirty mark for {id} on a remote store");
            return;
        }
        if !self.by_id.contains_key(&id) {
            log::warn!("ignoring dirty mark for unknown item {id}");
            return;
        }
        self.dirty.insert(id);
    }

    /// Retry deferred work, currently pending ability grants
    pub fn tick(&mut self, ext: &mut ExternalSystems<'_>) {
        let by_id = &self.by_id;
        let granted = self.dispatcher.tick(|id| by_id.get(&id).cloned(), ext);
        for id in granted {
            self.dirty.insert(id);
            self.observers.emit_changed(
                id,
                ChangeFlags {
                    record: false,
                    instances: true,
                },
            );
        }
    }

    /// Subscribe to item additions
    pub fn subscribe_added(&mut self, cb: impl FnMut(ItemId) + 'static) -> SubscriberId {
        let id = self.observers.next_id();
        self.observers.added.push((id, Box::new(cb)));
        id
    }

    /// Subscribe to item removals
    pub fn subscribe_removed(&mut self, cb: impl FnMut(ItemId) + 'static) -> SubscriberId {
        let id = self.observers.next_id();
        self.observers.removed.push((id, Box::new(cb)));
        id
    }

    /// Subscribe to item changes
    pub fn subscribe_changed(
        &mut self,
        cb: impl FnMut(ItemId, ChangeFlags) + 'static,
    ) -> SubscriberId {
        let id = self.observers.next_id();
        self.observers.changed.push((id, Box::new(cb)));
        id
    }

    /// Remove a subscription from every event list
    pub fn unsubscribe(&mut self, id: SubscriberId) {
        self.observers.unsubscribe(id);
    }

    // ========================================================================
    // Replication support
    // ========================================================================

    /// Dirty items in store order, clearing the dirty set
    pub(crate) fn drain_dirty_in_order(&mut self) -> Vec<ItemId> {
        let ordered: Vec<ItemId> = self
            .entries
            .iter()
            .map(|e| e.borrow().id())
            .filter(|id| self.dirty.contains(id))
            .collect();
        self.dirty.clear();
        ordered
    }

    /// Removals since the last replication pass
    pub(crate) fn take_removed(&mut self) -> Vec<ItemId> {
        core::mem::take(&mut self.removed)
    }

    /// Remove exactly one record named by a removal notice.
    ///
    /// Notices already enumerate every id the authority destroyed, so the
    /// receiver must not sweep attached children on its own: a child the
    /// authority detached and kept would be destroyed and re-created,
    /// losing its identity and local state.
    pub(crate) fn remove_replica_item(&mut self, id: ItemId, ext: &mut ExternalSystems<'_>) -> bool {
        self.remove_single(id, ext)
    }

    /// Insert a record received over the wire, without hooks or dirtying
    pub(crate) fn insert_replica(&mut self, item: ItemData) -> Rc<RefCell<ItemData>> {
        let id = item.id();
        let rc = Rc::new(RefCell::new(item));
        self.entries.push(Rc::clone(&rc));
        self.by_id.insert(id, Rc::clone(&rc));
        rc
    }

    /// Second-pass bring-up for a replica created this update
    pub(crate) fn run_replica_added(&mut self, id: ItemId, ext: &mut ExternalSystems<'_>) {
        let Some(rc) = self.by_id.get(&id).cloned() else {
            return;
        };
        self.rebuild_stat_cache_for(&rc);
        self.dispatcher.item_added(&rc, self.authority, ext);
        self.observers.emit_added(id);
        let slot = rc.borrow().slot().cloned();
        if let Some(slot) = slot {
            self.dispatcher.item_slotted(&rc, &slot, self.authority, ext);
        }
        let parent = rc.borrow().attached_to();
        if let Some(parent) = parent {
            self.dispatcher.item_attached(&rc, parent, self.authority, ext);
            if let Some(parent_rc) = self.by_id.get(&parent).cloned() {
                self.rebuild_stat_cache_for(&parent_rc);
            }
        }
    }

    /// Second-pass change hooks for a replica updated this pass
    pub(crate) fn run_replica_changed(
        &mut self,
        id: ItemId,
        flags: ChangeFlags,
        prev_slot: Option<SlotTag>,
        prev_parent: Option<ItemId>,
        ext: &mut ExternalSystems<'_>,
    ) {
        let Some(rc) = self.by_id.get(&id).cloned() else {
            return;
        };
        let new_slot = rc.borrow().slot().cloned();
        if prev_slot != new_slot {
            if let Some(old) = &prev_slot {
                self.dispatcher.item_unslotted(&rc, old, self.authority, ext);
            }
            if let Some(new) = &new_slot {
                self.dispatcher.item_slotted(&rc, new, self.authority, ext);
            }
        }
        let new_parent = rc.borrow().attached_to();
        if prev_parent != new_parent {
            if let Some(old) = prev_parent {
                self.dispatcher.item_detached(&rc, old, self.authority, ext);
            }
            if let Some(new) = new_parent {
                self.dispatcher.item_attached(&rc, new, self.authority, ext);
            }
            // Both parents' merged stat caches depend on this attachment
            for parent in [prev_parent, new_parent].into_iter().flatten() {
                if let Some(parent_rc) = self.by_id.get(&parent).cloned() {
                    self.rebuild_stat_cache_for(&parent_rc);
                }
            }
        }
        if flags.record {
            self.rebuild_stat_cache_for(&rc);
        }
        self.dispatcher.item_changed(&rc, self.authority, ext);
        self.observers.emit_changed(id, flags);
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn find_merge_target(&self, spec: &ItemSpec) -> Option<Rc<RefCell<ItemData>>> {
        if !spec.definition().is_stackable() {
            return None;
        }
        // Stacks never merge across owning entities
        self.entries
            .iter()
            .find(|e| {
                let data = e.borrow();
                data.definition().id() == spec.definition().id()
                    && data.owner() == spec.owner()
                    && data.attached_to().is_none()
                    && data.slot().is_none()
            })
            .cloned()
    }

    /// Walk the parent chain of `start`; true if `ancestor` appears in it
    fn is_ancestor(&self, ancestor: ItemId, start: ItemId) -> bool {
        let mut current = start;
        // Chain length is bounded by the store size even if links go bad
        for _ in 0..=self.entries.len() {
            let Some(rc) = self.by_id.get(&current) else {
                return false;
            };
            match rc.borrow().attached_to() {
                Some(parent) if parent == ancestor => return true,
                Some(parent) => current = parent,
                None => return false,
            }
        }
        false
    }

    fn fill_sockets(
        &mut self,
        parent: ItemId,
        definition: &Arc<ItemDefinition>,
        ext: &mut ExternalSystems<'_>,
    ) {
        let Some(sockets) = definition.find_fragment::<SocketSlotsFragment>() else {
            return;
        };
        let sockets: Vec<_> = sockets.sockets().to_vec();
        for socket in sockets {
            let Some(child_def) = self.definitions.get(&socket.definition_id).cloned() else {
                log::warn!(
                    "socket {} on {} names unknown definition {:?}",
                    socket.slot,
                    definition.id(),
                    socket.definition_id
                );
                continue;
            };
            let (child, _) = self.add_item(ItemSpec::new(child_def), ext);
            if let Err(err) = self.attach_item(child, parent, socket.slot.clone(), ext) {
                log::error!("failed to fill socket on {parent}: {err}");
            }
        }
    }

    fn rebuild_stat_cache_for(&self, rc: &Rc<RefCell<ItemData>>) {
        let parent = rc.borrow().id();
        let attached: Vec<Arc<ItemDefinition>> = self
            .entries
            .iter()
            .filter(|e| !Rc::ptr_eq(e, rc) && e.borrow().attached_to() == Some(parent))
            .map(|e| Arc::clone(e.borrow().definition()))
            .collect();
        rc.borrow_mut().rebuild_stat_cache(attached.iter());
    }

    fn mark_dirty_internal(&mut self, id: ItemId) {
        if self.authority.is_authoritative() {
            self.dirty.insert(id);
        }
    }
}

impl core::fmt::Debug for ItemStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ItemStore")
            .field("authority", &self.authority)
            .field("items", &self.entries.len())
            .field("dirty", &self.dirty.len())
            .finish()
    }
}
