//! Item creation specs

use std::sync::Arc;

use loadout_core::ItemId;
use loadout_net::NetPayload;

use crate::definition::ItemDefinition;
use crate::item::ItemData;

/// Everything needed to create one item.
///
/// A spec is consumed by [`ItemStore::add_item`]; the pre-assigned id is
/// optional and mainly used when mirroring items created elsewhere.
///
/// [`ItemStore::add_item`]: crate::store::ItemStore::add_item
#[derive(Debug)]
pub struct ItemSpec {
    definition: Arc<ItemDefinition>,
    id: ItemId,
    owner: Option<ItemId>,
    stacks: u32,
    level: u8,
    instances: Vec<Box<dyn NetPayload>>,
}

impl ItemSpec {
    /// Create a spec for one item of the given definition
    pub fn new(definition: Arc<ItemDefinition>) -> Self {
        Self {
            definition,
            id: ItemId::null(),
            owner: None,
            stacks: 1,
            level: 1,
            instances: Vec::new(),
        }
    }

    /// Pre-assign the item id
    pub fn with_id(mut self, id: ItemId) -> Self {
        self.id = id;
        self
    }

    /// Set the external owner
    pub fn with_owner(mut self, owner: ItemId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Set the initial stack count
    pub fn with_stacks(mut self, stacks: u32) -> Self {
        self.stacks = stacks.max(1);
        self
    }

    /// Set the item level
    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level.max(1);
        self
    }

    /// Seed a pre-built instance; fragments add their defaults on top
    pub fn with_instance(mut self, instance: impl NetPayload + 'static) -> Self {
        self.instances.push(Box::new(instance));
        self
    }

    /// The definition this spec creates from
    pub fn definition(&self) -> &Arc<ItemDefinition> {
        &self.definition
    }

    /// Requested external owner
    pub fn owner(&self) -> Option<ItemId> {
        self.owner
    }

    /// Requested stack count
    pub fn stacks(&self) -> u32 {
        self.stacks
    }

    pub(crate) fn into_item(self) -> ItemData {
        let id = if self.id.is_valid() {
            self.id
        } else {
            ItemId::generate()
        };
        let mut item = ItemData::new(id, self.definition);
        item.set_owner(self.owner);
        item.set_stacks(self.stacks);
        item.set_level(self.level);
        for instance in self.instances {
            item.push_instance(instance);
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::DurabilityInstance;

    #[test]
    fn test_spec_defaults() {
        let def: Arc<ItemDefinition> = ItemDefinition::new("rock", "Rock").into();
        let item = ItemSpec::new(def).into_item();
        assert!(item.id().is_valid());
        assert_eq!(item.stacks(), 1);
        assert_eq!(item.level(), 1);
        assert!(item.instances().is_empty());
    }

    #[test]
    fn test_spec_preassigned_id() {
        let def: Arc<ItemDefinition> = ItemDefinition::new("rock", "Rock").into();
        let id = ItemId::generate();
        let item = ItemSpec::new(def)
            .with_id(id)
            .with_level(4)
            .with_instance(DurabilityInstance::default())
            .into_item();
        assert_eq!(item.id(), id);
        assert_eq!(item.level(), 4);
        assert!(item.has_instance::<DurabilityInstance>());
    }
}
