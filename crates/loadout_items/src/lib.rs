//! Loadout Items - Runtime Item Store
//!
//! This crate provides the runtime half of the loadout system.
//!
//! # Features
//!
//! - Immutable item definitions composed of fragments
//! - Per-item mutable instances replicated through `loadout_net`
//! - Ordered item store with slots, attachments and change tracking
//! - Fragment lifecycle dispatch with deferred ability grants
//! - Dirty-driven store replication with per-item delta baselines
//!
//! # Example
//!
//! ```ignore
//! use loadout_items::prelude::*;
//!
//! let rifle = ItemDefinition::new("rifle", "Rifle")
//!     .with_fragment(DurabilityFragment::new(ScalableFloat::constant(100.0)));
//!
//! let mut store = ItemStore::new(Authority::Authoritative, DefinitionSet::new());
//! let mut systems = NullSystems::default();
//! let (id, _) = store.add_item(ItemSpec::new(rifle.into()), &mut systems.as_external());
//! ```

pub mod definition;
pub mod dispatcher;
pub mod fragment;
pub mod instance;
pub mod item;
pub mod replication;
pub mod scalable;
pub mod spec;
pub mod store;

pub mod prelude {
    pub use crate::definition::{DefinitionSet, ItemDefinition};
    pub use crate::dispatcher::{
        AbilityHost, EffectTarget, ExternalSystems, GrantHandle, GrantOutcome, HookContext,
        NullSystems,
    };
    pub use crate::fragment::{
        AbilityEffectsFragment, DurabilityFragment, Fragment, GrantedAbilitiesFragment,
        ScalableFloatFragment, SocketSlotsFragment,
    };
    pub use crate::instance::{builtin_payloads, DurabilityInstance, GrantedAbilitiesInstance};
    pub use crate::item::{ChangeFlags, ItemData, ItemHandle};
    pub use crate::replication::StoreReplicator;
    pub use crate::scalable::ScalableFloat;
    pub use crate::spec::ItemSpec;
    pub use crate::store::{ItemStore, StoreError, SubscriberId};
    pub use loadout_core::prelude::*;
}

pub use prelude::*;
