//! Loadout Core - Identity and Authority Primitives
//!
//! This crate provides the shared vocabulary of the loadout runtime.
//!
//! # Features
//!
//! - Stable 128-bit item identifiers that are never reused
//! - Named slot tags with precomputed hashes
//! - Explicit authority marker threaded through mutation paths
//!
//! # Example
//!
//! ```ignore
//! use loadout_core::prelude::*;
//!
//! let id = ItemId::generate();
//! let slot = SlotTag::new("slot.weapon.primary");
//! assert!(id.is_valid());
//! ```

pub mod authority;
pub mod id;
pub mod tag;

pub mod prelude {
    pub use crate::authority::Authority;
    pub use crate::id::{ItemId, ItemIdGenerator};
    pub use crate::tag::SlotTag;
}

pub use prelude::*;
