//! Loadout Net - Polymorphic Payload Replication
//!
//! This crate provides the wire codec for mutable item payloads.
//!
//! # Features
//!
//! - Bit-packed writer/reader with single-bit booleans
//! - Object-safe payload contract with per-type delta encoding
//! - Closed payload registry with a 5-bit type index space
//! - Identity-preserving decode through a per-item materialization table
//!
//! # Example
//!
//! ```ignore
//! use loadout_net::prelude::*;
//!
//! let registry = PayloadRegistryBuilder::new()
//!     .register::<HealthPayload>()
//!     .build();
//! let mut codec = PolymorphicCodec::new(registry.into());
//! ```

pub mod bit;
pub mod codec;
pub mod error;
pub mod payload;
pub mod registry;

pub mod prelude {
    pub use crate::bit::{BitReader, BitWriter};
    pub use crate::codec::{PolymorphicCodec, Quantized};
    pub use crate::error::NetError;
    pub use crate::payload::{payload_downcast_mut, payload_downcast_ref, DecodePayload, NetPayload};
    pub use crate::registry::{
        PayloadRegistry, PayloadRegistryBuilder, TypeDescriptor, INVALID_TYPE_INDEX,
        MAX_REGISTERED_TYPES, TYPE_INDEX_BITS,
    };
}

pub use prelude::*;
