//! Closed payload type registry
//!
//! The set of replicable payload types is fixed at process start. Both
//! endpoints must build the registry from the same registrations; entries
//! are sorted by type key so the wire indices match regardless of
//! registration order.

use std::collections::HashMap;

use crate::bit::BitReader;
use crate::error::NetError;
use crate::payload::{payload_downcast_ref, DecodePayload, NetPayload};

/// Bits spent on the wire per type index
pub const TYPE_INDEX_BITS: u32 = 5;

/// Maximum number of registrable types; index 0 is reserved
pub const MAX_REGISTERED_TYPES: usize = (1 << TYPE_INDEX_BITS) - 1;

/// Reserved index meaning "no payload" / "unknown type"
pub const INVALID_TYPE_INDEX: u8 = 0;

type ReadFn = fn(&mut BitReader) -> Result<Box<dyn NetPayload>, NetError>;
type ReadDeltaFn = fn(&dyn NetPayload, &mut BitReader) -> Result<Box<dyn NetPayload>, NetError>;
type NewFn = fn() -> Box<dyn NetPayload>;

/// Monomorphized entry points for one registered payload type
pub struct TypeDescriptor {
    key: &'static str,
    new_default: NewFn,
    read: ReadFn,
    read_delta: ReadDeltaFn,
}

impl TypeDescriptor {
    fn of<T>() -> Self
    where
        T: DecodePayload + Default + Clone + 'static,
    {
        Self {
            key: T::KEY,
            new_default: || Box::new(T::default()),
            read: |r| {
                let value = T::read(r)?;
                if !value.validate() {
                    return Err(NetError::InvalidPayload(T::KEY));
                }
                Ok(Box::new(value))
            },
            read_delta: |prev, r| {
                let mut next = payload_downcast_ref::<T>(prev)
                    .ok_or(NetError::MissingBaseline)?
                    .clone();
                next.read_delta(r)?;
                if !next.validate() {
                    return Err(NetError::InvalidPayload(T::KEY));
                }
                Ok(Box::new(next))
            },
        }
    }

    /// Stable type key
    #[inline]
    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Construct a default-initialized payload of this type
    pub fn new_default(&self) -> Box<dyn NetPayload> {
        (self.new_default)()
    }

    /// Decode a full payload state
    pub fn read(&self, r: &mut BitReader) -> Result<Box<dyn NetPayload>, NetError> {
        (self.read)(r)
    }

    /// Decode a delta against the previous state of the same type
    pub fn read_delta(
        &self,
        prev: &dyn NetPayload,
        r: &mut BitReader,
    ) -> Result<Box<dyn NetPayload>, NetError> {
        (self.read_delta)(prev, r)
    }
}

impl core::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TypeDescriptor").field("key", &self.key).finish()
    }
}

/// Builder collecting payload registrations
#[derive(Debug, Default)]
pub struct PayloadRegistryBuilder {
    entries: Vec<TypeDescriptor>,
}

impl PayloadRegistryBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a payload type.
    ///
    /// Panics on a duplicate type key; registration happens once at
    /// process start and a duplicate is a configuration bug.
    pub fn register<T>(mut self) -> Self
    where
        T: DecodePayload + Default + Clone + 'static,
    {
        if self.entries.iter().any(|e| e.key == T::KEY) {
            panic!("payload type {:?} registered twice", T::KEY);
        }
        self.entries.push(TypeDescriptor::of::<T>());
        self
    }

    /// Finalize the registry.
    ///
    /// Panics when more than [`MAX_REGISTERED_TYPES`] types were
    /// registered; the index would no longer fit the wire field.
    pub fn build(mut self) -> PayloadRegistry {
        if self.entries.len() > MAX_REGISTERED_TYPES {
            panic!(
                "{} payload types registered, wire format allows {}",
                self.entries.len(),
                MAX_REGISTERED_TYPES
            );
        }
        // Index assignment must not depend on registration order
        self.entries.sort_by_key(|e| e.key);

        let by_key = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.key, i as u8 + 1))
            .collect();

        PayloadRegistry {
            entries: self.entries,
            by_key,
        }
    }
}

/// Immutable registry mapping type keys to wire indices
#[derive(Debug)]
pub struct PayloadRegistry {
    entries: Vec<TypeDescriptor>,
    by_key: HashMap<&'static str, u8>,
}

impl PayloadRegistry {
    /// Wire index for a type key, [`INVALID_TYPE_INDEX`] when unregistered
    pub fn type_index(&self, key: &str) -> u8 {
        self.by_key.get(key).copied().unwrap_or(INVALID_TYPE_INDEX)
    }

    /// Descriptor for a wire index
    pub fn descriptor(&self, index: u8) -> Option<&TypeDescriptor> {
        if index == INVALID_TYPE_INDEX {
            return None;
        }
        self.entries.get(index as usize - 1)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no types are registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::testing::{AmmoPayload, HealthPayload};

    #[test]
    fn test_indices_sorted_by_key() {
        // "test.ammo" < "test.health" regardless of registration order
        let a = PayloadRegistryBuilder::new()
            .register::<HealthPayload>()
            .register::<AmmoPayload>()
            .build();
        let b = PayloadRegistryBuilder::new()
            .register::<AmmoPayload>()
            .register::<HealthPayload>()
            .build();

        assert_eq!(a.type_index(AmmoPayload::KEY), 1);
        assert_eq!(a.type_index(HealthPayload::KEY), 2);
        assert_eq!(
            a.type_index(AmmoPayload::KEY),
            b.type_index(AmmoPayload::KEY)
        );
        assert_eq!(
            a.type_index(HealthPayload::KEY),
            b.type_index(HealthPayload::KEY)
        );
    }

    #[test]
    fn test_unregistered_key_is_invalid() {
        let registry = PayloadRegistryBuilder::new()
            .register::<HealthPayload>()
            .build();
        assert_eq!(registry.type_index("test.unknown"), INVALID_TYPE_INDEX);
        assert!(registry.descriptor(INVALID_TYPE_INDEX).is_none());
        assert!(registry.descriptor(9).is_none());
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_duplicate_registration_panics() {
        let _ = PayloadRegistryBuilder::new()
            .register::<HealthPayload>()
            .register::<HealthPayload>();
    }

    #[test]
    fn test_descriptor_default() {
        let registry = PayloadRegistryBuilder::new()
            .register::<HealthPayload>()
            .build();
        let index = registry.type_index(HealthPayload::KEY);
        let payload = registry.descriptor(index).unwrap().new_default();
        assert_eq!(payload.type_key(), HealthPayload::KEY);
    }
}
