//! Built-in replicated item instances
//!
//! Instances are the mutable, per-item counterpart of fragments. Each one
//! implements the `loadout_net` payload contract with an explicit
//! member-by-member wire layout; local-only bookkeeping fields never
//! replicate, never compare and reset when quantized.

use core::any::Any;

use loadout_net::{
    payload_downcast_ref, BitReader, BitWriter, DecodePayload, NetError, NetPayload,
    PayloadRegistryBuilder,
};

use crate::dispatcher::GrantHandle;

/// Registry builder pre-loaded with every built-in instance type.
///
/// Callers register their own instance types on top before building;
/// both endpoints must end up with the same set.
pub fn builtin_payloads() -> PayloadRegistryBuilder {
    PayloadRegistryBuilder::new()
        .register::<DurabilityInstance>()
        .register::<GrantedAbilitiesInstance>()
}

/// Wear state of a single item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DurabilityInstance {
    /// Current durability
    pub current: f32,
    /// Maximum durability at the item's level
    pub max: f32,
    /// Local-only: frame of the last durability loss, for client effects
    pub last_damage_frame: u64,
}

impl NetPayload for DurabilityInstance {
    fn type_key(&self) -> &'static str {
        Self::KEY
    }

    fn write(&self, w: &mut BitWriter) {
        w.write_f32(self.current);
        w.write_f32(self.max);
    }

    fn write_delta(&self, prev: &dyn NetPayload, w: &mut BitWriter) {
        let prev = payload_downcast_ref::<Self>(prev)
            .unwrap_or_else(|| panic!("durability delta against {:?}", prev.type_key()));
        w.write_bool(self.current != prev.current);
        if self.current != prev.current {
            w.write_f32(self.current);
        }
        w.write_bool(self.max != prev.max);
        if self.max != prev.max {
            w.write_f32(self.max);
        }
    }

    fn payload_eq(&self, other: &dyn NetPayload) -> bool {
        payload_downcast_ref::<Self>(other)
            .is_some_and(|o| self.current == o.current && self.max == o.max)
    }

    fn assign_from(&mut self, src: &dyn NetPayload) {
        if let Some(src) = payload_downcast_ref::<Self>(src) {
            self.current = src.current;
            self.max = src.max;
        }
    }

    fn clone_payload(&self) -> Box<dyn NetPayload> {
        Box::new(self.clone())
    }

    fn quantized(&self) -> Box<dyn NetPayload> {
        Box::new(Self {
            last_damage_frame: 0,
            ..self.clone()
        })
    }

    fn validate(&self) -> bool {
        self.current.is_finite() && self.max.is_finite() && self.current <= self.max
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl DecodePayload for DurabilityInstance {
    const KEY: &'static str = "loadout.durability";

    fn read(r: &mut BitReader) -> Result<Self, NetError> {
        Ok(Self {
            current: r.read_f32()?,
            max: r.read_f32()?,
            last_damage_frame: 0,
        })
    }

    fn read_delta(&mut self, r: &mut BitReader) -> Result<(), NetError> {
        if r.read_bool()? {
            self.current = r.read_f32()?;
        }
        if r.read_bool()? {
            self.max = r.read_f32()?;
        }
        Ok(())
    }
}

/// Ability grants held by a slotted item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrantedAbilitiesInstance {
    /// Handles of abilities granted on behalf of this item
    pub handles: Vec<GrantHandle>,
    /// Local-only: grants still waiting for the ability host
    pub pending: u32,
}

impl GrantedAbilitiesInstance {
    /// Check whether any grant is still outstanding
    pub fn has_pending(&self) -> bool {
        self.pending > 0
    }
}

impl NetPayload for GrantedAbilitiesInstance {
    fn type_key(&self) -> &'static str {
        Self::KEY
    }

    fn write(&self, w: &mut BitWriter) {
        let count = self.handles.len().min(u8::MAX as usize);
        if count < self.handles.len() {
            log::error!(
                "truncating {} grant handles past the u8 wire limit",
                self.handles.len() - count
            );
        }
        w.write_u8(count as u8);
        for handle in &self.handles[..count] {
            w.write_u64(handle.0);
        }
    }

    fn write_delta(&self, prev: &dyn NetPayload, w: &mut BitWriter) {
        let prev = payload_downcast_ref::<Self>(prev)
            .unwrap_or_else(|| panic!("grant delta against {:?}", prev.type_key()));
        let changed = self.handles != prev.handles;
        w.write_bool(changed);
        if changed {
            self.write(w);
        }
    }

    fn payload_eq(&self, other: &dyn NetPayload) -> bool {
        payload_downcast_ref::<Self>(other).is_some_and(|o| self.handles == o.handles)
    }

    fn assign_from(&mut self, src: &dyn NetPayload) {
        if let Some(src) = payload_downcast_ref::<Self>(src) {
            self.handles = src.handles.clone();
        }
    }

    fn clone_payload(&self) -> Box<dyn NetPayload> {
        Box::new(self.clone())
    }

    fn quantized(&self) -> Box<dyn NetPayload> {
        Box::new(Self {
            pending: 0,
            ..self.clone()
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl DecodePayload for GrantedAbilitiesInstance {
    const KEY: &'static str = "loadout.granted_abilities";

    fn read(r: &mut BitReader) -> Result<Self, NetError> {
        let count = r.read_u8()? as usize;
        let mut handles = Vec::with_capacity(count);
        for _ in 0..count {
            handles.push(GrantHandle(r.read_u64()?));
        }
        Ok(Self {
            handles,
            pending: 0,
        })
    }

    fn read_delta(&mut self, r: &mut BitReader) -> Result<(), NetError> {
        if r.read_bool()? {
            *self = Self::read(r)?;
        }
        Ok(())
    }
}
