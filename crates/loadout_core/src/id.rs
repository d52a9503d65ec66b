//! Unique item identifier generation

use core::fmt;
use core::hash::{Hash, Hasher};
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// A globally unique item identifier.
///
/// Upper 64 bits: per-process seed, lower 64 bits: monotonic counter.
/// Identifiers are never reused, even after the item they named is
/// destroyed, so a stale handle can never silently resolve to a new item.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ItemId {
    bits: u128,
}

impl ItemId {
    /// Create a null/invalid ID
    #[inline]
    pub const fn null() -> Self {
        Self { bits: 0 }
    }

    /// Check if this ID is null
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.bits == 0
    }

    /// Check if this ID names an item
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.bits != 0
    }

    /// Get the raw bits
    #[inline]
    pub const fn to_bits(&self) -> u128 {
        self.bits
    }

    /// Create from raw bits
    #[inline]
    pub const fn from_bits(bits: u128) -> Self {
        Self { bits }
    }

    /// Generate a fresh ID from the process-wide generator
    pub fn generate() -> Self {
        global_generator().next()
    }
}

impl Hash for ItemId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits.hash(state);
    }
}

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "ItemId(null)")
        } else {
            write!(f, "ItemId({:032x})", self.bits)
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{:032x}", self.bits)
        }
    }
}

impl serde::Serialize for ItemId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u128(self.bits)
    }
}

impl<'de> serde::Deserialize<'de> for ItemId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u128::deserialize(deserializer)?;
        Ok(Self { bits })
    }
}

/// Thread-safe item ID generator
pub struct ItemIdGenerator {
    seed: u64,
    next: AtomicU64,
}

impl ItemIdGenerator {
    /// Create a generator with an explicit seed
    pub const fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            next: AtomicU64::new(1),
        }
    }

    /// Create a generator seeded from process id and wall clock
    pub fn new() -> Self {
        Self::with_seed(entropy_seed())
    }

    /// Generate the next unique ID
    pub fn next(&self) -> ItemId {
        let counter = self.next.fetch_add(1, Ordering::Relaxed);
        ItemId::from_bits((self.seed as u128) << 64 | counter as u128)
    }
}

impl Default for ItemIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn global_generator() -> &'static ItemIdGenerator {
    static GENERATOR: OnceLock<ItemIdGenerator> = OnceLock::new();
    GENERATOR.get_or_init(ItemIdGenerator::new)
}

fn entropy_seed() -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    // FNV-1a over pid + time keeps seeds distinct across processes
    let mut hash = 0xcbf29ce484222325u64;
    for byte in std::process::id()
        .to_le_bytes()
        .iter()
        .chain(nanos.to_le_bytes().iter())
    {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    // Seed 0 would make the first ID collide with null
    if hash == 0 {
        1
    } else {
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_id() {
        let id = ItemId::null();
        assert!(id.is_null());
        assert!(!id.is_valid());
    }

    #[test]
    fn test_generator_unique() {
        let gen = ItemIdGenerator::with_seed(7);
        let a = gen.next();
        let b = gen.next();
        assert_ne!(a, b);
        assert!(a.is_valid());
        assert!(b.is_valid());
    }

    #[test]
    fn test_generator_never_null() {
        let gen = ItemIdGenerator::with_seed(0);
        assert!(gen.next().is_valid());
    }

    #[test]
    fn test_bits_roundtrip() {
        let id = ItemId::generate();
        assert_eq!(ItemId::from_bits(id.to_bits()), id);
    }

    #[test]
    fn test_serde_roundtrip() {
        let id = ItemIdGenerator::with_seed(42).next();
        let bytes = bincode::serialize(&id).unwrap();
        let back: ItemId = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, id);
    }
}
