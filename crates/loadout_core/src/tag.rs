//! Named slot tags

use core::fmt;

/// A string-based tag naming an equipment or attachment slot
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotTag {
    name: Box<str>,
    hash: u64,
}

impl SlotTag {
    /// Create a new slot tag
    pub fn new(name: &str) -> Self {
        // Simple FNV-1a hash
        let mut hash = 0xcbf29ce484222325u64;
        for byte in name.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }

        Self {
            name: name.into(),
            hash,
        }
    }

    /// Get the name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the precomputed hash
    #[inline]
    pub fn hash_value(&self) -> u64 {
        self.hash
    }
}

impl fmt::Debug for SlotTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotTag({:?})", self.name)
    }
}

impl fmt::Display for SlotTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl From<&str> for SlotTag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SlotTag {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl serde::Serialize for SlotTag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

impl<'de> serde::Deserialize<'de> for SlotTag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::new(&name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_equality() {
        let a = SlotTag::new("slot.weapon.primary");
        let b = SlotTag::new("slot.weapon.primary");
        let c = SlotTag::new("slot.weapon.secondary");
        assert_eq!(a, b);
        assert_eq!(a.hash_value(), b.hash_value());
        assert_ne!(a, c);
    }

    #[test]
    fn test_tag_serde() {
        let tag = SlotTag::new("slot.chest");
        let json = serde_json::to_string(&tag).unwrap();
        assert_eq!(json, "\"slot.chest\"");
        let back: SlotTag = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tag);
        assert_eq!(back.hash_value(), tag.hash_value());
    }
}
