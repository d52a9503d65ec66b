//! Authority marker for replicated state mutation

use serde::{Deserialize, Serialize};

/// Who is allowed to originate changes at a call site.
///
/// The owning endpoint passes [`Authority::Authoritative`] and may mutate
/// and mark items dirty. Replica endpoints pass [`Authority::Remote`]; state
/// arriving over the wire is applied with remote authority and never
/// re-enters the dirty set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Authority {
    /// This endpoint owns the state and may originate changes
    Authoritative,
    /// This endpoint mirrors state received from the owner
    Remote,
}

impl Authority {
    /// Check whether local mutation is allowed
    #[inline]
    pub fn is_authoritative(&self) -> bool {
        matches!(self, Self::Authoritative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authority() {
        assert!(Authority::Authoritative.is_authoritative());
        assert!(!Authority::Remote.is_authoritative());
    }
}
