//! Basic type definitions for the chat room
//!
//! Provides newtype wrappers for type safety:
//! - `UserId`: numeric user identifier, minted per process or resumed from a token

use serde::Serialize;

/// Numeric user identifier (newtype pattern)
///
/// Ids start at 1; zero is never minted and never accepted from a token.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    /// Create a user id, rejecting zero
    pub fn new(id: u64) -> Option<Self> {
        (id != 0).then_some(Self(id))
    }

    /// Raw numeric value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_rejects_zero() {
        assert!(UserId::new(0).is_none());
        assert_eq!(UserId::new(7), Some(UserId(7)));
    }

    #[test]
    fn test_user_id_display() {
        assert_eq!(UserId(42).to_string(), "42");
    }

    #[test]
    fn test_user_id_serializes_as_number() {
        let json = serde_json::to_string(&UserId(3)).unwrap();
        assert_eq!(json, "3");
    }
}
