use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for an actor within a stage.
///
/// Addresses are time-sortable (UUID v7), so an actor minted later compares
/// greater than one minted earlier. Immutable once minted; equality and the
/// hash are by underlying value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(Uuid);

impl Address {
    /// Parse an Address from its canonical string form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub(crate) fn mint() -> Self {
        Self(Uuid::now_v7())
    }
}

impl FromStr for Address {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The only source of new addresses. One factory per stage.
#[derive(Debug, Default, Clone)]
pub struct AddressFactory {}

impl AddressFactory {
    pub fn new() -> Self {
        Self {}
    }

    /// Mint a fresh, unique address.
    pub fn unique(&self) -> Address {
        Address::mint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_addresses() {
        let factory = AddressFactory::new();
        let a = factory.unique();
        let b = factory.unique();
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_and_display() {
        let addr = AddressFactory::new().unique();
        let s = addr.to_string();
        let parsed = Address::from_str(&s).unwrap();
        assert_eq!(addr, parsed);
    }

    #[test]
    fn test_time_sortable() {
        let factory = AddressFactory::new();
        let earlier = factory.unique();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let later = factory.unique();
        assert!(earlier < later);
    }

    #[test]
    fn test_serialization() {
        let addr = AddressFactory::new().unique();
        let serialized = serde_json::to_string(&addr).unwrap();
        let deserialized: Address = serde_json::from_str(&serialized).unwrap();
        assert_eq!(addr, deserialized);
    }
}
