//! Identifier newtypes for cart entities.
//!
//! Cart line identifiers arrive as strings from local storage and as either
//! strings or integers from the cart API, so [`ItemId`] normalizes both into a
//! single string-backed type. Orders placed locally are keyed by UUID.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Identifier of a product or cart line, unique within a cart.
///
/// Deserializes from either a JSON string or a JSON integer:
///
/// ```rust
/// # use repairbay_core::ItemId;
/// let from_str: ItemId = serde_json::from_str("\"screen-iphone-13\"").unwrap();
/// let from_num: ItemId = serde_json::from_str("42").unwrap();
///
/// assert_eq!(from_str.as_str(), "screen-iphone-13");
/// assert_eq!(from_num, ItemId::from(42));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Create an item ID from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the ID is empty or whitespace only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for ItemId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => Self(s),
            RawId::Number(n) => Self::from(n),
        })
    }
}

/// Identifier of an order placed through local checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Generate a fresh random order ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Short human-facing reference (first 8 hex digits, upper case).
    #[must_use]
    pub fn reference(&self) -> String {
        self.0.simple().to_string().chars().take(8).collect::<String>().to_uppercase()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for OrderId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_accepts_string_and_number() {
        let a: ItemId = serde_json::from_str("\"battery-pixel-7\"").unwrap();
        let b: ItemId = serde_json::from_str("17").unwrap();
        assert_eq!(a.as_str(), "battery-pixel-7");
        assert_eq!(b.as_str(), "17");
    }

    #[test]
    fn test_item_id_serializes_as_string() {
        let id = ItemId::from(17);
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"17\"");
    }

    #[test]
    fn test_item_id_rejects_other_json() {
        assert!(serde_json::from_str::<ItemId>("true").is_err());
        assert!(serde_json::from_str::<ItemId>("{}").is_err());
    }

    #[test]
    fn test_item_id_blank() {
        assert!(ItemId::new("  ").is_blank());
        assert!(!ItemId::new("a").is_blank());
    }

    #[test]
    fn test_order_reference_is_short() {
        let id = OrderId::generate();
        let reference = id.reference();
        assert_eq!(reference.len(), 8);
        assert_eq!(reference, reference.to_uppercase());
    }
}
