//! Product catalog used by the local backend to materialize cart lines.

use std::collections::HashMap;

use repairbay_core::{ItemId, Product};

use crate::error::{CartError, Result};

/// Products and repair services that can be added to a local cart.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: Vec<Product>,
    index: HashMap<ItemId, usize>,
}

impl Catalog {
    /// Build a catalog; later duplicates of an ID are ignored.
    #[must_use]
    pub fn new(products: Vec<Product>) -> Self {
        let mut kept = Vec::with_capacity(products.len());
        let mut index = HashMap::with_capacity(products.len());
        for product in products {
            if index.contains_key(&product.id) {
                tracing::warn!(product_id = %product.id, "Duplicate catalog entry ignored");
                continue;
            }
            index.insert(product.id.clone(), kept.len());
            kept.push(product);
        }
        Self {
            products: kept,
            index,
        }
    }

    /// Parse a catalog from a JSON array of products.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Serialization` for invalid JSON and
    /// `CartError::Malformed` for products with a negative price.
    pub fn from_json(json: &str) -> Result<Self> {
        let products: Vec<Product> = serde_json::from_str(json)?;
        if let Some(bad) = products.iter().find(|p| p.price.is_sign_negative() && !p.price.is_zero()) {
            return Err(CartError::Malformed(format!("product {} has a negative price", bad.id)));
        }
        Ok(Self::new(products))
    }

    #[must_use]
    pub fn get(&self, id: &ItemId) -> Option<&Product> {
        self.index.get(id).and_then(|&i| self.products.get(i))
    }

    /// Products in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &Product> {
        self.products.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    const JSON: &str = r#"[
        {"id": "screen-ip13", "name": "iPhone 13 screen replacement", "price": "129.00", "category": "repair"},
        {"id": 7, "name": "Tempered glass protector", "price": "9.99"},
        {"id": "screen-ip13", "name": "duplicate", "price": "1.00"}
    ]"#;

    #[test]
    fn test_from_json_indexes_products() {
        let catalog = Catalog::from_json(JSON).unwrap();
        assert_eq!(catalog.len(), 2);
        let screen = catalog.get(&ItemId::from("screen-ip13")).unwrap();
        assert_eq!(screen.price, Decimal::new(12900, 2));
        assert_eq!(screen.category.as_deref(), Some("repair"));
        assert!(catalog.get(&ItemId::from(7)).is_some());
        assert!(catalog.get(&ItemId::from("missing")).is_none());
    }

    #[test]
    fn test_from_json_rejects_negative_price() {
        let err = Catalog::from_json(r#"[{"id": "x", "name": "x", "price": "-1"}]"#).unwrap_err();
        assert!(matches!(err, CartError::Malformed(_)));
    }
}
