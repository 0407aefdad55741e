//! Cart line items, snapshots and derived totals.
//!
//! A [`CartSnapshot`] is the confirmed state of a cart at one point in time.
//! Totals are carried on the snapshot rather than recomputed by readers:
//! whichever backend produced the snapshot is the single authority for tax
//! and service fee.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::id::ItemId;
use super::price::{CurrencyCode, Price};

// =============================================================================
// Line Items
// =============================================================================

/// Errors for line items that break cart invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineItemError {
    /// Quantity below one.
    #[error("line {0} has quantity 0")]
    ZeroQuantity(ItemId),
    /// Negative unit price.
    #[error("line {0} has a negative price")]
    NegativePrice(ItemId),
    /// Two lines share an ID.
    #[error("line {0} appears more than once")]
    Duplicate(ItemId),
    /// Missing identifier.
    #[error("line has an empty id")]
    BlankId,
}

/// A single line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineItem {
    /// Product or line identifier, unique within the cart.
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Unit price in the cart currency.
    #[serde(rename = "price")]
    pub unit_price: Decimal,
    /// Quantity, always at least 1.
    #[serde(rename = "qty", alias = "quantity")]
    pub quantity: u32,
    /// Optional category tag (e.g. "screen", "battery").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Optional image URL or path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl CartLineItem {
    /// Price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    /// Check the per-line invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), LineItemError> {
        if self.id.is_blank() {
            return Err(LineItemError::BlankId);
        }
        if self.quantity == 0 {
            return Err(LineItemError::ZeroQuantity(self.id.clone()));
        }
        if self.unit_price.is_sign_negative() && !self.unit_price.is_zero() {
            return Err(LineItemError::NegativePrice(self.id.clone()));
        }
        Ok(())
    }
}

/// A purchasable product or repair service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ItemId,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl Product {
    /// Build a cart line for this product.
    #[must_use]
    pub fn to_line(&self, quantity: u32) -> CartLineItem {
        CartLineItem {
            id: self.id.clone(),
            name: self.name.clone(),
            unit_price: self.price,
            quantity,
            category: self.category.clone(),
            image: self.image.clone(),
        }
    }
}

/// A single-step quantity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantityChange {
    Increase,
    Decrease,
}

impl QuantityChange {
    /// Form value sent to the cart API.
    #[must_use]
    pub const fn as_action(&self) -> &'static str {
        match self {
            Self::Increase => "increase",
            Self::Decrease => "decrease",
        }
    }

    /// Signed delta applied to the quantity.
    #[must_use]
    pub const fn delta(&self) -> i64 {
        match self {
            Self::Increase => 1,
            Self::Decrease => -1,
        }
    }
}

impl FromStr for QuantityChange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "increase" | "+1" => Ok(Self::Increase),
            "decrease" | "-1" => Ok(Self::Decrease),
            other => Err(format!("unknown quantity change: {other}")),
        }
    }
}

// =============================================================================
// Totals
// =============================================================================

/// Derived money totals for a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub service_fee: Decimal,
    pub total: Decimal,
}

impl CartTotals {
    /// Totals for an empty cart.
    pub const ZERO: Self = Self {
        subtotal: Decimal::ZERO,
        tax: Decimal::ZERO,
        service_fee: Decimal::ZERO,
        total: Decimal::ZERO,
    };

    /// Assemble totals from parts, deriving the grand total.
    #[must_use]
    pub fn from_parts(subtotal: Decimal, tax: Decimal, service_fee: Decimal) -> Self {
        Self {
            subtotal,
            tax,
            service_fee,
            total: subtotal + tax + service_fee,
        }
    }
}

/// Sum of price times quantity over the given lines.
#[must_use]
pub fn subtotal_of(lines: &[CartLineItem]) -> Decimal {
    lines.iter().map(CartLineItem::line_total).sum()
}

/// Client-side tax and fee rules, used only by backends that own pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    /// Tax rate as a fraction (0.08 = 8%).
    pub tax_rate: Decimal,
    /// Flat fee charged once per non-empty cart.
    pub service_fee: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(85, 3),
            service_fee: Decimal::new(1500, 2),
        }
    }
}

impl PricingPolicy {
    /// Compute totals for the given lines.
    ///
    /// Tax is rounded half away from zero to cents. The service fee applies
    /// only when the cart has at least one line.
    #[must_use]
    pub fn totals_for(&self, lines: &[CartLineItem]) -> CartTotals {
        if lines.is_empty() {
            return CartTotals::ZERO;
        }
        let subtotal = subtotal_of(lines);
        let tax = (subtotal * self.tax_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        CartTotals::from_parts(subtotal, tax, self.service_fee)
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Confirmed state of the cart at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    /// Lines in insertion (local) or server-provided (remote) order.
    pub items: Vec<CartLineItem>,
    /// Currency of every amount in the snapshot.
    pub currency: CurrencyCode,
    /// Totals as reported by the backend that produced the snapshot.
    pub totals: CartTotals,
}

impl CartSnapshot {
    /// An empty cart.
    #[must_use]
    pub const fn empty(currency: CurrencyCode) -> Self {
        Self {
            items: Vec::new(),
            currency,
            totals: CartTotals::ZERO,
        }
    }

    /// Build a snapshot whose totals come from a client-side policy.
    #[must_use]
    pub fn priced(items: Vec<CartLineItem>, currency: CurrencyCode, policy: &PricingPolicy) -> Self {
        let totals = policy.totals_for(&items);
        Self {
            items,
            currency,
            totals,
        }
    }

    /// Total number of units, as shown on the cart badge.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|line| line.quantity).sum()
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Find a line by ID.
    #[must_use]
    pub fn line(&self, id: &ItemId) -> Option<&CartLineItem> {
        self.items.iter().find(|line| &line.id == id)
    }

    /// Wrap an amount in the snapshot currency for display.
    #[must_use]
    pub const fn money(&self, amount: Decimal) -> Price {
        Price::new(amount, self.currency)
    }

    /// Check every snapshot invariant: valid lines, unique IDs, and a
    /// subtotal equal to the sum of line totals.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for line in &self.items {
            line.validate().map_err(|e| e.to_string())?;
            if !seen.insert(&line.id) {
                return Err(LineItemError::Duplicate(line.id.clone()).to_string());
            }
        }
        let expected = subtotal_of(&self.items);
        if self.totals.subtotal != expected {
            return Err(format!(
                "subtotal {} does not match line totals {expected}",
                self.totals.subtotal
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line(id: &str, cents: i64, quantity: u32) -> CartLineItem {
        CartLineItem {
            id: ItemId::from(id),
            name: format!("Item {id}"),
            unit_price: Decimal::new(cents, 2),
            quantity,
            category: None,
            image: None,
        }
    }

    #[test]
    fn test_subtotal_and_count() {
        let snapshot = CartSnapshot::priced(
            vec![line("a", 1000, 2), line("b", 500, 1)],
            CurrencyCode::USD,
            &PricingPolicy::default(),
        );
        assert_eq!(snapshot.totals.subtotal, Decimal::from(25));
        assert_eq!(snapshot.item_count(), 3);
        assert_eq!(snapshot.line_count(), 2);
        assert!(snapshot.check_invariants().is_ok());
    }

    #[test]
    fn test_service_fee_only_when_non_empty() {
        let policy = PricingPolicy {
            tax_rate: Decimal::ZERO,
            service_fee: Decimal::new(299, 2),
        };
        assert_eq!(policy.totals_for(&[]), CartTotals::ZERO);

        let totals = policy.totals_for(&[line("a", 1000, 1)]);
        assert_eq!(totals.service_fee, Decimal::new(299, 2));
        assert_eq!(totals.total, Decimal::new(1299, 2));
    }

    #[test]
    fn test_tax_rounds_half_away_from_zero() {
        let policy = PricingPolicy {
            tax_rate: Decimal::new(5, 2),
            service_fee: Decimal::ZERO,
        };
        // 0.05 * 0.50 = 0.025 -> 0.03
        let totals = policy.totals_for(&[line("a", 50, 1)]);
        assert_eq!(totals.tax, Decimal::new(3, 2));
        assert_eq!(totals.total, Decimal::new(53, 2));
    }

    #[test]
    fn test_invariants_catch_bad_subtotal() {
        let mut snapshot = CartSnapshot::priced(
            vec![line("a", 1000, 1)],
            CurrencyCode::USD,
            &PricingPolicy::default(),
        );
        snapshot.totals.subtotal = Decimal::from(99);
        assert!(snapshot.check_invariants().is_err());
    }

    #[test]
    fn test_invariants_catch_zero_quantity_and_duplicates() {
        let zero = CartSnapshot {
            items: vec![line("a", 100, 0)],
            currency: CurrencyCode::USD,
            totals: CartTotals::ZERO,
        };
        assert!(zero.check_invariants().unwrap_err().contains("quantity 0"));

        let dup = CartSnapshot::priced(
            vec![line("a", 100, 1), line("a", 100, 1)],
            CurrencyCode::USD,
            &PricingPolicy::default(),
        );
        assert!(dup.check_invariants().unwrap_err().contains("more than once"));
    }

    #[test]
    fn test_line_serializes_price_field() {
        let json = serde_json::to_value(line("a", 1000, 2)).unwrap();
        assert_eq!(json["price"], "10.00");
        assert_eq!(json["qty"], 2);
        assert!(json.get("quantity").is_none());
        assert!(json.get("category").is_none());
    }

    #[test]
    fn test_line_accepts_both_quantity_spellings() {
        let stored: CartLineItem =
            serde_json::from_str(r#"{"id": 3, "name": "Glass", "price": 129.99, "qty": 2}"#).unwrap();
        assert_eq!(stored.quantity, 2);
        assert_eq!(stored.unit_price, Decimal::new(12999, 2));

        let api: CartLineItem =
            serde_json::from_str(r#"{"id": "3", "name": "Glass", "price": "129.99", "quantity": 4}"#)
                .unwrap();
        assert_eq!(api.quantity, 4);
        assert_eq!(api.id, stored.id);
    }

    #[test]
    fn test_default_policy_charges_tax_and_fee() {
        let totals = PricingPolicy::default().totals_for(&[line("screen", 10000, 1)]);
        assert_eq!(totals.tax, Decimal::new(850, 2));
        assert_eq!(totals.service_fee, Decimal::from(15));
        assert_eq!(totals.total, Decimal::new(12350, 2));
    }

    #[test]
    fn test_quantity_change_parse() {
        assert_eq!("increase".parse::<QuantityChange>().unwrap(), QuantityChange::Increase);
        assert_eq!("-1".parse::<QuantityChange>().unwrap(), QuantityChange::Decrease);
        assert!("double".parse::<QuantityChange>().is_err());
        assert_eq!(QuantityChange::Decrease.delta(), -1);
    }
}
