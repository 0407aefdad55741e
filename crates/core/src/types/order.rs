//! Checkout details and locally recorded orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cart::{CartLineItem, CartSnapshot, CartTotals};
use super::contact::{Email, EmailError, Phone, PhoneError};
use super::id::OrderId;
use super::price::CurrencyCode;

/// How the customer intends to pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Card,
    CashOnPickup,
}

impl std::str::FromStr for PaymentMethod {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "card" => Ok(Self::Card),
            "cash_on_pickup" | "cash" => Ok(Self::CashOnPickup),
            other => Err(CheckoutError::UnknownPaymentMethod(other.to_string())),
        }
    }
}

/// Order lifecycle status.
///
/// Orders are only ever placed on the device; staff move them along on the
/// shop side, which this crate never sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Processing,
}

impl OrderStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
        }
    }
}

/// Validation failures for checkout input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckoutError {
    #[error("name is required")]
    MissingName,
    #[error("invalid email: {0}")]
    Email(#[from] EmailError),
    #[error("invalid phone: {0}")]
    Phone(#[from] PhoneError),
    #[error("unknown payment method: {0}")]
    UnknownPaymentMethod(String),
}

/// Validated customer details submitted from the checkout stepper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutDetails {
    pub name: String,
    pub email: Email,
    pub phone: Phone,
    pub payment: PaymentMethod,
    /// Free-form notes, e.g. device model or fault description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CheckoutDetails {
    /// Validate raw form input.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError` for a blank name or a malformed email/phone.
    pub fn new(
        name: &str,
        email: &str,
        phone: &str,
        payment: PaymentMethod,
        notes: Option<&str>,
    ) -> Result<Self, CheckoutError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CheckoutError::MissingName);
        }
        Ok(Self {
            name: name.to_string(),
            email: Email::parse(email)?,
            phone: Phone::parse(phone)?,
            payment,
            notes: notes
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from),
        })
    }
}

/// An order recorded at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub placed_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub customer: CheckoutDetails,
    pub items: Vec<CartLineItem>,
    pub currency: CurrencyCode,
    pub totals: CartTotals,
}

impl Order {
    /// Freeze the given cart into a newly placed order.
    #[must_use]
    pub fn place(customer: CheckoutDetails, cart: &CartSnapshot, placed_at: DateTime<Utc>) -> Self {
        Self {
            id: OrderId::generate(),
            placed_at,
            status: OrderStatus::Processing,
            customer,
            items: cart.items.clone(),
            currency: cart.currency,
            totals: cart.totals,
        }
    }

    /// Total units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|line| line.quantity).sum()
    }
}
