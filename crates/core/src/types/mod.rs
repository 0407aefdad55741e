//! Core types for RepairBay.
//!
//! This module provides type-safe wrappers for the cart domain.

pub mod cart;
pub mod contact;
pub mod id;
pub mod order;
pub mod price;

pub use cart::{
    CartLineItem, CartSnapshot, CartTotals, LineItemError, PricingPolicy, Product, QuantityChange,
    subtotal_of,
};
pub use contact::{Email, EmailError, Phone, PhoneError};
pub use id::{ItemId, OrderId};
pub use order::{CheckoutDetails, CheckoutError, Order, OrderStatus, PaymentMethod};
pub use price::{CurrencyCode, Price, UnknownCurrency};
