//! # Storage Adapters
//!
//! The [`StorageAdapter`] trait abstracts over where the cart lives. The
//! cart store and dispatchers only ever see confirmed [`CartSnapshot`]s
//! returned by an adapter, never a locally guessed state.
//!
//! ## Implementations
//!
//! - [`remote::RemoteCartAdapter`]: server session behind the
//!   `/orders/api/...` endpoints. Can fail with network errors and with
//!   [`CartError::LoginRequired`](crate::CartError::LoginRequired).
//! - [`local::LocalCartAdapter`]: JSON documents in a
//!   [`KeyValueStorage`](crate::storage::KeyValueStorage). No network failure
//!   mode; prices, tax and service fee are computed client-side.
//!
//! Whichever adapter is active is the single authority for totals.

use async_trait::async_trait;
use repairbay_core::{CartSnapshot, CheckoutDetails, ItemId, Order, QuantityChange};

use crate::error::{CartError, Result};

pub mod local;
pub mod remote;

pub use local::LocalCartAdapter;
pub use remote::RemoteCartAdapter;

/// Persistence backend for the cart.
///
/// Every mutating method returns the full snapshot after the change so the
/// caller can resync without a second round trip.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Read the current cart.
    async fn load(&self) -> Result<CartSnapshot>;

    /// Add `quantity` units of a product. An existing line is incremented
    /// rather than duplicated.
    async fn add(&self, item_id: &ItemId, quantity: u32) -> Result<CartSnapshot>;

    /// Remove a line entirely.
    async fn remove(&self, item_id: &ItemId) -> Result<CartSnapshot>;

    /// Increase or decrease a line by one. Decreasing a line at quantity 1
    /// removes it.
    async fn update_quantity(&self, item_id: &ItemId, change: QuantityChange)
    -> Result<CartSnapshot>;

    /// Empty the cart.
    async fn clear(&self) -> Result<CartSnapshot>;

    /// Place an order from the current cart and empty it.
    async fn checkout(&self, details: &CheckoutDetails) -> Result<Order> {
        let _ = details;
        Err(CartError::Unsupported("checkout"))
    }

    /// Orders previously placed through this backend, newest first.
    async fn orders(&self) -> Result<Vec<Order>> {
        Err(CartError::Unsupported("order history"))
    }
}
