//! Local storage cart backend.
//!
//! Cart lines live as a JSON array under [`CART_ITEMS_KEY`], placed orders
//! newest first under [`ORDERS_KEY`]. Each operation is a read-modify-write of the whole
//! document, serialized by an internal lock.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use repairbay_core::{
    CartLineItem, CartSnapshot, CheckoutDetails, CurrencyCode, ItemId, Order, PricingPolicy,
    QuantityChange,
};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::StorageAdapter;
use crate::catalog::Catalog;
use crate::config::LocalConfig;
use crate::error::{CartError, Result};
use crate::storage::{CART_ITEMS_KEY, KeyValueStorage, ORDERS_KEY};

/// Cart backed by local key/value storage.
pub struct LocalCartAdapter {
    storage: Arc<dyn KeyValueStorage>,
    catalog: Catalog,
    currency: CurrencyCode,
    pricing: PricingPolicy,
    write_lock: Mutex<()>,
}

impl LocalCartAdapter {
    /// Create an adapter over `storage` using the default currency and pricing.
    pub fn new(storage: Arc<dyn KeyValueStorage>, catalog: Catalog) -> Self {
        Self {
            storage,
            catalog,
            currency: CurrencyCode::default(),
            pricing: PricingPolicy::default(),
            write_lock: Mutex::new(()),
        }
    }

    /// Create an adapter with currency and pricing from configuration.
    pub fn from_config(storage: Arc<dyn KeyValueStorage>, catalog: Catalog, config: &LocalConfig) -> Self {
        Self::new(storage, catalog)
            .with_currency(config.currency)
            .with_pricing(config.pricing)
    }

    #[must_use]
    pub fn with_currency(mut self, currency: CurrencyCode) -> Self {
        self.currency = currency;
        self
    }

    #[must_use]
    pub fn with_pricing(mut self, pricing: PricingPolicy) -> Self {
        self.pricing = pricing;
        self
    }

    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn read_lines(&self) -> Result<Vec<CartLineItem>> {
        let Some(raw) = self.storage.get(CART_ITEMS_KEY)? else {
            return Ok(Vec::new());
        };
        let lines: Vec<CartLineItem> = serde_json::from_str(&raw)?;
        for line in &lines {
            line.validate()
                .map_err(|e| CartError::Malformed(format!("stored cart: {e}")))?;
        }
        Ok(lines)
    }

    fn write_lines(&self, lines: &[CartLineItem]) -> Result<()> {
        if lines.is_empty() {
            self.storage.remove(CART_ITEMS_KEY)?;
        } else {
            self.storage
                .set(CART_ITEMS_KEY, &serde_json::to_string(lines)?)?;
        }
        Ok(())
    }

    fn read_orders(&self) -> Result<Vec<Order>> {
        match self.storage.get(ORDERS_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    fn snapshot(&self, lines: Vec<CartLineItem>) -> CartSnapshot {
        CartSnapshot::priced(lines, self.currency, &self.pricing)
    }

    /// Apply `edit` to the stored lines and persist the result.
    async fn modify<F>(&self, edit: F) -> Result<CartSnapshot>
    where
        F: FnOnce(&mut Vec<CartLineItem>) -> Result<()> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut lines = self.read_lines()?;
        edit(&mut lines)?;
        self.write_lines(&lines)?;
        Ok(self.snapshot(lines))
    }
}

fn position(lines: &[CartLineItem], item_id: &ItemId) -> Result<usize> {
    lines
        .iter()
        .position(|line| &line.id == item_id)
        .ok_or_else(|| CartError::NotInCart(item_id.clone()))
}

#[async_trait]
impl StorageAdapter for LocalCartAdapter {
    fn name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self))]
    async fn load(&self) -> Result<CartSnapshot> {
        let lines = self.read_lines()?;
        debug!(lines = lines.len(), "Loaded local cart");
        Ok(self.snapshot(lines))
    }

    #[instrument(skip(self), fields(item_id = %item_id))]
    async fn add(&self, item_id: &ItemId, quantity: u32) -> Result<CartSnapshot> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity(quantity));
        }
        self.modify(|lines| {
            if let Some(line) = lines.iter_mut().find(|line| &line.id == item_id) {
                line.quantity = line
                    .quantity
                    .checked_add(quantity)
                    .ok_or(CartError::InvalidQuantity(quantity))?;
            } else {
                let product = self
                    .catalog
                    .get(item_id)
                    .ok_or_else(|| CartError::UnknownProduct(item_id.clone()))?;
                lines.push(product.to_line(quantity));
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self), fields(item_id = %item_id))]
    async fn remove(&self, item_id: &ItemId) -> Result<CartSnapshot> {
        self.modify(|lines| {
            let index = position(lines, item_id)?;
            lines.remove(index);
            Ok(())
        })
        .await
    }

    #[instrument(skip(self), fields(item_id = %item_id, change = change.as_action()))]
    async fn update_quantity(
        &self,
        item_id: &ItemId,
        change: QuantityChange,
    ) -> Result<CartSnapshot> {
        self.modify(|lines| {
            let index = position(lines, item_id)?;
            let current = lines.get(index).map_or(0, |line| line.quantity);
            let next = match change {
                QuantityChange::Increase => current
                    .checked_add(1)
                    .ok_or(CartError::InvalidQuantity(current))?,
                QuantityChange::Decrease => current.saturating_sub(1),
            };
            if next == 0 {
                lines.remove(index);
            } else if let Some(line) = lines.get_mut(index) {
                line.quantity = next;
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<CartSnapshot> {
        let _guard = self.write_lock.lock().await;
        self.storage.remove(CART_ITEMS_KEY)?;
        Ok(self.snapshot(Vec::new()))
    }

    #[instrument(skip(self, details))]
    async fn checkout(&self, details: &CheckoutDetails) -> Result<Order> {
        let _guard = self.write_lock.lock().await;
        let lines = self.read_lines()?;
        if lines.is_empty() {
            return Err(CartError::EmptyCart);
        }

        let order = Order::place(details.clone(), &self.snapshot(lines), Utc::now());
        let mut orders = self.read_orders()?;
        orders.insert(0, order.clone());
        self.storage
            .set(ORDERS_KEY, &serde_json::to_string(&orders)?)?;
        self.storage.remove(CART_ITEMS_KEY)?;

        tracing::info!(order_id = %order.id, items = order.item_count(), "Order placed");
        Ok(order)
    }

    async fn orders(&self) -> Result<Vec<Order>> {
        self.read_orders()
    }
}
