//! The cart store: sole owner of the in-memory [`CartSnapshot`].
//!
//! The store never guesses. It only replaces its snapshot with one that an
//! adapter confirmed, then calls [`CartStore::notify`] so every subscribed
//! surface re-renders from the same state. Readers get an
//! `Arc<CartSnapshot>`, so a render in progress keeps a consistent view even
//! if a newer snapshot arrives meanwhile.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use repairbay_core::{CartSnapshot, CurrencyCode};
use tracing::{debug, warn};

use crate::adapter::StorageAdapter;

/// Callback invoked with the current snapshot on every notification.
pub type Listener = Arc<dyn Fn(&Arc<CartSnapshot>) + Send + Sync>;

/// Handle returned by [`CartStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Shared handle to the cart state.
///
/// Cheaply cloneable; all clones observe the same snapshot and listeners.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<CartStoreInner>,
}

struct CartStoreInner {
    snapshot: RwLock<Arc<CartSnapshot>>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
    version: AtomicU64,
}

impl CartStore {
    /// A store holding an empty cart.
    #[must_use]
    pub fn new(currency: CurrencyCode) -> Self {
        Self::with_snapshot(CartSnapshot::empty(currency))
    }

    /// A store seeded with an already confirmed snapshot.
    #[must_use]
    pub fn with_snapshot(snapshot: CartSnapshot) -> Self {
        Self {
            inner: Arc::new(CartStoreInner {
                snapshot: RwLock::new(Arc::new(snapshot)),
                listeners: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
                version: AtomicU64::new(0),
            }),
        }
    }

    /// Page-load initialization: read the cart from `adapter`.
    ///
    /// A failed load is logged and the store starts empty; the page stays
    /// usable and the next confirmed mutation resyncs it.
    pub async fn init(adapter: &dyn StorageAdapter, currency: CurrencyCode) -> Self {
        match adapter.load().await {
            Ok(snapshot) => {
                debug!(backend = adapter.name(), items = snapshot.item_count(), "Cart loaded");
                Self::with_snapshot(snapshot)
            }
            Err(e) => {
                warn!(backend = adapter.name(), error = %e, "Failed to load cart, starting empty");
                Self::new(currency)
            }
        }
    }

    /// Page-unload teardown: drop every listener.
    pub fn teardown(&self) {
        let dropped = {
            let mut listeners = self.listeners();
            std::mem::take(&mut *listeners).len()
        };
        debug!(listeners = dropped, "Cart store torn down");
    }

    /// The current confirmed snapshot.
    #[must_use]
    pub fn get_snapshot(&self) -> Arc<CartSnapshot> {
        Arc::clone(
            &self
                .inner
                .snapshot
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Number of confirmed snapshots applied since creation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Register a listener. It is not called until the next notification.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Arc<CartSnapshot>) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.listeners().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.listeners().len()
    }

    /// Call every listener with the current snapshot.
    ///
    /// Listeners run outside the store's locks and may read the store.
    pub fn notify(&self) {
        let snapshot = self.get_snapshot();
        let listeners: Vec<Listener> = self
            .listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&snapshot);
        }
    }

    /// Replace the snapshot with one confirmed by an adapter and notify.
    ///
    /// Responses are applied in arrival order; the last one wins.
    pub fn apply_confirmed(&self, snapshot: CartSnapshot) -> Arc<CartSnapshot> {
        let snapshot = Arc::new(snapshot);
        {
            let mut current = self
                .inner
                .snapshot
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *current = Arc::clone(&snapshot);
        }
        self.inner.version.fetch_add(1, Ordering::AcqRel);
        self.notify();
        snapshot
    }

    fn listeners(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, Listener)>> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use repairbay_core::{CartLineItem, ItemId, PricingPolicy, QuantityChange};
    use rust_decimal::Decimal;

    use super::*;
    use crate::error::{CartError, Result};

    fn snapshot_with(quantity: u32) -> CartSnapshot {
        CartSnapshot::priced(
            vec![CartLineItem {
                id: ItemId::from("a"),
                name: "A".to_string(),
                unit_price: Decimal::from(10),
                quantity,
                category: None,
                image: None,
            }],
            CurrencyCode::USD,
            &PricingPolicy::default(),
        )
    }

    #[test]
    fn test_apply_confirmed_notifies_all_listeners() {
        let store = CartStore::new(CurrencyCode::USD);
        let seen = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let seen = Arc::clone(&seen);
            store.subscribe(move |snapshot| {
                assert_eq!(snapshot.item_count(), 2);
                seen.fetch_add(1, Ordering::SeqCst);
            });
        }

        store.apply_confirmed(snapshot_with(2));
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(store.get_snapshot().item_count(), 2);
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn test_unsubscribe_and_teardown() {
        let store = CartStore::new(CurrencyCode::USD);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        store.subscribe(|_| {});

        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.notify();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        store.teardown();
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn test_listener_can_read_store() {
        let store = CartStore::new(CurrencyCode::USD);
        let reader = store.clone();
        store.subscribe(move |snapshot| {
            assert_eq!(reader.get_snapshot().as_ref(), snapshot.as_ref());
        });
        store.apply_confirmed(snapshot_with(1));
    }

    struct FailingAdapter;

    #[async_trait]
    impl StorageAdapter for FailingAdapter {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn load(&self) -> Result<CartSnapshot> {
            Err(CartError::Malformed("boom".to_string()))
        }
        async fn add(&self, _: &ItemId, _: u32) -> Result<CartSnapshot> {
            Err(CartError::Unsupported("add"))
        }
        async fn remove(&self, _: &ItemId) -> Result<CartSnapshot> {
            Err(CartError::Unsupported("remove"))
        }
        async fn update_quantity(&self, _: &ItemId, _: QuantityChange) -> Result<CartSnapshot> {
            Err(CartError::Unsupported("update"))
        }
        async fn clear(&self) -> Result<CartSnapshot> {
            Err(CartError::Unsupported("clear"))
        }
    }

    #[tokio::test]
    async fn test_init_falls_back_to_empty() {
        let store = CartStore::init(&FailingAdapter, CurrencyCode::EUR).await;
        let snapshot = store.get_snapshot();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.currency, CurrencyCode::EUR);
        assert_eq!(store.version(), 0);
    }
}
