//! Action dispatchers: user clicks in, confirmed snapshots out.
//!
//! Clicks are delegated from a stable container, so the dispatcher only sees
//! an [`ActionEvent`]: the clicked element's `data-action` plus its other
//! `data-*` attributes. Re-rendered buttons need no re-binding.
//!
//! For every event the dispatcher:
//!
//! 1. parses a [`CartAction`] from the data attributes,
//! 2. marks the item pending (its controls render disabled) and waits for
//!    any earlier request on the same item,
//! 3. calls the adapter,
//! 4. hands the confirmed snapshot to the store, or leaves the store alone
//!    on failure,
//! 5. shows exactly one toast, or redirects to login.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use repairbay_core::{CartSnapshot, CheckoutDetails, ItemId, Order, QuantityChange};
use tokio::sync::OwnedMutexGuard;
use tracing::{info, instrument, warn};

use crate::adapter::StorageAdapter;
use crate::error::{CartError, Result, add_breadcrumb};
use crate::notify::{Toast, Toaster};
use crate::store::CartStore;

pub const ATTR_ACTION: &str = "data-action";
pub const ATTR_ITEM_ID: &str = "data-item-id";
pub const ATTR_PRODUCT_ID: &str = "data-product-id";
pub const ATTR_QUANTITY: &str = "data-quantity";

/// Default authentication entry point.
pub const DEFAULT_LOGIN_URL: &str = "/accounts/login/?next=/cart/";

// =============================================================================
// Events and Actions
// =============================================================================

/// A delegated click: the action name and the target's data attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionEvent {
    pub action: String,
    pub data: HashMap<String, String>,
}

impl ActionEvent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            data: HashMap::new(),
        }
    }

    /// Build an event from an element's attributes, reading the action from
    /// `data-action`.
    pub fn from_attributes<I, K, V>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut data: HashMap<String, String> = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let action = data.remove(ATTR_ACTION).unwrap_or_default();
        Self { action, data }
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, key: &str) -> Result<ItemId> {
        self.attr(key)
            .map(ItemId::from)
            .ok_or_else(|| CartError::InvalidAction(format!("{} without {key}", self.action)))
    }
}

/// A cart mutation requested by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartAction {
    Add { product_id: ItemId, quantity: u32 },
    Remove { item_id: ItemId },
    Update { item_id: ItemId, change: QuantityChange },
    Clear,
}

impl CartAction {
    /// Parse an action from a delegated event.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidAction` for an unknown action or a missing
    /// or unparsable attribute, and `CartError::InvalidQuantity` for a zero
    /// quantity.
    pub fn from_event(event: &ActionEvent) -> Result<Self> {
        match event.action.trim() {
            "add" => {
                let product_id = event.require(ATTR_PRODUCT_ID)?;
                let quantity = match event.attr(ATTR_QUANTITY) {
                    Some(raw) => raw.parse::<u32>().map_err(|_| {
                        CartError::InvalidAction(format!("bad {ATTR_QUANTITY}: {raw}"))
                    })?,
                    None => 1,
                };
                if quantity == 0 {
                    return Err(CartError::InvalidQuantity(0));
                }
                Ok(Self::Add {
                    product_id,
                    quantity,
                })
            }
            "remove" => Ok(Self::Remove {
                item_id: event.require(ATTR_ITEM_ID)?,
            }),
            "increase" | "decrease" => {
                let change = event
                    .action
                    .trim()
                    .parse::<QuantityChange>()
                    .map_err(|_| CartError::InvalidAction(event.action.clone()))?;
                Ok(Self::Update {
                    item_id: event.require(ATTR_ITEM_ID)?,
                    change,
                })
            }
            "clear" => Ok(Self::Clear),
            other => Err(CartError::InvalidAction(format!("unknown action {other:?}"))),
        }
    }

    /// The line this action targets, if any.
    #[must_use]
    pub const fn item_id(&self) -> Option<&ItemId> {
        match self {
            Self::Add { product_id, .. } => Some(product_id),
            Self::Remove { item_id } | Self::Update { item_id, .. } => Some(item_id),
            Self::Clear => None,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Remove { .. } => "remove",
            Self::Update { change, .. } => change.as_action(),
            Self::Clear => "clear",
        }
    }

    const fn success_message(&self) -> &'static str {
        match self {
            Self::Add { .. } => "Added to cart",
            Self::Remove { .. } => "Removed from cart",
            Self::Update { .. } => "Cart updated",
            Self::Clear => "Cart cleared",
        }
    }
}

// =============================================================================
// Pending Items
// =============================================================================

#[derive(Default)]
struct PendingEntry {
    lock: Arc<tokio::sync::Mutex<()>>,
    requests: usize,
}

/// Items with a request in flight, and the per-item request queue.
///
/// Requests for the same item run one at a time in arrival order; requests
/// for different items never wait on each other.
///
/// Items are keyed by the id the action carries: `add` uses the product id,
/// while `remove`, `increase` and `decrease` use the line id. Servers whose
/// line ids differ from product ids (a cart-item primary key, say) therefore
/// do not serialize an `add` against a quantity change on the same line.
#[derive(Clone, Default)]
pub struct PendingItems {
    entries: Arc<Mutex<HashMap<ItemId, PendingEntry>>>,
}

impl PendingItems {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `item_id` pending and wait for its earlier requests to finish.
    ///
    /// The item stays pending until the returned guard is dropped.
    pub async fn acquire(&self, item_id: &ItemId) -> PendingGuard {
        let mark = PendingMark {
            entries: Arc::clone(&self.entries),
            item_id: item_id.clone(),
        };
        let lock = {
            let mut entries = self.lock();
            let entry = entries.entry(item_id.clone()).or_default();
            entry.requests += 1;
            Arc::clone(&entry.lock)
        };
        let turn = lock.lock_owned().await;
        PendingGuard { turn, mark }
    }

    #[must_use]
    pub fn is_pending(&self, item_id: &ItemId) -> bool {
        self.lock().contains_key(item_id)
    }

    /// Snapshot of every pending item.
    #[must_use]
    pub fn ids(&self) -> HashSet<ItemId> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ItemId, PendingEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds an item's turn; releases it and the pending mark on drop.
pub struct PendingGuard {
    // Field order matters: the turn is released before the mark.
    turn: OwnedMutexGuard<()>,
    mark: PendingMark,
}

impl PendingGuard {
    /// Clear the pending mark but keep the item's turn.
    ///
    /// The next request for the item starts only once the returned guard is
    /// dropped, so the caller can publish this request's result first.
    #[must_use]
    pub fn settle(self) -> OwnedMutexGuard<()> {
        let Self { turn, mark } = self;
        drop(mark);
        turn
    }
}

struct PendingMark {
    entries: Arc<Mutex<HashMap<ItemId, PendingEntry>>>,
    item_id: ItemId,
}

impl Drop for PendingMark {
    fn drop(&mut self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get_mut(&self.item_id) {
            entry.requests = entry.requests.saturating_sub(1);
            if entry.requests == 0 {
                entries.remove(&self.item_id);
            }
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// What the page should do after an action.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The adapter confirmed the change and the store holds this snapshot.
    Updated(Arc<CartSnapshot>),
    /// The user must authenticate first; navigate to `redirect`.
    LoginRequired { redirect: String },
    /// The action failed; the store still holds its previous snapshot.
    Failed(CartError),
}

impl DispatchOutcome {
    #[must_use]
    pub const fn is_updated(&self) -> bool {
        matches!(self, Self::Updated(_))
    }

    #[must_use]
    pub fn redirect(&self) -> Option<&str> {
        match self {
            Self::LoginRequired { redirect } => Some(redirect),
            _ => None,
        }
    }
}

/// Routes cart actions through the adapter into the store.
#[derive(Clone)]
pub struct CartDispatcher {
    adapter: Arc<dyn StorageAdapter>,
    store: CartStore,
    toaster: Arc<dyn Toaster>,
    pending: PendingItems,
    login_url: String,
}

impl CartDispatcher {
    pub fn new(adapter: Arc<dyn StorageAdapter>, store: CartStore, toaster: Arc<dyn Toaster>) -> Self {
        Self {
            adapter,
            store,
            toaster,
            pending: PendingItems::new(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_login_url(mut self, login_url: impl Into<String>) -> Self {
        self.login_url = login_url.into();
        self
    }

    #[must_use]
    pub const fn store(&self) -> &CartStore {
        &self.store
    }

    #[must_use]
    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    /// Pending set shared with the binders.
    #[must_use]
    pub const fn pending(&self) -> &PendingItems {
        &self.pending
    }

    /// Handle a delegated click.
    pub async fn dispatch(&self, event: &ActionEvent) -> DispatchOutcome {
        match CartAction::from_event(event) {
            Ok(action) => self.perform(action).await,
            Err(e) => {
                warn!(action = %event.action, error = %e, "Ignoring malformed cart action");
                self.fail(e)
            }
        }
    }

    /// Run one cart action end to end.
    #[instrument(skip(self), fields(action = action.name()))]
    pub async fn perform(&self, action: CartAction) -> DispatchOutcome {
        let item_id = action.item_id().map(ToString::to_string).unwrap_or_default();
        add_breadcrumb("cart", action.name(), &[("item_id", item_id.as_str())]);

        let guard = match action.item_id() {
            Some(id) => Some(self.pending.acquire(id).await),
            None => None,
        };
        if guard.is_some() {
            self.store.notify();
        }
        let result = self.call(&action).await;

        // The item's turn is held until the store has this response, so
        // same-item responses land in click order.
        let turn = guard.map(PendingGuard::settle);
        let outcome = match result {
            Ok(snapshot) => {
                let snapshot = self.store.apply_confirmed(snapshot);
                info!(items = snapshot.item_count(), "Cart action confirmed");
                self.toaster.show(Toast::success(action.success_message()));
                DispatchOutcome::Updated(snapshot)
            }
            Err(e) => {
                if turn.is_some() {
                    // Re-enable the item's controls.
                    self.store.notify();
                }
                self.fail(e)
            }
        };
        drop(turn);
        outcome
    }

    /// Place an order from the current cart.
    ///
    /// On success the store is emptied and a confirmation toast is shown.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error after showing it as a toast. Login
    /// required is returned without a toast.
    #[instrument(skip(self, details))]
    pub async fn checkout(&self, details: &CheckoutDetails) -> Result<Order> {
        add_breadcrumb("cart", "checkout", &[]);
        match self.adapter.checkout(details).await {
            Ok(order) => {
                // A successful checkout empties the cart.
                self.store
                    .apply_confirmed(CartSnapshot::empty(order.currency));
                info!(order = %order.id, items = order.item_count(), "Order placed");
                self.toaster.show(Toast::success(format!(
                    "Order {} placed",
                    order.id.reference()
                )));
                Ok(order)
            }
            Err(e) => {
                warn!(error = %e, "Checkout failed");
                if !e.is_login_required() {
                    self.toaster.show(Toast::error(e.user_message()));
                }
                Err(e)
            }
        }
    }

    async fn call(&self, action: &CartAction) -> Result<CartSnapshot> {
        match action {
            CartAction::Add {
                product_id,
                quantity,
            } => self.adapter.add(product_id, *quantity).await,
            CartAction::Remove { item_id } => self.adapter.remove(item_id).await,
            CartAction::Update { item_id, change } => {
                self.adapter.update_quantity(item_id, *change).await
            }
            CartAction::Clear => self.adapter.clear().await,
        }
    }

    fn fail(&self, error: CartError) -> DispatchOutcome {
        if error.is_login_required() {
            info!(redirect = %self.login_url, "Login required, redirecting");
            add_breadcrumb("auth", "login required", &[("redirect", self.login_url.as_str())]);
            return DispatchOutcome::LoginRequired {
                redirect: self.login_url.clone(),
            };
        }

        if error.is_transport() {
            warn!(backend = self.adapter.name(), error = %error, "Cart request failed");
        } else {
            info!(backend = self.adapter.name(), error = %error, "Cart action refused");
        }
        self.toaster.show(Toast::error(error.user_message()));
        DispatchOutcome::Failed(error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use repairbay_core::{CartLineItem, CurrencyCode, PricingPolicy};
    use rust_decimal::Decimal;

    use super::*;
    use crate::notify::{ToastKind, ToastQueue};

    /// In-memory adapter with scripted failures and concurrency tracking.
    #[derive(Default)]
    struct ScriptedAdapter {
        lines: Mutex<Vec<CartLineItem>>,
        fail: Mutex<Option<fn() -> CartError>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedAdapter {
        fn failing_with(self, make: fn() -> CartError) -> Self {
            *self.fail.lock().unwrap() = Some(make);
            self
        }

        async fn run(
            &self,
            mutate: impl FnOnce(&mut Vec<CartLineItem>) -> Result<()>,
        ) -> Result<CartSnapshot> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let Some(make) = *self.fail.lock().unwrap() {
                return Err(make());
            }
            let mut lines = self.lines.lock().unwrap();
            mutate(&mut *lines)?;
            Ok(CartSnapshot::priced(
                lines.clone(),
                CurrencyCode::USD,
                &PricingPolicy::default(),
            ))
        }
    }

    fn product(id: &ItemId, quantity: u32) -> CartLineItem {
        CartLineItem {
            id: id.clone(),
            name: format!("Product {id}"),
            unit_price: Decimal::from(10),
            quantity,
            category: None,
            image: None,
        }
    }

    #[async_trait]
    impl StorageAdapter for ScriptedAdapter {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn load(&self) -> Result<CartSnapshot> {
            self.run(|_| Ok(())).await
        }

        async fn add(&self, item_id: &ItemId, quantity: u32) -> Result<CartSnapshot> {
            self.run(|lines| {
                match lines.iter_mut().find(|l| &l.id == item_id) {
                    Some(line) => line.quantity += quantity,
                    None => lines.push(product(item_id, quantity)),
                }
                Ok(())
            })
            .await
        }

        async fn remove(&self, item_id: &ItemId) -> Result<CartSnapshot> {
            self.run(|lines| {
                lines.retain(|l| &l.id != item_id);
                Ok(())
            })
            .await
        }

        async fn update_quantity(&self, item_id: &ItemId, change: QuantityChange) -> Result<CartSnapshot> {
            self.run(|lines| {
                let Some(pos) = lines.iter().position(|l| &l.id == item_id) else {
                    return Err(CartError::NotInCart(item_id.clone()));
                };
                match change {
                    QuantityChange::Increase => lines[pos].quantity += 1,
                    QuantityChange::Decrease if lines[pos].quantity <= 1 => {
                        lines.remove(pos);
                    }
                    QuantityChange::Decrease => lines[pos].quantity -= 1,
                }
                Ok(())
            })
            .await
        }

        async fn clear(&self) -> Result<CartSnapshot> {
            self.run(|lines| {
                lines.clear();
                Ok(())
            })
            .await
        }
    }

    fn setup(adapter: ScriptedAdapter) -> (CartDispatcher, Arc<ScriptedAdapter>, Arc<ToastQueue>) {
        let adapter = Arc::new(adapter);
        let toasts = Arc::new(ToastQueue::new());
        let dispatcher = CartDispatcher::new(
            Arc::clone(&adapter) as Arc<dyn StorageAdapter>,
            CartStore::new(CurrencyCode::USD),
            Arc::clone(&toasts) as Arc<dyn Toaster>,
        );
        (dispatcher, adapter, toasts)
    }

    fn add_event(id: &str) -> ActionEvent {
        ActionEvent::new("add").with_data(ATTR_PRODUCT_ID, id)
    }

    fn item_event(action: &str, id: &str) -> ActionEvent {
        ActionEvent::new(action).with_data(ATTR_ITEM_ID, id)
    }

    #[test]
    fn test_parse_actions() {
        let event = ActionEvent::from_attributes([
            ("data-action", "add"),
            ("data-product-id", "42"),
            ("data-quantity", "3"),
        ]);
        assert_eq!(
            CartAction::from_event(&event).unwrap(),
            CartAction::Add {
                product_id: ItemId::from(42),
                quantity: 3
            }
        );
        assert_eq!(
            CartAction::from_event(&item_event("decrease", "a")).unwrap(),
            CartAction::Update {
                item_id: ItemId::from("a"),
                change: QuantityChange::Decrease
            }
        );
        assert_eq!(
            CartAction::from_event(&ActionEvent::new("clear")).unwrap(),
            CartAction::Clear
        );
    }

    #[test]
    fn test_actions_lock_on_the_id_they_carry() {
        let add = CartAction::from_event(&add_event("p-1")).unwrap();
        let increase = CartAction::from_event(&item_event("increase", "line-9")).unwrap();
        assert_eq!(add.item_id(), Some(&ItemId::from("p-1")));
        assert_eq!(increase.item_id(), Some(&ItemId::from("line-9")));
        assert_eq!(CartAction::Clear.item_id(), None);
    }

    #[test]
    fn test_parse_rejects_bad_events() {
        assert!(matches!(
            CartAction::from_event(&ActionEvent::new("remove")),
            Err(CartError::InvalidAction(_))
        ));
        assert!(matches!(
            CartAction::from_event(&ActionEvent::new("explode")),
            Err(CartError::InvalidAction(_))
        ));
        assert!(matches!(
            CartAction::from_event(&add_event("a").with_data(ATTR_QUANTITY, "0")),
            Err(CartError::InvalidQuantity(0))
        ));
        assert!(matches!(
            CartAction::from_event(&add_event("a").with_data(ATTR_QUANTITY, "two")),
            Err(CartError::InvalidAction(_))
        ));
    }

    #[tokio::test]
    async fn test_success_updates_store_with_one_toast() {
        let (dispatcher, _, toasts) = setup(ScriptedAdapter::default());

        let outcome = dispatcher.dispatch(&add_event("a")).await;
        assert!(outcome.is_updated());
        assert_eq!(dispatcher.store().get_snapshot().item_count(), 1);

        let shown = toasts.drain();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].kind, ToastKind::Success);
        assert!(!dispatcher.pending().is_pending(&ItemId::from("a")));
    }

    #[tokio::test]
    async fn test_failure_keeps_snapshot_and_toasts_once() {
        let (dispatcher, adapter, toasts) = setup(ScriptedAdapter::default());
        dispatcher.dispatch(&add_event("a")).await;
        let before = dispatcher.store().get_snapshot();
        let version = dispatcher.store().version();
        toasts.drain();

        *adapter.fail.lock().unwrap() = Some(|| CartError::Malformed("truncated".to_string()));
        let outcome = dispatcher.dispatch(&item_event("increase", "a")).await;

        assert!(matches!(outcome, DispatchOutcome::Failed(CartError::Malformed(_))));
        assert_eq!(dispatcher.store().get_snapshot(), before);
        assert_eq!(dispatcher.store().version(), version);
        let shown = toasts.drain();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].kind, ToastKind::Error);
    }

    #[tokio::test]
    async fn test_login_required_redirects_without_mutation() {
        let (dispatcher, _, toasts) =
            setup(ScriptedAdapter::default().failing_with(|| CartError::LoginRequired));
        let dispatcher = dispatcher.with_login_url("/login/?next=/shop/");

        let outcome = dispatcher.dispatch(&add_event("a")).await;

        assert_eq!(outcome.redirect(), Some("/login/?next=/shop/"));
        assert!(dispatcher.store().get_snapshot().is_empty());
        assert_eq!(dispatcher.store().version(), 0);
        assert!(toasts.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_event_toasts_error() {
        let (dispatcher, _, toasts) = setup(ScriptedAdapter::default());
        let outcome = dispatcher.dispatch(&ActionEvent::new("remove")).await;
        assert!(matches!(outcome, DispatchOutcome::Failed(CartError::InvalidAction(_))));
        assert_eq!(toasts.len(), 1);
    }

    #[tokio::test]
    async fn test_same_item_requests_are_serialized() {
        let (dispatcher, adapter, _) = setup(ScriptedAdapter {
            delay: Duration::from_millis(20),
            ..Default::default()
        });

        let event = add_event("a");
        let (first, second) = tokio::join!(dispatcher.dispatch(&event), dispatcher.dispatch(&event));

        assert!(first.is_updated() && second.is_updated());
        assert_eq!(adapter.max_in_flight.load(Ordering::SeqCst), 1);
        let snapshot = dispatcher.store().get_snapshot();
        assert_eq!(snapshot.line(&ItemId::from("a")).unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn test_different_items_run_concurrently() {
        let (dispatcher, adapter, _) = setup(ScriptedAdapter {
            delay: Duration::from_millis(20),
            ..Default::default()
        });

        let (add_a, add_b) = (add_event("a"), add_event("b"));
        let (a, b) = tokio::join!(dispatcher.dispatch(&add_a), dispatcher.dispatch(&add_b));

        assert!(a.is_updated() && b.is_updated());
        assert_eq!(adapter.max_in_flight.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.store().get_snapshot().line_count(), 2);
    }

    #[tokio::test]
    async fn test_item_is_pending_while_in_flight() {
        let (dispatcher, _, _) = setup(ScriptedAdapter {
            delay: Duration::from_millis(20),
            ..Default::default()
        });
        let seen_pending = Arc::new(AtomicUsize::new(0));
        {
            let pending = dispatcher.pending().clone();
            let seen = Arc::clone(&seen_pending);
            dispatcher.store().subscribe(move |_| {
                if pending.is_pending(&ItemId::from("a")) {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        dispatcher.dispatch(&add_event("a")).await;

        assert_eq!(seen_pending.load(Ordering::SeqCst), 1);
        assert!(dispatcher.pending().ids().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_item_responses_apply_in_click_order() {
        let (dispatcher, _, _) = setup(ScriptedAdapter {
            delay: Duration::from_millis(5),
            ..Default::default()
        });
        let applied = Arc::new(Mutex::new(Vec::new()));
        {
            let applied = Arc::clone(&applied);
            dispatcher.store().subscribe(move |snapshot| {
                if let Some(line) = snapshot.line(&ItemId::from("a")) {
                    applied.lock().unwrap().push(line.quantity);
                }
            });
        }

        let clicks: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    let event = add_event("a");
                    dispatcher.dispatch(&event).await
                })
            })
            .collect();
        for click in clicks {
            assert!(click.await.unwrap().is_updated());
        }

        let applied = applied.lock().unwrap().clone();
        assert!(applied.windows(2).all(|pair| pair[0] <= pair[1]), "{applied:?}");
        assert_eq!(applied.last(), Some(&8));
        assert_eq!(dispatcher.store().get_snapshot().line(&ItemId::from("a")).unwrap().quantity, 8);
    }

    #[tokio::test]
    async fn test_settled_guard_clears_mark_but_keeps_turn() {
        let pending = PendingItems::new();
        let id = ItemId::from("a");

        let turn = pending.acquire(&id).await.settle();
        assert!(!pending.is_pending(&id));

        let waiter = {
            let pending = pending.clone();
            let id = id.clone();
            tokio::spawn(async move { drop(pending.acquire(&id).await) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(pending.is_pending(&id));
        assert!(!waiter.is_finished());

        drop(turn);
        waiter.await.unwrap();
        assert!(!pending.is_pending(&id));
    }

    #[tokio::test]
    async fn test_decrease_at_one_removes_line() {
        let (dispatcher, _, _) = setup(ScriptedAdapter::default());
        dispatcher.dispatch(&add_event("a")).await;
        dispatcher.dispatch(&item_event("decrease", "a")).await;
        assert!(dispatcher.store().get_snapshot().is_empty());
    }
}
