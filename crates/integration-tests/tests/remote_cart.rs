//! Integration tests for the server-session cart.
//!
//! Every test starts its own [`MockCartServer`] so carts never leak between
//! tests.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use repairbay_cart::dispatch::{ATTR_ITEM_ID, ATTR_PRODUCT_ID, ATTR_QUANTITY};
use repairbay_cart::{
    ActionEvent, CartDispatcher, CartError, CartStore, DispatchOutcome, Document, RemoteCartAdapter,
    RemoteConfig, StorageAdapter, Surface, ToastKind, ToastQueue, Toaster, bind_surfaces,
};
use repairbay_core::{CurrencyCode, ItemId, QuantityChange};
use repairbay_integration_tests::{
    CSRF_TOKEN, Fault, MockCartServer, SERVICE_FEE, SESSION_COOKIE, test_catalog,
};
use rust_decimal::Decimal;
use url::Url;

/// Remote settings for the mock server, without a session cookie.
fn remote_config(base_url: Url) -> RemoteConfig {
    let mut config = RemoteConfig::with_base_url(base_url);
    config.timeout = Duration::from_secs(5);
    config
}

fn adapter(server: &MockCartServer) -> RemoteCartAdapter {
    RemoteCartAdapter::new(&remote_config(server.base_url())).unwrap()
}

fn dispatcher(adapter: RemoteCartAdapter) -> (CartDispatcher, Arc<ToastQueue>) {
    let toasts = Arc::new(ToastQueue::new());
    let dispatcher = CartDispatcher::new(
        Arc::new(adapter),
        CartStore::new(CurrencyCode::USD),
        Arc::clone(&toasts) as Arc<dyn Toaster>,
    );
    (dispatcher, toasts)
}

fn add(id: &str) -> ActionEvent {
    ActionEvent::new("add").with_data(ATTR_PRODUCT_ID, id)
}

fn on_item(action: &str, id: &str) -> ActionEvent {
    ActionEvent::new(action).with_data(ATTR_ITEM_ID, id)
}

// =============================================================================
// Adapter
// =============================================================================

#[tokio::test]
async fn test_load_empty_cart() {
    let server = MockCartServer::start(&test_catalog()).await;
    let snapshot = adapter(&server).load().await.unwrap();

    assert!(snapshot.is_empty());
    assert_eq!(snapshot.totals.total, Decimal::ZERO);
}

#[tokio::test]
async fn test_first_post_primes_csrf_cookie() {
    let server = MockCartServer::start(&test_catalog()).await;
    let adapter = adapter(&server);

    let snapshot = adapter.add(&ItemId::from("a"), 1).await.unwrap();

    assert_eq!(snapshot.item_count(), 1);
    assert_eq!(server.accepted_posts(), 1);
    assert_eq!(server.rejected_csrf(), 0);
}

#[tokio::test]
async fn test_server_sets_csrf_cookie_on_cart_fetch() {
    let server = MockCartServer::start(&test_catalog()).await;
    let url = server.base_url().join("orders/api/cart/").unwrap();

    let response = reqwest::get(url).await.unwrap();
    let cookie = response
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();

    assert!(cookie.starts_with(&format!("csrftoken={CSRF_TOKEN}")));
}

#[tokio::test]
async fn test_scenario_subtotal_after_remove() {
    let server = MockCartServer::start(&test_catalog()).await;
    let adapter = adapter(&server);

    adapter.add(&ItemId::from("a"), 2).await.unwrap();
    let snapshot = adapter.add(&ItemId::from("b"), 1).await.unwrap();
    assert_eq!(snapshot.totals.subtotal, Decimal::from(25));
    assert_eq!(snapshot.totals.service_fee, SERVICE_FEE);
    assert_eq!(snapshot.totals.total, Decimal::from(25) + SERVICE_FEE);

    let snapshot = adapter.remove(&ItemId::from("b")).await.unwrap();
    assert_eq!(snapshot.totals.subtotal, Decimal::from(20));
    assert_eq!(snapshot.item_count(), 2);
}

#[tokio::test]
async fn test_add_existing_increments() {
    let server = MockCartServer::start(&test_catalog()).await;
    let adapter = adapter(&server);

    adapter.add(&ItemId::from("a"), 1).await.unwrap();
    let snapshot = adapter.add(&ItemId::from("a"), 2).await.unwrap();

    assert_eq!(snapshot.line_count(), 1);
    assert_eq!(snapshot.line(&ItemId::from("a")).unwrap().quantity, 3);
}

#[tokio::test]
async fn test_numeric_ids_round_trip() {
    let server = MockCartServer::start(&test_catalog()).await;
    let snapshot = adapter(&server).add(&ItemId::from(42), 1).await.unwrap();

    assert_eq!(snapshot.line(&ItemId::from("42")).unwrap().name, "Battery replacement");
}

#[tokio::test]
async fn test_decrease_at_one_removes_line() {
    let server = MockCartServer::start(&test_catalog()).await;
    let adapter = adapter(&server);
    let a = ItemId::from("a");

    adapter.add(&a, 1).await.unwrap();
    let snapshot = adapter
        .update_quantity(&a, QuantityChange::Increase)
        .await
        .unwrap();
    assert_eq!(snapshot.line(&a).unwrap().quantity, 2);

    adapter
        .update_quantity(&a, QuantityChange::Decrease)
        .await
        .unwrap();
    let snapshot = adapter
        .update_quantity(&a, QuantityChange::Decrease)
        .await
        .unwrap();

    assert!(snapshot.line(&a).is_none());
    assert!(snapshot.is_empty());
    assert!(server.lines().is_empty());
}

#[tokio::test]
async fn test_clear_removes_every_line() {
    let server = MockCartServer::start(&test_catalog()).await;
    let adapter = adapter(&server);
    adapter.add(&ItemId::from("a"), 2).await.unwrap();
    adapter.add(&ItemId::from("b"), 1).await.unwrap();

    let snapshot = adapter.clear().await.unwrap();

    assert!(snapshot.is_empty());
    assert_eq!(snapshot.totals.total, Decimal::ZERO);
    assert!(server.lines().is_empty());
}

#[tokio::test]
async fn test_unknown_product_is_rejected() {
    let server = MockCartServer::start(&test_catalog()).await;
    let err = adapter(&server)
        .add(&ItemId::from("nope"), 1)
        .await
        .unwrap_err();

    assert!(matches!(err, CartError::Rejected(ref m) if m == "Product not found"));
}

#[tokio::test]
async fn test_login_required_is_distinct() {
    let server = MockCartServer::start(&test_catalog()).await;
    server.require_login(true);

    let err = adapter(&server).load().await.unwrap_err();
    assert!(err.is_login_required());
}

#[tokio::test]
async fn test_session_cookie_authenticates() {
    let server = MockCartServer::start(&test_catalog()).await;
    server.require_login(true);

    let mut config = remote_config(server.base_url());
    config.session_cookie = Some(SESSION_COOKIE.to_string().into());
    let adapter = RemoteCartAdapter::new(&config).unwrap();

    let snapshot = adapter.add(&ItemId::from("b"), 1).await.unwrap();
    assert_eq!(snapshot.item_count(), 1);
}

#[tokio::test]
async fn test_malformed_responses_are_errors() {
    let server = MockCartServer::start(&test_catalog()).await;
    let adapter = adapter(&server);
    adapter.load().await.unwrap();

    server.fail_next(Fault::Garbage);
    assert!(matches!(adapter.load().await, Err(CartError::Malformed(_))));

    server.fail_next(Fault::MissingItems);
    assert!(matches!(adapter.load().await, Err(CartError::Malformed(_))));

    server.fail_next(Fault::WrongSubtotal);
    assert!(matches!(
        adapter.add(&ItemId::from("a"), 1).await,
        Err(CartError::Malformed(_))
    ));

    server.fail_next(Fault::ServerError);
    assert!(matches!(
        adapter.load().await,
        Err(CartError::Status { status: 500, .. })
    ));
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let base_url = {
        let server = MockCartServer::start(&test_catalog()).await;
        server.base_url()
    };
    // Give the aborted server task a moment to release the port.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = RemoteCartAdapter::new(&remote_config(base_url))
        .unwrap()
        .load()
        .await
        .unwrap_err();

    assert!(err.is_transport());
}

// =============================================================================
// Dispatcher
// =============================================================================

#[tokio::test]
async fn test_dispatch_updates_every_surface() {
    let server = MockCartServer::start(&test_catalog()).await;
    let (dispatcher, toasts) = dispatcher(adapter(&server));
    let document = Arc::new(Document::with_all_surfaces());
    bind_surfaces(dispatcher.store(), &document, dispatcher.pending());

    let event = add("a").with_data(ATTR_QUANTITY, "2");
    assert!(dispatcher.dispatch(&event).await.is_updated());
    assert!(dispatcher.dispatch(&add("b")).await.is_updated());

    assert!(document.html(Surface::Badge).unwrap().contains(">3</span>"));
    assert!(document.html(Surface::Totals).unwrap().contains("$25.00"));
    assert!(document.html(Surface::CartTable).unwrap().contains("Cleaning kit"));
    assert_eq!(toasts.drain().len(), 2);

    dispatcher.dispatch(&on_item("remove", "b")).await;
    dispatcher.dispatch(&on_item("remove", "a")).await;

    assert_eq!(document.shows_empty_state(Surface::CartTable), Some(true));
    assert_eq!(document.shows_empty_state(Surface::MiniCart), Some(true));
    assert!(document.html(Surface::Badge).unwrap().contains("is-hidden"));
}

#[tokio::test]
async fn test_unauthenticated_add_redirects_without_mutation() {
    let server = MockCartServer::start(&test_catalog()).await;
    server.require_login(true);
    let (dispatcher, toasts) = dispatcher(adapter(&server));

    let outcome = dispatcher.dispatch(&add("a")).await;

    assert_eq!(outcome.redirect(), Some("/accounts/login/?next=/cart/"));
    assert!(dispatcher.store().get_snapshot().is_empty());
    assert_eq!(dispatcher.store().version(), 0);
    assert!(toasts.is_empty());
    assert!(server.lines().is_empty());
}

#[tokio::test]
async fn test_failed_call_keeps_snapshot_with_one_error_toast() {
    let server = MockCartServer::start(&test_catalog()).await;
    let (dispatcher, toasts) = dispatcher(adapter(&server));
    dispatcher.dispatch(&add("a")).await;
    let before = dispatcher.store().get_snapshot();
    toasts.drain();

    server.fail_next(Fault::ServerError);
    let outcome = dispatcher.dispatch(&on_item("increase", "a")).await;

    assert!(matches!(outcome, DispatchOutcome::Failed(ref e) if e.is_transport()));
    assert_eq!(dispatcher.store().get_snapshot(), before);
    let shown = toasts.drain();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].kind, ToastKind::Error);
    assert!(!dispatcher.pending().is_pending(&ItemId::from("a")));
}

#[tokio::test]
async fn test_rapid_clicks_on_one_item_are_not_lost() {
    let server = MockCartServer::start(&test_catalog()).await;
    let (dispatcher, _) = dispatcher(adapter(&server));
    dispatcher.dispatch(&add("a")).await;

    let inc = on_item("increase", "a");
    let (first, second, third) = tokio::join!(
        dispatcher.dispatch(&inc),
        dispatcher.dispatch(&inc),
        dispatcher.dispatch(&inc)
    );

    assert!(first.is_updated() && second.is_updated() && third.is_updated());
    let snapshot = dispatcher.store().get_snapshot();
    assert_eq!(snapshot.line(&ItemId::from("a")).unwrap().quantity, 4);
    assert_eq!(server.lines()[0].quantity, 4);
}
