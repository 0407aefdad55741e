//! Integration tests for the RepairBay cart.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p repairbay-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `remote_cart` - `RemoteCartAdapter` and the dispatcher against
//!   [`MockCartServer`], an in-process axum app speaking the cart API
//! - `local_cart` - `LocalCartAdapter` on file storage in a temp directory
//!
//! The mock server keeps one cart, requires the CSRF cookie it hands out on
//! `GET /orders/api/cart/`, and can be told to demand a login or to return
//! broken responses.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::{Path, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use repairbay_cart::Catalog;
use repairbay_cart::adapter::remote::CSRF_HEADER;
use repairbay_core::{CartLineItem, ItemId, Product, subtotal_of};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

/// CSRF token the mock server issues.
pub const CSRF_TOKEN: &str = "test-csrf-token";
/// Session cookie value the mock server accepts when login is required.
pub const SESSION_COOKIE: &str = "sessionid=valid-session";
/// Flat service fee the mock server charges on non-empty carts.
pub const SERVICE_FEE: Decimal = Decimal::from_parts(500, 0, 0, false, 2);

/// A broken response to return for the next request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `200` with a body that is not JSON.
    Garbage,
    /// `500` with an HTML error page.
    ServerError,
    /// `200` JSON without the `items` array.
    MissingItems,
    /// `200` JSON whose subtotal disagrees with its items.
    WrongSubtotal,
}

#[derive(Default)]
struct MockState {
    catalog: HashMap<ItemId, Product>,
    lines: Mutex<Vec<CartLineItem>>,
    require_login: AtomicBool,
    fault: Mutex<Option<Fault>>,
    posts: AtomicUsize,
    rejected_csrf: AtomicUsize,
}

impl MockState {
    fn lines(&self) -> MutexGuard<'_, Vec<CartLineItem>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_fault(&self) -> Option<Fault> {
        self.fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// In-process cart API on an ephemeral port.
pub struct MockCartServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockCartServer {
    /// Start a server selling the products in `catalog`.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn start(catalog: &Catalog) -> Self {
        let state = Arc::new(MockState {
            catalog: catalog.iter().map(|p| (p.id.clone(), p.clone())).collect(),
            ..MockState::default()
        });

        let app = Router::new()
            .route("/orders/api/cart/", get(show_cart))
            .route("/orders/api/add/{product_id}/", post(add_item))
            .route("/orders/api/remove/{item_id}/", post(remove_item))
            .route("/orders/api/update/{item_id}/", post(update_item))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock cart server");
        let addr = listener.local_addr().expect("mock server address");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    /// Base URL to configure the remote adapter with.
    ///
    /// # Panics
    ///
    /// Never in practice; the address always forms a valid URL.
    #[must_use]
    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}/", self.addr)).expect("mock server URL")
    }

    /// Demand [`SESSION_COOKIE`] on every request.
    pub fn require_login(&self, required: bool) {
        self.state.require_login.store(required, Ordering::SeqCst);
    }

    /// Break the next response.
    pub fn fail_next(&self, fault: Fault) {
        *self
            .state
            .fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(fault);
    }

    /// Lines currently in the server-side cart.
    #[must_use]
    pub fn lines(&self) -> Vec<CartLineItem> {
        self.state.lines().clone()
    }

    /// Number of POSTs that passed the CSRF check.
    #[must_use]
    pub fn accepted_posts(&self) -> usize {
        self.state.posts.load(Ordering::SeqCst)
    }

    /// Number of POSTs refused for a missing or wrong CSRF token.
    #[must_use]
    pub fn rejected_csrf(&self) -> usize {
        self.state.rejected_csrf.load(Ordering::SeqCst)
    }
}

impl Drop for MockCartServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Products used across the integration tests.
///
/// `a` costs 10.00 and `b` 5.00.
///
/// # Panics
///
/// Panics if the embedded JSON is invalid.
#[must_use]
pub fn test_catalog() -> Catalog {
    Catalog::from_json(
        r#"[
            {"id": "a", "name": "Screen protector", "price": "10.00", "category": "accessory"},
            {"id": "b", "name": "Cleaning kit", "price": "5.00", "category": "accessory"},
            {"id": 42, "name": "Battery replacement", "price": "69.00", "category": "battery"}
        ]"#,
    )
    .expect("test catalog")
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Debug, Deserialize)]
struct AddForm {
    quantity: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct UpdateForm {
    action: String,
}

async fn show_cart(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Some(denied) = check_login(&state, &headers) {
        return denied;
    }
    let body = cart_body(&state, "");
    (
        [(SET_COOKIE, format!("csrftoken={CSRF_TOKEN}; Path=/"))],
        body,
    )
        .into_response()
}

async fn add_item(
    State(state): State<Arc<MockState>>,
    Path(product_id): Path<String>,
    headers: HeaderMap,
    Form(form): Form<AddForm>,
) -> Response {
    if let Some(denied) = check_post(&state, &headers) {
        return denied;
    }
    let id = ItemId::from(product_id);
    let Some(product) = state.catalog.get(&id) else {
        return Json(json!({"success": false, "message": "Product not found"})).into_response();
    };
    let quantity = form.quantity.unwrap_or(1).max(1);
    {
        let mut lines = state.lines();
        match lines.iter_mut().find(|line| line.id == id) {
            Some(line) => line.quantity += quantity,
            None => lines.push(product.to_line(quantity)),
        }
    }
    cart_body(&state, "Added to cart")
}

async fn remove_item(
    State(state): State<Arc<MockState>>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Some(denied) = check_post(&state, &headers) {
        return denied;
    }
    let id = ItemId::from(item_id);
    state.lines().retain(|line| line.id != id);
    cart_body(&state, "Removed from cart")
}

async fn update_item(
    State(state): State<Arc<MockState>>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
    Form(form): Form<UpdateForm>,
) -> Response {
    if let Some(denied) = check_post(&state, &headers) {
        return denied;
    }
    let id = ItemId::from(item_id);
    {
        let mut lines = state.lines();
        let Some(pos) = lines.iter().position(|line| line.id == id) else {
            return Json(json!({"success": false, "message": "Item not in cart"})).into_response();
        };
        let quantity = lines.get(pos).map_or(0, |line| line.quantity);
        match form.action.as_str() {
            "increase" => {
                if let Some(line) = lines.get_mut(pos) {
                    line.quantity += 1;
                }
            }
            "decrease" if quantity > 1 => {
                if let Some(line) = lines.get_mut(pos) {
                    line.quantity -= 1;
                }
            }
            "decrease" => {
                lines.remove(pos);
            }
            _ => {
                return Json(json!({"success": false, "message": "Invalid action"}))
                    .into_response();
            }
        }
    }
    cart_body(&state, "Cart updated")
}

// =============================================================================
// Helpers
// =============================================================================

fn has_session(headers: &HeaderMap) -> bool {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .any(|pair| pair.trim() == SESSION_COOKIE)
}

fn check_login(state: &MockState, headers: &HeaderMap) -> Option<Response> {
    (state.require_login.load(Ordering::SeqCst) && !has_session(headers)).then(|| {
        (
            StatusCode::FORBIDDEN,
            Json(json!({"error": "login_required"})),
        )
            .into_response()
    })
}

fn check_post(state: &MockState, headers: &HeaderMap) -> Option<Response> {
    if let Some(denied) = check_login(state, headers) {
        return Some(denied);
    }
    let token = headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok());
    if token != Some(CSRF_TOKEN) {
        state.rejected_csrf.fetch_add(1, Ordering::SeqCst);
        return Some(
            (
                StatusCode::FORBIDDEN,
                Json(json!({"detail": "CSRF verification failed"})),
            )
                .into_response(),
        );
    }
    state.posts.fetch_add(1, Ordering::SeqCst);
    None
}

fn cart_body(state: &MockState, message: &str) -> Response {
    let lines = state.lines().clone();
    let subtotal = subtotal_of(&lines);
    let fee = if lines.is_empty() {
        Decimal::ZERO
    } else {
        SERVICE_FEE
    };
    let count: u32 = lines.iter().map(|line| line.quantity).sum();

    let mut body: Value = json!({
        "success": true,
        "message": message,
        "cart_count": count,
        "cart_subtotal": subtotal.to_string(),
        "cart_total": (subtotal + fee).to_string(),
        "items": lines,
        "mini_cart_html": "<div id=\"mini-cart\"></div>",
    });

    match state.take_fault() {
        None => Json(body).into_response(),
        Some(Fault::Garbage) => (StatusCode::OK, "<html>oops</html>").into_response(),
        Some(Fault::ServerError) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "<h1>Server Error (500)</h1>",
        )
            .into_response(),
        Some(Fault::MissingItems) => {
            if let Some(map) = body.as_object_mut() {
                map.remove("items");
            }
            Json(body).into_response()
        }
        Some(Fault::WrongSubtotal) => {
            if let Some(map) = body.as_object_mut() {
                map.insert(
                    "cart_subtotal".to_string(),
                    json!((subtotal + Decimal::ONE).to_string()),
                );
            }
            Json(body).into_response()
        }
    }
}
