//! Server-session cart backend.
//!
//! Talks to the storefront's cart endpoints:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | load | `GET /orders/api/cart/` |
//! | add | `POST /orders/api/add/{productId}/` (`quantity`) |
//! | remove | `POST /orders/api/remove/{itemId}/` |
//! | update | `POST /orders/api/update/{itemId}/` (`action=increase\|decrease`) |
//!
//! Every POST carries the CSRF token from the cookie jar in `X-CSRFToken`.
//! A `403 {"error":"login_required"}` becomes [`CartError::LoginRequired`].
//! The server is the authority for subtotal, tax, fee and total; responses
//! whose numbers disagree with their own line items are rejected as
//! malformed rather than patched up.

use std::sync::Arc;

use async_trait::async_trait;
use repairbay_core::{
    CartLineItem, CartSnapshot, CartTotals, CurrencyCode, ItemId, QuantityChange,
};
use reqwest::StatusCode;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{ACCEPT, REFERER};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use super::StorageAdapter;
use crate::config::RemoteConfig;
use crate::error::{CartError, Result};

/// Header carrying the CSRF token on POST requests.
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Error code the server uses for unauthenticated cart access.
const LOGIN_REQUIRED: &str = "login_required";

/// Longest response body excerpt kept in errors and logs.
const BODY_EXCERPT_CHARS: usize = 200;

// =============================================================================
// Wire Types
// =============================================================================

/// JSON body returned by every cart endpoint.
#[derive(Debug, Deserialize)]
struct CartResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    cart_count: Option<u32>,
    #[serde(default)]
    cart_subtotal: Option<Decimal>,
    #[serde(default)]
    cart_total: Option<Decimal>,
    #[serde(default)]
    cart_tax: Option<Decimal>,
    #[serde(default)]
    cart_service_fee: Option<Decimal>,
    #[serde(default)]
    items: Option<Vec<CartLineItem>>,
    #[serde(default)]
    mini_cart_html: Option<String>,
    #[serde(default)]
    cart_html: Option<String>,
}

/// Error body of a non-success response.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

impl CartResponse {
    /// Turn the response into a snapshot, checking it is self-consistent.
    fn into_snapshot(self, currency: CurrencyCode) -> Result<CartSnapshot> {
        if self.success == Some(false) {
            return Err(CartError::Rejected(
                self.message
                    .or(self.error)
                    .unwrap_or_else(|| "Request failed".to_string()),
            ));
        }

        debug!(
            has_mini_cart_html = self.mini_cart_html.is_some(),
            has_cart_html = self.cart_html.is_some(),
            message = self.message.as_deref().unwrap_or(""),
            "Cart API response"
        );

        let items = self
            .items
            .ok_or_else(|| CartError::Malformed("response has no items".to_string()))?;
        let subtotal = self
            .cart_subtotal
            .ok_or_else(|| CartError::Malformed("response has no cart_subtotal".to_string()))?;
        let total = self
            .cart_total
            .ok_or_else(|| CartError::Malformed("response has no cart_total".to_string()))?;
        let tax = self.cart_tax.unwrap_or(Decimal::ZERO);
        let service_fee = self.cart_service_fee.unwrap_or(total - subtotal - tax);

        if subtotal + tax + service_fee != total {
            return Err(CartError::Malformed(format!(
                "cart_total {total} != subtotal {subtotal} + tax {tax} + fee {service_fee}"
            )));
        }
        if (tax.is_sign_negative() && !tax.is_zero())
            || (service_fee.is_sign_negative() && !service_fee.is_zero())
        {
            return Err(CartError::Malformed("negative tax or service fee".to_string()));
        }
        if items.is_empty() && !total.is_zero() {
            return Err(CartError::Malformed(format!("empty cart with total {total}")));
        }

        let snapshot = CartSnapshot {
            items,
            currency,
            totals: CartTotals {
                subtotal,
                tax,
                service_fee,
                total,
            },
        };
        snapshot.check_invariants().map_err(CartError::Malformed)?;

        if let Some(count) = self.cart_count
            && count != snapshot.item_count()
        {
            return Err(CartError::Malformed(format!(
                "cart_count {count} != {} units in items",
                snapshot.item_count()
            )));
        }

        Ok(snapshot)
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}

// =============================================================================
// RemoteCartAdapter
// =============================================================================

/// Cart stored in the server session.
///
/// Cheaply cloneable via `Arc`; clones share the cookie jar and connection
/// pool.
#[derive(Clone)]
pub struct RemoteCartAdapter {
    inner: Arc<RemoteCartAdapterInner>,
    currency: CurrencyCode,
}

struct RemoteCartAdapterInner {
    client: reqwest::Client,
    jar: Arc<Jar>,
    base_url: Url,
    csrf_cookie_name: String,
}

impl RemoteCartAdapter {
    /// Create a client for the cart API described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Unsupported` if the base URL cannot carry paths
    /// and `CartError::Network` if the HTTP client cannot be built.
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        if config.base_url.cannot_be_a_base() {
            return Err(CartError::Unsupported("cart API base URL without a path"));
        }

        let jar = Arc::new(Jar::default());
        if let Some(cookie) = &config.session_cookie {
            jar.add_cookie_str(&format!("{}; Path=/", cookie.expose_secret()), &config.base_url);
        }

        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(RemoteCartAdapterInner {
                client,
                jar,
                base_url: config.base_url.clone(),
                csrf_cookie_name: config.csrf_cookie_name.clone(),
            }),
            currency: CurrencyCode::default(),
        })
    }

    /// Currency used to label server amounts.
    #[must_use]
    pub fn with_currency(mut self, currency: CurrencyCode) -> Self {
        self.currency = currency;
        self
    }

    /// Build `{base}/orders/api/{segments...}/`.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.inner.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["orders", "api"])
                .extend(segments)
                .push("");
        }
        url
    }

    /// CSRF token currently held in the cookie jar.
    fn csrf_from_jar(&self) -> Option<String> {
        let header = self.inner.jar.cookies(&self.inner.base_url)?;
        let cookies = header.to_str().ok()?;
        cookies.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == self.inner.csrf_cookie_name).then(|| value.to_string())
        })
    }

    /// CSRF token, fetching the cart once to obtain the cookie if needed.
    async fn csrf_token(&self) -> Result<Option<String>> {
        if let Some(token) = self.csrf_from_jar() {
            return Ok(Some(token));
        }
        debug!("No CSRF cookie yet, priming from cart endpoint");
        self.inner
            .client
            .get(self.endpoint(&["cart"]))
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let token = self.csrf_from_jar();
        if token.is_none() {
            warn!(
                cookie = %self.inner.csrf_cookie_name,
                "Server did not set a CSRF cookie; sending request without token"
            );
        }
        Ok(token)
    }

    async fn post(&self, url: Url, form: &[(&str, String)]) -> Result<CartSnapshot> {
        let mut request = self
            .inner
            .client
            .post(url)
            .header(ACCEPT, "application/json")
            .header(REFERER, self.inner.base_url.as_str())
            .header("X-Requested-With", "XMLHttpRequest")
            .form(form);
        if let Some(token) = self.csrf_token().await? {
            request = request.header(CSRF_HEADER, token);
        }
        self.execute(request).await
    }

    /// Send a request and materialize the snapshot from its response.
    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<CartSnapshot> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if matches!(status, StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED)
            && serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .is_some_and(|code| code == LOGIN_REQUIRED)
        {
            return Err(CartError::LoginRequired);
        }

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %excerpt(&body),
                "Cart API returned non-success status"
            );
            return Err(CartError::Status {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        let parsed: CartResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = %e, body = %excerpt(&body), "Failed to parse cart response");
            CartError::Malformed(e.to_string())
        })?;
        parsed.into_snapshot(self.currency)
    }
}

#[async_trait]
impl StorageAdapter for RemoteCartAdapter {
    fn name(&self) -> &'static str {
        "remote"
    }

    #[instrument(skip(self))]
    async fn load(&self) -> Result<CartSnapshot> {
        let request = self
            .inner
            .client
            .get(self.endpoint(&["cart"]))
            .header(ACCEPT, "application/json");
        self.execute(request).await
    }

    #[instrument(skip(self), fields(item_id = %item_id))]
    async fn add(&self, item_id: &ItemId, quantity: u32) -> Result<CartSnapshot> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity(quantity));
        }
        let url = self.endpoint(&["add", item_id.as_str()]);
        self.post(url, &[("quantity", quantity.to_string())]).await
    }

    #[instrument(skip(self), fields(item_id = %item_id))]
    async fn remove(&self, item_id: &ItemId) -> Result<CartSnapshot> {
        let url = self.endpoint(&["remove", item_id.as_str()]);
        self.post(url, &[]).await
    }

    #[instrument(skip(self), fields(item_id = %item_id, change = change.as_action()))]
    async fn update_quantity(
        &self,
        item_id: &ItemId,
        change: QuantityChange,
    ) -> Result<CartSnapshot> {
        let url = self.endpoint(&["update", item_id.as_str()]);
        self.post(url, &[("action", change.as_action().to_string())])
            .await
    }

    /// The API has no bulk clear, so lines are removed one by one.
    #[instrument(skip(self))]
    async fn clear(&self) -> Result<CartSnapshot> {
        let mut snapshot = self.load().await?;
        let ids: Vec<ItemId> = snapshot.items.iter().map(|line| line.id.clone()).collect();
        for id in ids {
            snapshot = self.remove(&id).await?;
        }
        Ok(snapshot)
    }
}
