//! Unified cart error type with Sentry breadcrumbs.
//!
//! Every adapter and dispatcher operation returns `Result<T, CartError>`.
//! Nothing here is fatal: the dispatcher turns each variant into a redirect
//! or a toast and the store keeps its last confirmed snapshot.

use repairbay_core::{CheckoutError, ItemId};
use thiserror::Error;

/// Errors raised while reading or changing the cart.
#[derive(Debug, Error)]
pub enum CartError {
    /// The server requires an authenticated session for this action.
    #[error("Login required")]
    LoginRequired,

    /// Transport failure (connection refused, timeout, TLS, ...).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with an unexpected status code.
    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response could not be turned into a valid cart snapshot.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The server understood the request but refused it (`success: false`).
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Local storage could not be read or written.
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Stored cart data could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The product is not in the catalog.
    #[error("Unknown product: {0}")]
    UnknownProduct(ItemId),

    /// The line is not in the cart.
    #[error("Item not in cart: {0}")]
    NotInCart(ItemId),

    /// Quantity must be at least 1.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(u32),

    /// A UI event could not be mapped to a cart action.
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Checkout input failed validation.
    #[error("Invalid checkout details: {0}")]
    InvalidCheckout(#[from] CheckoutError),

    /// Checkout was attempted with nothing in the cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// The backend does not implement this operation.
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl CartError {
    #[must_use]
    pub const fn is_login_required(&self) -> bool {
        matches!(self, Self::LoginRequired)
    }

    /// Transport-level failures and malformed responses, which leave the
    /// cart in an unknown server-side state.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Status { .. } | Self::Malformed(_)
        )
    }

    /// Message safe to show in a toast.
    ///
    /// Don't expose internal error details to shoppers.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::LoginRequired => "Please log in to continue".to_string(),
            Self::Network(_) | Self::Status { .. } | Self::Malformed(_) => {
                "Could not reach the cart. Please try again".to_string()
            }
            Self::Storage(_) | Self::Serialization(_) => {
                "Could not save your cart on this device".to_string()
            }
            Self::Rejected(message) => message.clone(),
            Self::UnknownProduct(_) => "That item is no longer available".to_string(),
            Self::NotInCart(_) => "That item is no longer in your cart".to_string(),
            Self::InvalidQuantity(_) => "Quantity must be at least 1".to_string(),
            Self::InvalidCheckout(err) => err.to_string(),
            Self::EmptyCart => "Your cart is empty".to_string(),
            Self::InvalidAction(_) | Self::Unsupported(_) => "Something went wrong".to_string(),
        }
    }
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;

/// Add a breadcrumb for cart actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of cart
/// actions leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: &[(&str, &str)]) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    for (key, value) in data {
        breadcrumb.data.insert(
            (*key).to_string(),
            serde_json::Value::String((*value).to_string()),
        );
    }

    sentry::add_breadcrumb(breadcrumb);
}
