//! Checkout and order history (local backend).
//!
//! # Usage
//!
//! ```bash
//! rb-cart checkout -n "Ada Lovelace" -e ada@example.com -p "+1 555 010 0199" --notes "iPhone 13, cracked screen"
//! rb-cart orders
//! ```

use repairbay_cart::CartError;
use repairbay_core::{CheckoutDetails, PaymentMethod, Price};

use super::{CartSession, CommandError};

/// Raw checkout form input.
pub struct CheckoutForm<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
    pub payment: &'a str,
    pub notes: Option<&'a str>,
}

/// Validate the form and place an order from the current cart.
///
/// # Errors
///
/// Returns an error for invalid details, an empty cart, or a backend that
/// does not take orders.
pub async fn place(session: &CartSession, form: &CheckoutForm<'_>) -> Result<(), CommandError> {
    let payment: PaymentMethod = form.payment.parse()?;
    let details = CheckoutDetails::new(form.name, form.email, form.phone, payment, form.notes)?;

    let result = session.dispatcher.checkout(&details).await;
    session.flush_toasts();
    let order = match result {
        Ok(order) => order,
        Err(CartError::LoginRequired) => {
            return Err(CommandError::LoginRequired(
                session.dispatcher.login_url().to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    };

    #[allow(clippy::print_stdout)]
    {
        println!(
            "Order {} placed: {} item(s), total {}",
            order.id.reference(),
            order.item_count(),
            Price::new(order.totals.total, order.currency)
        );
    }
    Ok(())
}

/// Print past orders, newest first.
///
/// # Errors
///
/// Returns an error if the backend keeps no order history.
pub async fn list(session: &CartSession) -> Result<(), CommandError> {
    let orders = session.adapter.orders().await?;
    #[allow(clippy::print_stdout)]
    {
        if orders.is_empty() {
            println!("No orders yet");
        }
        for order in &orders {
            println!(
                "{}  {}  {}  {} item(s)  {}  {}",
                order.id.reference(),
                order.placed_at.format("%Y-%m-%d %H:%M"),
                order.status.as_str(),
                order.item_count(),
                Price::new(order.totals.total, order.currency),
                order.customer.name
            );
        }
    }
    Ok(())
}
