//! Cart inspection and mutation commands.
//!
//! # Usage
//!
//! ```bash
//! rb-cart products
//! rb-cart add screen-iphone-13 -q 2
//! rb-cart increase screen-iphone-13
//! rb-cart show
//! rb-cart show --html table
//! ```

use repairbay_cart::dispatch::{ATTR_ITEM_ID, ATTR_PRODUCT_ID, ATTR_QUANTITY};
use repairbay_cart::{ActionEvent, DispatchOutcome, Surface};
use repairbay_core::{CartSnapshot, Price};

use super::{CartSession, CommandError};

/// Print the current cart, or one surface's rendered markup.
pub fn show(session: &CartSession, html: Option<Surface>) {
    if let Some(surface) = html {
        let markup = session.document.html(surface).unwrap_or_default();
        #[allow(clippy::print_stdout)]
        {
            println!("{markup}");
        }
        return;
    }
    print_cart(&session.store().get_snapshot());
}

/// List the products the local backend can add.
pub fn products(session: &CartSession) {
    let Some(catalog) = &session.catalog else {
        tracing::warn!("The remote backend has no local product list");
        return;
    };
    let currency = session.store().get_snapshot().currency;
    #[allow(clippy::print_stdout)]
    {
        for product in catalog.iter() {
            println!(
                "{:<28} {:>10}  {}",
                product.id.as_str(),
                Price::new(product.price, currency).to_string(),
                product.name
            );
        }
    }
}

pub async fn add(session: &CartSession, product_id: &str, quantity: u32) -> Result<(), CommandError> {
    let event = ActionEvent::new("add")
        .with_data(ATTR_PRODUCT_ID, product_id)
        .with_data(ATTR_QUANTITY, quantity.to_string());
    dispatch(session, &event).await
}

/// `remove`, `increase` or `decrease` one line.
pub async fn item_action(session: &CartSession, action: &str, item_id: &str) -> Result<(), CommandError> {
    let event = ActionEvent::new(action).with_data(ATTR_ITEM_ID, item_id);
    dispatch(session, &event).await
}

pub async fn clear(session: &CartSession) -> Result<(), CommandError> {
    dispatch(session, &ActionEvent::new("clear")).await
}

async fn dispatch(session: &CartSession, event: &ActionEvent) -> Result<(), CommandError> {
    let outcome = session.dispatcher.dispatch(event).await;
    session.flush_toasts();
    match outcome {
        DispatchOutcome::Updated(snapshot) => {
            print_cart(&snapshot);
            Ok(())
        }
        DispatchOutcome::LoginRequired { redirect } => Err(CommandError::LoginRequired(redirect)),
        DispatchOutcome::Failed(e) => Err(CommandError::Failed(e.user_message())),
    }
}

fn print_cart(snapshot: &CartSnapshot) {
    #[allow(clippy::print_stdout)]
    {
        if snapshot.is_empty() {
            println!("Your cart is empty");
            return;
        }
        for line in &snapshot.items {
            println!(
                "{:<28} {:>3} x {:>10} = {:>10}  {}",
                line.id.as_str(),
                line.quantity,
                snapshot.money(line.unit_price).to_string(),
                snapshot.money(line.line_total()).to_string(),
                line.name
            );
        }
        let totals = &snapshot.totals;
        println!("{:>57}", format!("Subtotal {}", snapshot.money(totals.subtotal)));
        if !totals.tax.is_zero() {
            println!("{:>57}", format!("Tax {}", snapshot.money(totals.tax)));
        }
        if !totals.service_fee.is_zero() {
            println!("{:>57}", format!("Service fee {}", snapshot.money(totals.service_fee)));
        }
        println!("{:>57}", format!("Total {}", snapshot.money(totals.total)));
        println!("{} item(s)", snapshot.item_count());
    }
}
