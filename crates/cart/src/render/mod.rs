//! UI binders: one typed template per cart surface.
//!
//! Each binder is a pure function from a [`CartSnapshot`] (plus the set of
//! items with a request in flight) to a [`SurfacePatch`]. Surfaces are
//! re-rendered in full on every store notification.
//!
//! | Surface | Template |
//! |---------|----------|
//! | navbar badge | `cart/badge.html` |
//! | mini-cart dropdown | `cart/mini_cart.html` |
//! | cart page table | `cart/table.html` |
//! | totals / checkout summary | `cart/totals.html` |

use std::collections::HashSet;

use askama::Template;
use repairbay_core::{CartLineItem, CartSnapshot, ItemId};

mod document;

pub use document::{Document, bind_surfaces};

/// A region of the page that shows cart state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    Badge,
    MiniCart,
    CartTable,
    Totals,
}

impl Surface {
    pub const ALL: [Self; 4] = [Self::Badge, Self::MiniCart, Self::CartTable, Self::Totals];

    /// DOM id of the surface's container element.
    #[must_use]
    pub const fn container_id(&self) -> &'static str {
        match self {
            Self::Badge => "cart-count",
            Self::MiniCart => "mini-cart",
            Self::CartTable => "cart-table",
            Self::Totals => "cart-totals",
        }
    }
}

/// Replacement markup for one surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfacePatch {
    pub surface: Surface,
    pub html: String,
    /// Whether the surface's empty-state container should be visible.
    pub show_empty_state: bool,
}

// =============================================================================
// View Models
// =============================================================================

/// Cart line display data for templates.
#[derive(Clone)]
pub struct CartItemView {
    pub id: String,
    pub name: String,
    pub category: String,
    pub image: String,
    pub quantity: u32,
    pub price: String,
    pub line_price: String,
    /// A request for this line is in flight; its controls are disabled.
    pub pending: bool,
}

/// Cart display data for templates.
#[derive(Clone)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub item_count: u32,
    pub is_empty: bool,
    pub subtotal: String,
    pub tax: String,
    pub service_fee: String,
    pub total: String,
    pub show_tax: bool,
    pub show_service_fee: bool,
}

impl CartView {
    /// Build the view for `snapshot`, marking lines in `pending`.
    #[must_use]
    pub fn new(snapshot: &CartSnapshot, pending: &HashSet<ItemId>) -> Self {
        let totals = &snapshot.totals;
        Self {
            items: snapshot
                .items
                .iter()
                .map(|line| CartItemView::new(snapshot, line, pending.contains(&line.id)))
                .collect(),
            item_count: snapshot.item_count(),
            is_empty: snapshot.is_empty(),
            subtotal: snapshot.money(totals.subtotal).to_string(),
            tax: snapshot.money(totals.tax).to_string(),
            service_fee: snapshot.money(totals.service_fee).to_string(),
            total: snapshot.money(totals.total).to_string(),
            show_tax: !totals.tax.is_zero(),
            show_service_fee: !totals.service_fee.is_zero(),
        }
    }
}

impl CartItemView {
    fn new(snapshot: &CartSnapshot, line: &CartLineItem, pending: bool) -> Self {
        Self {
            id: line.id.to_string(),
            name: line.name.clone(),
            category: line.category.clone().unwrap_or_default(),
            image: line.image.clone().unwrap_or_default(),
            quantity: line.quantity,
            price: snapshot.money(line.unit_price).to_string(),
            line_price: snapshot.money(line.line_total()).to_string(),
            pending,
        }
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Navbar cart count badge.
#[derive(Template)]
#[template(path = "cart/badge.html")]
pub struct BadgeTemplate {
    pub count: u32,
}

/// Mini-cart dropdown.
#[derive(Template)]
#[template(path = "cart/mini_cart.html")]
pub struct MiniCartTemplate {
    pub cart: CartView,
}

/// Full cart page table.
#[derive(Template)]
#[template(path = "cart/table.html")]
pub struct CartTableTemplate {
    pub cart: CartView,
}

/// Totals block, shared by the cart page and the checkout summary.
#[derive(Template)]
#[template(path = "cart/totals.html")]
pub struct TotalsTemplate {
    pub cart: CartView,
}

// =============================================================================
// Binders
// =============================================================================

/// Render the badge.
///
/// # Errors
///
/// Returns the template error if rendering fails.
pub fn render_badge(snapshot: &CartSnapshot) -> askama::Result<SurfacePatch> {
    let count = snapshot.item_count();
    Ok(SurfacePatch {
        surface: Surface::Badge,
        html: BadgeTemplate { count }.render()?,
        show_empty_state: count == 0,
    })
}

/// Render the mini-cart dropdown.
///
/// # Errors
///
/// Returns the template error if rendering fails.
pub fn render_mini_cart(
    snapshot: &CartSnapshot,
    pending: &HashSet<ItemId>,
) -> askama::Result<SurfacePatch> {
    let cart = CartView::new(snapshot, pending);
    let show_empty_state = cart.is_empty;
    Ok(SurfacePatch {
        surface: Surface::MiniCart,
        html: MiniCartTemplate { cart }.render()?,
        show_empty_state,
    })
}

/// Render the cart page table.
///
/// # Errors
///
/// Returns the template error if rendering fails.
pub fn render_cart_table(
    snapshot: &CartSnapshot,
    pending: &HashSet<ItemId>,
) -> askama::Result<SurfacePatch> {
    let cart = CartView::new(snapshot, pending);
    let show_empty_state = cart.is_empty;
    Ok(SurfacePatch {
        surface: Surface::CartTable,
        html: CartTableTemplate { cart }.render()?,
        show_empty_state,
    })
}

/// Render the totals block.
///
/// # Errors
///
/// Returns the template error if rendering fails.
pub fn render_totals(snapshot: &CartSnapshot) -> askama::Result<SurfacePatch> {
    let cart = CartView::new(snapshot, &HashSet::new());
    let show_empty_state = cart.is_empty;
    Ok(SurfacePatch {
        surface: Surface::Totals,
        html: TotalsTemplate { cart }.render()?,
        show_empty_state,
    })
}

/// Render any surface.
///
/// # Errors
///
/// Returns the template error if rendering fails.
pub fn render_surface(
    surface: Surface,
    snapshot: &CartSnapshot,
    pending: &HashSet<ItemId>,
) -> askama::Result<SurfacePatch> {
    match surface {
        Surface::Badge => render_badge(snapshot),
        Surface::MiniCart => render_mini_cart(snapshot, pending),
        Surface::CartTable => render_cart_table(snapshot, pending),
        Surface::Totals => render_totals(snapshot),
    }
}
