//! The page-side target of surface patches.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::error;

use super::{Surface, SurfacePatch, render_surface};
use crate::dispatch::PendingItems;
use crate::store::{CartStore, SubscriptionId};

/// Latest rendered markup for each mounted surface.
///
/// Only surfaces passed to [`Document::mount`] (or [`bind_surfaces`]) are
/// patched; a page without a cart table simply never mounts one.
#[derive(Debug, Default)]
pub struct Document {
    surfaces: Mutex<HashMap<Surface, Option<SurfacePatch>>>,
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A document with every surface mounted.
    #[must_use]
    pub fn with_all_surfaces() -> Self {
        let document = Self::new();
        for surface in Surface::ALL {
            document.mount(surface);
        }
        document
    }

    /// Declare that the page contains `surface`.
    pub fn mount(&self, surface: Surface) {
        self.lock().entry(surface).or_insert(None);
    }

    #[must_use]
    pub fn is_mounted(&self, surface: Surface) -> bool {
        self.lock().contains_key(&surface)
    }

    /// Mounted surfaces, in [`Surface::ALL`] order.
    #[must_use]
    pub fn mounted(&self) -> Vec<Surface> {
        let surfaces = self.lock();
        Surface::ALL
            .into_iter()
            .filter(|surface| surfaces.contains_key(surface))
            .collect()
    }

    /// Replace a mounted surface's markup. Patches for unmounted surfaces
    /// are dropped.
    pub fn apply(&self, patch: SurfacePatch) -> bool {
        match self.lock().get_mut(&patch.surface) {
            Some(slot) => {
                *slot = Some(patch);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn patch(&self, surface: Surface) -> Option<SurfacePatch> {
        self.lock().get(&surface).cloned().flatten()
    }

    #[must_use]
    pub fn html(&self, surface: Surface) -> Option<String> {
        self.patch(surface).map(|patch| patch.html)
    }

    /// Whether the surface currently shows its empty state.
    #[must_use]
    pub fn shows_empty_state(&self, surface: Surface) -> Option<bool> {
        self.patch(surface).map(|patch| patch.show_empty_state)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Surface, Option<SurfacePatch>>> {
        self.surfaces.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Subscribe one binder per mounted surface and render the current state.
///
/// Render failures are logged and leave the surface's previous markup in
/// place.
pub fn bind_surfaces(
    store: &CartStore,
    document: &Arc<Document>,
    pending: &PendingItems,
) -> Vec<SubscriptionId> {
    let ids = document
        .mounted()
        .into_iter()
        .map(|surface| {
            let document = Arc::clone(document);
            let pending = pending.clone();
            store.subscribe(move |snapshot| {
                match render_surface(surface, snapshot, &pending.ids()) {
                    Ok(patch) => {
                        document.apply(patch);
                    }
                    Err(e) => {
                        error!(surface = surface.container_id(), error = %e, "Failed to render cart surface");
                    }
                }
            })
        })
        .collect();
    store.notify();
    ids
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use repairbay_core::{CartLineItem, CartSnapshot, CurrencyCode, ItemId, PricingPolicy};
    use rust_decimal::Decimal;

    use super::*;

    fn one_line(quantity: u32) -> CartSnapshot {
        CartSnapshot::priced(
            vec![CartLineItem {
                id: ItemId::from(7),
                name: "Screen repair".to_string(),
                unit_price: Decimal::from(80),
                quantity,
                category: None,
                image: None,
            }],
            CurrencyCode::USD,
            &PricingPolicy::default(),
        )
    }

    #[test]
    fn test_bind_renders_immediately() {
        let store = CartStore::new(CurrencyCode::USD);
        let document = Arc::new(Document::with_all_surfaces());
        let ids = bind_surfaces(&store, &document, &PendingItems::new());

        assert_eq!(ids.len(), 4);
        for surface in Surface::ALL {
            assert_eq!(document.shows_empty_state(surface), Some(true));
        }
    }

    #[test]
    fn test_every_surface_follows_store() {
        let store = CartStore::new(CurrencyCode::USD);
        let document = Arc::new(Document::with_all_surfaces());
        bind_surfaces(&store, &document, &PendingItems::new());

        store.apply_confirmed(one_line(2));

        assert!(document.html(Surface::Badge).unwrap().contains(">2</span>"));
        assert!(document.html(Surface::MiniCart).unwrap().contains("$160.00"));
        assert!(document.html(Surface::CartTable).unwrap().contains("data-quantity=\"2\""));
        assert!(document.html(Surface::Totals).unwrap().contains("$188.60"));
        for surface in Surface::ALL {
            assert_eq!(document.shows_empty_state(surface), Some(false));
        }
    }

    #[test]
    fn test_unmounted_surfaces_are_skipped() {
        let store = CartStore::new(CurrencyCode::USD);
        let document = Arc::new(Document::new());
        document.mount(Surface::Badge);
        let ids = bind_surfaces(&store, &document, &PendingItems::new());

        assert_eq!(ids.len(), 1);
        assert!(document.html(Surface::CartTable).is_none());
        assert!(!document.is_mounted(Surface::Totals));
    }
}
