//! Shared wiring for cart commands.
//!
//! Every command opens a [`CartSession`]: the configured adapter, a store
//! initialized from it, the binders, and a dispatcher whose toasts are
//! collected and printed once the command finishes.

use std::sync::Arc;

use repairbay_cart::{
    Backend, CartConfig, CartDispatcher, CartError, CartStore, Catalog, ConfigError, Document,
    FileStorage, KeyValueStorage, LocalCartAdapter, RemoteCartAdapter, StorageAdapter, ToastKind,
    ToastQueue, Toaster, bind_surfaces,
};
use repairbay_core::CheckoutError;
use thiserror::Error;

pub mod cart;
pub mod checkout;

/// Products offered by the local backend.
const CATALOG_JSON: &str = include_str!("../../catalog.json");

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("Invalid checkout details: {0}")]
    Checkout(#[from] CheckoutError),

    /// The cart API wants an authenticated session.
    #[error("Login required: visit {0} and set CART_SESSION_COOKIE")]
    LoginRequired(String),

    /// The action failed; the toast has already been printed.
    #[error("{0}")]
    Failed(String),
}

/// Everything a command needs to act on the cart.
pub struct CartSession {
    pub dispatcher: CartDispatcher,
    pub adapter: Arc<dyn StorageAdapter>,
    pub document: Arc<Document>,
    pub catalog: Option<Catalog>,
    toasts: Arc<ToastQueue>,
}

impl CartSession {
    /// Build the adapter named by `config` and load the cart from it.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter cannot be constructed. A cart that
    /// fails to load starts empty.
    pub async fn open(config: &CartConfig) -> Result<Self, CommandError> {
        let (adapter, catalog): (Arc<dyn StorageAdapter>, Option<Catalog>) = match config.backend {
            Backend::Local => {
                let storage: Arc<dyn KeyValueStorage> =
                    Arc::new(FileStorage::new(config.local.storage_dir.clone()));
                let catalog = Catalog::from_json(CATALOG_JSON)?;
                let adapter = LocalCartAdapter::from_config(storage, catalog.clone(), &config.local);
                (Arc::new(adapter), Some(catalog))
            }
            Backend::Remote => {
                let remote = config
                    .remote
                    .as_ref()
                    .ok_or_else(|| ConfigError::MissingEnvVar("CART_API_BASE_URL".to_string()))?;
                let adapter = RemoteCartAdapter::new(remote)?.with_currency(config.local.currency);
                (Arc::new(adapter), None)
            }
        };

        tracing::debug!(backend = adapter.name(), "Opening cart session");
        let store = CartStore::init(adapter.as_ref(), config.local.currency).await;
        let toasts = Arc::new(ToastQueue::new());
        let dispatcher = CartDispatcher::new(
            Arc::clone(&adapter),
            store.clone(),
            Arc::clone(&toasts) as Arc<dyn Toaster>,
        )
        .with_login_url(config.login_url.clone());

        let document = Arc::new(Document::with_all_surfaces());
        bind_surfaces(&store, &document, dispatcher.pending());

        Ok(Self {
            dispatcher,
            adapter,
            document,
            catalog,
            toasts,
        })
    }

    #[must_use]
    pub fn store(&self) -> &CartStore {
        self.dispatcher.store()
    }

    /// Print queued toasts. Returns `true` if any of them was an error.
    pub fn flush_toasts(&self) -> bool {
        let mut failed = false;
        for toast in self.toasts.drain() {
            failed |= toast.kind == ToastKind::Error;
            #[allow(clippy::print_stderr)]
            {
                eprintln!("[{}] {}", toast.kind.css_class().trim_start_matches("toast--"), toast.message);
            }
        }
        failed
    }

    /// Drop the binders and flush any remaining toasts.
    pub fn close(self) {
        self.flush_toasts();
        self.store().teardown();
    }
}
