//! RepairBay cart state synchronization.
//!
//! Keeps every cart surface on a page (navbar badge, mini-cart dropdown,
//! cart table, totals block) consistent with one confirmed cart state.
//!
//! # Architecture
//!
//! ```text
//! ActionEvent -> CartDispatcher -> StorageAdapter -> CartStore -> binders -> Document
//!                     |                                  ^
//!                     +-- toast / login redirect         +-- init / teardown
//! ```
//!
//! - [`adapter`] - Remote (HTTP) and local (key-value storage) backends
//! - [`store`] - The single owner of the in-memory snapshot
//! - [`render`] - Per-surface askama binders
//! - [`dispatch`] - Delegated click handling and per-item serialization
//! - [`notify`] - Toasts

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod adapter;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod notify;
pub mod render;
pub mod storage;
pub mod store;

pub use adapter::{LocalCartAdapter, RemoteCartAdapter, StorageAdapter};
pub use catalog::Catalog;
pub use config::{Backend, CartConfig, ConfigError, LocalConfig, RemoteConfig};
pub use dispatch::{ActionEvent, CartAction, CartDispatcher, DispatchOutcome, PendingItems};
pub use error::{CartError, Result};
pub use notify::{LogToaster, Toast, ToastKind, ToastQueue, Toaster};
pub use render::{Document, Surface, SurfacePatch, bind_surfaces};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use store::{CartStore, SubscriptionId};
