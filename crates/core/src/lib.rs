//! RepairBay Core - Shared types library.
//!
//! This crate provides the types shared by every RepairBay cart component:
//! - `cart` - Storage adapters, cart store, binders and dispatchers
//! - `cli` - Command-line driver for the cart
//!
//! # Architecture
//!
//! The core crate contains only types and pure calculations - no I/O, no
//! HTTP clients, no storage access. This keeps it lightweight and allows it
//! to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Item IDs, money, cart snapshots, orders and contact details

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
