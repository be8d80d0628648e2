//! Omahring Core - Shared domain library.
//!
//! This crate provides the types and rules used across all Omahring components:
//! - `storefront` - JSON REST API consumed by the storefront SPA
//! - `cli` - Command-line tools for migrations and management
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Everything that decides *what* should happen to a
//! cart, an order or a promo lives here; the storefront only loads and stores.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money, emails, and statuses
//! - [`cart`] - Cart totals and guest-cart merge planning
//! - [`order`] - Joint order/payment state machine
//! - [`payment`] - Payment gateway references, notifications and token freshness
//! - [`promo`] - Promo code eligibility and discount calculation

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod order;
pub mod payment;
pub mod promo;
pub mod types;

pub use types::*;
