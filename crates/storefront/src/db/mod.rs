//! Database operations for storefront `PostgreSQL`.
//!
//! # Schema: `storefront`
//!
//! ## Tables
//!
//! - `user` / `address` - Accounts and saved shipping addresses
//! - `product` / `product_variant` - Catalog
//! - `cart` / `cart_item` - User and guest-session carts
//! - `order` / `order_item` - Placed orders with line snapshots
//! - `promo` - Discount codes
//! - `post` - Blog posts
//!
//! Sessions live in the `tower_sessions` schema managed by
//! `tower-sessions-sqlx-store`.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p omahring-cli -- migrate
//! ```

pub mod addresses;
pub mod carts;
pub mod orders;
pub mod posts;
pub mod products;
pub mod promos;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use addresses::AddressRepository;
pub use carts::CartRepository;
pub use orders::OrderRepository;
pub use posts::PostRepository;
pub use products::ProductRepository;
pub use promos::PromoRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique-constraint violation to [`RepositoryError::Conflict`].
    pub(crate) fn unique(e: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return Self::Conflict(format!("{what} already exists"));
        }
        Self::Database(e)
    }
}

/// Convert a stored non-negative integer column to `u32`.
pub(crate) fn to_u32(value: i32, column: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative {column}: {value}")))
}

/// Convert a quantity to the `INTEGER` column type.
pub(crate) fn to_i32(value: u32, column: &str) -> Result<i32, RepositoryError> {
    i32::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("{column} out of range: {value}")))
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_conversions() {
        assert_eq!(to_u32(5, "stock").ok(), Some(5));
        assert!(matches!(
            to_u32(-1, "stock"),
            Err(RepositoryError::DataCorruption(_))
        ));
        assert!(to_i32(u32::MAX, "quantity").is_err());
    }
}
