//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! omahring migrate
//! ```
//!
//! Applies `crates/storefront/migrations/` and then creates the session
//! table used by `tower-sessions`. The server never migrates on startup.

use tower_sessions_sqlx_store::PostgresStore;

use super::{ConnectError, connect};

/// Errors that can occur while migrating.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run storefront schema and session store migrations.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), MigrationError> {
    let pool = connect().await?;

    tracing::info!("Running storefront migrations...");
    sqlx::migrate!("../storefront/migrations").run(&pool).await?;

    tracing::info!("Creating session store table...");
    PostgresStore::new(pool).migrate().await?;

    tracing::info!("Migrations complete");
    Ok(())
}
