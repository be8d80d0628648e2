//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::services::midtrans::{MidtransClient, MidtransError};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    midtrans: MidtransClient,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the Midtrans HTTP client cannot be built.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, MidtransError> {
        let midtrans = MidtransClient::new(&config.midtrans)?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                midtrans,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the Midtrans Snap client.
    #[must_use]
    pub fn midtrans(&self) -> &MidtransClient {
        &self.inner.midtrans
    }
}
