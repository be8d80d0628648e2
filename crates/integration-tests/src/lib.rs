//! Integration tests for Omahring.
//!
//! Tests in `tests/` exercise the public APIs of `omahring-core` and
//! `omahring-storefront` together. The Midtrans API is served by `wiremock`.
//! Router tests build the app over a lazy pool; `tests/database.rs` uses
//! `#[sqlx::test]` and needs `DATABASE_URL` pointing at a Postgres server it
//! may create databases on.
//!
//! Run with: `cargo test -p omahring-integration-tests`

use std::net::{IpAddr, Ipv4Addr};

use omahring_storefront::config::{MidtransConfig, StorefrontConfig};
use omahring_storefront::services::midtrans::{Notification, notification_signature};
use omahring_storefront::state::AppState;
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;

/// Sandbox server key shared by fixtures and signatures.
pub const SERVER_KEY: &str = "SB-Mid-server-Int3gr4tionK3y";

/// Origin the SPA is served from in fixtures.
pub const SPA_ORIGIN: &str = "http://localhost:5173";

/// Midtrans settings pointing at `snap_url`.
#[must_use]
pub fn midtrans_config(snap_url: &str) -> MidtransConfig {
    MidtransConfig {
        server_key: SecretString::from(SERVER_KEY),
        client_key: Some("SB-Mid-client-Int3gr4tion".to_string()),
        is_production: false,
        snap_url: snap_url.to_string(),
        finish_url: Some("https://omahring.id/pesanan".to_string()),
    }
}

/// A complete storefront configuration that never reaches real services.
#[must_use]
pub fn storefront_config(snap_url: &str) -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://localhost/omahring_test"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 5000,
        base_url: "http://localhost:5000".to_string(),
        cors_origin: Some(SPA_ORIGIN.to_string()),
        session_secret: SecretString::from("s".repeat(64)),
        midtrans: midtrans_config(snap_url),
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// Application state over a pool that only connects when a query runs.
///
/// # Panics
///
/// Panics if the fixture database URL or Midtrans settings are rejected.
#[must_use]
#[allow(clippy::expect_used)]
pub fn lazy_state(snap_url: &str) -> AppState {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/omahring_test")
        .expect("fixture database URL is valid");
    AppState::new(storefront_config(snap_url), pool).expect("fixture Midtrans config is valid")
}

/// A notification signed with [`SERVER_KEY`].
#[must_use]
pub fn signed_notification(
    order_id: &str,
    gross_amount: &str,
    transaction_status: &str,
    fraud_status: Option<&str>,
) -> Notification {
    let status_code = if transaction_status == "pending" { "201" } else { "200" };
    Notification {
        order_id: order_id.to_string(),
        status_code: status_code.to_string(),
        gross_amount: gross_amount.to_string(),
        signature_key: notification_signature(
            order_id,
            status_code,
            gross_amount,
            &SecretString::from(SERVER_KEY),
        ),
        transaction_status: transaction_status.to_string(),
        fraud_status: fraud_status.map(str::to_string),
        transaction_id: Some("9aed5972-5b6a-401e-894b-a32c91ed1a3a".to_string()),
        payment_type: Some("bank_transfer".to_string()),
    }
}

/// The JSON body Midtrans would post for `notification`.
#[must_use]
pub fn notification_json(notification: &Notification) -> serde_json::Value {
    serde_json::json!({
        "order_id": notification.order_id,
        "status_code": notification.status_code,
        "gross_amount": notification.gross_amount,
        "signature_key": notification.signature_key,
        "transaction_status": notification.transaction_status,
        "fraud_status": notification.fraud_status,
        "transaction_id": notification.transaction_id,
        "payment_type": notification.payment_type,
    })
}
