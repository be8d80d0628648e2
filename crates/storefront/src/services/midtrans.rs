//! Midtrans Snap API client and notification verification.
//!
//! Only the two calls the storefront needs are implemented: creating a Snap
//! transaction (which yields the token the SPA opens the payment popup with)
//! and checking the signature of HTTP notifications.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::MidtransConfig;

/// Snap transaction endpoint, relative to the Snap base URL.
const TRANSACTIONS_PATH: &str = "/snap/v1/transactions";

/// Longest item name Midtrans accepts.
const MAX_ITEM_NAME_LEN: usize = 50;

/// Errors that can occur when talking to Midtrans.
#[derive(Debug, Error)]
pub enum MidtransError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Midtrans rejected the request.
    #[error("API error: {status} - {}", .messages.join("; "))]
    Api { status: u16, messages: Vec<String> },

    /// Response body was not what we expected.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Client could not be configured.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// `transaction_details` of a Snap request.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionDetails {
    pub order_id: String,
    pub gross_amount: i64,
}

/// One entry of `item_details`. Prices are whole Rupiah.
#[derive(Debug, Clone, Serialize)]
pub struct ItemDetail {
    pub id: String,
    pub price: i64,
    pub quantity: u32,
    pub name: String,
}

impl ItemDetail {
    /// Build an item, truncating the name to what Midtrans accepts.
    #[must_use]
    pub fn new(id: impl Into<String>, price: i64, quantity: u32, name: &str) -> Self {
        Self {
            id: id.into(),
            price,
            quantity,
            name: name.chars().take(MAX_ITEM_NAME_LEN).collect(),
        }
    }
}

/// `customer_details.shipping_address`.
#[derive(Debug, Clone, Serialize)]
pub struct SnapAddress {
    pub first_name: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country_code: &'static str,
}

/// `customer_details` of a Snap request.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerDetails {
    pub first_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub shipping_address: SnapAddress,
}

#[derive(Debug, Clone, Serialize)]
struct Callbacks {
    finish: String,
}

/// Body of `POST /snap/v1/transactions`.
#[derive(Debug, Clone, Serialize)]
pub struct SnapRequest {
    pub transaction_details: TransactionDetails,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub item_details: Vec<ItemDetail>,
    pub customer_details: CustomerDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    callbacks: Option<Callbacks>,
}

impl SnapRequest {
    /// Build a request.
    ///
    /// Midtrans rejects requests whose items do not add up to the gross
    /// amount, so `item_details` is dropped when they would not.
    #[must_use]
    pub fn new(
        transaction_details: TransactionDetails,
        item_details: Vec<ItemDetail>,
        customer_details: CustomerDetails,
    ) -> Self {
        let items_total: i64 = item_details
            .iter()
            .map(|i| i.price.saturating_mul(i64::from(i.quantity)))
            .sum();
        let item_details = if items_total == transaction_details.gross_amount {
            item_details
        } else {
            Vec::new()
        };

        Self {
            transaction_details,
            item_details,
            customer_details,
            callbacks: None,
        }
    }
}

/// Successful Snap response.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapResponse {
    pub token: String,
    pub redirect_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error_messages: Vec<String>,
}

/// HTTP notification sent by Midtrans on every transaction status change.
///
/// Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub order_id: String,
    pub status_code: String,
    pub gross_amount: String,
    pub signature_key: String,
    pub transaction_status: String,
    #[serde(default)]
    pub fraud_status: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
}

/// Midtrans Snap API client.
#[derive(Clone)]
pub struct MidtransClient {
    client: reqwest::Client,
    snap_url: String,
    server_key: SecretString,
    finish_url: Option<String>,
}

impl std::fmt::Debug for MidtransClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidtransClient")
            .field("snap_url", &self.snap_url)
            .finish_non_exhaustive()
    }
}

impl MidtransClient {
    /// Create a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &MidtransConfig) -> Result<Self, MidtransError> {
        let mut headers = HeaderMap::new();

        // Basic auth with the server key as username and an empty password
        let credentials = BASE64.encode(format!("{}:", config.server_key.expose_secret()));
        let mut auth = HeaderValue::from_str(&format!("Basic {credentials}"))
            .map_err(|e| MidtransError::Config(format!("invalid server key: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            snap_url: config.snap_url.trim_end_matches('/').to_string(),
            server_key: config.server_key.clone(),
            finish_url: config.finish_url.clone(),
        })
    }

    /// Create a Snap transaction and return its token.
    ///
    /// # Errors
    ///
    /// Returns `MidtransError::Api` with the gateway's `error_messages` on a
    /// non-success status, or `MidtransError::Http` if the request fails.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.transaction_details.order_id))]
    pub async fn create_transaction(
        &self,
        request: &SnapRequest,
    ) -> Result<SnapResponse, MidtransError> {
        let url = format!("{}{TRANSACTIONS_PATH}", self.snap_url);

        let mut body = request.clone();
        if let Some(finish) = &self.finish_url {
            body.callbacks = Some(Callbacks {
                finish: finish.clone(),
            });
        }

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let messages = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.error_messages)
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| vec![text]);
            tracing::warn!(status = status.as_u16(), ?messages, "Snap transaction rejected");
            return Err(MidtransError::Api {
                status: status.as_u16(),
                messages,
            });
        }

        response
            .json::<SnapResponse>()
            .await
            .map_err(|e| MidtransError::Parse(e.to_string()))
    }

    /// Whether a notification was signed with our server key.
    #[must_use]
    pub fn verify_notification(&self, notification: &Notification) -> bool {
        let expected = notification_signature(
            &notification.order_id,
            &notification.status_code,
            &notification.gross_amount,
            &self.server_key,
        );
        let given = notification.signature_key.to_ascii_lowercase();
        expected.as_bytes().ct_eq(given.as_bytes()).into()
    }
}

/// `SHA512(order_id + status_code + gross_amount + server_key)` as lowercase hex.
#[must_use]
pub fn notification_signature(
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    server_key: &SecretString,
) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.expose_secret().as_bytes());

    hex::encode(hasher.finalize())
}
