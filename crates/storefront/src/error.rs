//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to Sentry
//! before responding to the client. All route handlers return
//! `Result<T, AppError>`; the body is always `{"message": "..."}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use omahring_core::cart::CartError;
use omahring_core::order::TransitionError;
use omahring_core::promo::PromoError;
use omahring_core::Price;

use crate::db::RepositoryError;
use crate::db::orders::OrderUpdateError;
use crate::services::auth::AuthError;
use crate::services::cart::CartServiceError;
use crate::services::checkout::CheckoutError;

/// Generic message for anything the client should not see details of.
const SERVER_ERROR_MESSAGE: &str = "Terjadi kesalahan pada server";

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartServiceError),

    /// Checkout or payment operation failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized")]
    Unauthorized,

    /// User lacks the required role.
    #[error("Forbidden")]
    Forbidden,

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request conflicts with current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<OrderUpdateError> for AppError {
    fn from(e: OrderUpdateError) -> Self {
        Self::Checkout(e.into())
    }
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        Self::Checkout(e.into())
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

impl AppError {
    /// HTTP status and client-facing message.
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::Database(err) => repository_response(err),
            Self::Auth(err) => auth_response(err),
            Self::Cart(CartServiceError::Rule(err)) => cart_response(err),
            Self::Cart(CartServiceError::Repository(err)) => repository_response(err),
            Self::Checkout(err) => checkout_response(err),
            Self::Session(_) | Self::Internal(_) => server_error(),
            Self::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} tidak ditemukan")),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Silakan login terlebih dahulu".to_string(),
            ),
            Self::Forbidden => (StatusCode::FORBIDDEN, "Akses ditolak".to_string()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Terlalu banyak permintaan, coba lagi nanti".to_string(),
            ),
        }
    }
}

fn server_error() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        SERVER_ERROR_MESSAGE.to_string(),
    )
}

fn repository_response(err: &RepositoryError) -> (StatusCode, String) {
    match err {
        RepositoryError::NotFound => (StatusCode::NOT_FOUND, "Data tidak ditemukan".to_string()),
        RepositoryError::Conflict(what) => (
            StatusCode::CONFLICT,
            format!("Data sudah digunakan ({what})"),
        ),
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => server_error(),
    }
}

fn auth_response(err: &AuthError) -> (StatusCode, String) {
    match err {
        AuthError::InvalidEmail(_) => (
            StatusCode::BAD_REQUEST,
            "Format email tidak valid".to_string(),
        ),
        AuthError::InvalidCredentials => (
            StatusCode::UNAUTHORIZED,
            "Email atau password salah".to_string(),
        ),
        AuthError::UserAlreadyExists => {
            (StatusCode::CONFLICT, "Email sudah terdaftar".to_string())
        }
        AuthError::WeakPassword(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        AuthError::InvalidName => (
            StatusCode::BAD_REQUEST,
            "Nama wajib diisi (maksimal 100 karakter)".to_string(),
        ),
        AuthError::Repository(err) => repository_response(err),
        AuthError::PasswordHash => server_error(),
    }
}

fn cart_response(err: &CartError) -> (StatusCode, String) {
    match err {
        CartError::InvalidQuantity => (StatusCode::BAD_REQUEST, "Jumlah minimal 1".to_string()),
        CartError::InsufficientStock { .. } => {
            (StatusCode::BAD_REQUEST, "Stok tidak mencukupi".to_string())
        }
        CartError::Unavailable => (StatusCode::NOT_FOUND, "Produk tidak ditemukan".to_string()),
        CartError::ItemNotFound => (
            StatusCode::NOT_FOUND,
            "Item keranjang tidak ditemukan".to_string(),
        ),
    }
}

fn promo_message(err: &PromoError) -> String {
    match err {
        PromoError::Inactive => "Promo tidak aktif".to_string(),
        PromoError::NotStarted => "Promo belum berlaku".to_string(),
        PromoError::Expired => "Promo sudah berakhir".to_string(),
        PromoError::UsageLimitReached => "Kuota promo sudah habis".to_string(),
        PromoError::BelowMinimum { minimum } => {
            format!("Minimal pembelian {}", Price::idr(*minimum).display())
        }
        PromoError::MembersOnly => "Promo khusus member".to_string(),
        PromoError::EmptyCart => "Keranjang kosong".to_string(),
    }
}

fn checkout_response(err: &CheckoutError) -> (StatusCode, String) {
    match err {
        CheckoutError::EmptyCart => (StatusCode::BAD_REQUEST, "Keranjang kosong".to_string()),
        CheckoutError::Unavailable { product } => (
            StatusCode::BAD_REQUEST,
            format!("Produk {product} tidak tersedia"),
        ),
        CheckoutError::InsufficientStock { product, available } => (
            StatusCode::BAD_REQUEST,
            format!("Stok tidak mencukupi untuk {product} (tersisa {available})"),
        ),
        CheckoutError::PromoNotFound => (
            StatusCode::NOT_FOUND,
            "Kode promo tidak ditemukan".to_string(),
        ),
        CheckoutError::Promo(err) => (StatusCode::BAD_REQUEST, promo_message(err)),
        CheckoutError::MissingAddress => (
            StatusCode::BAD_REQUEST,
            "Alamat pengiriman belum diisi".to_string(),
        ),
        CheckoutError::InvalidAddress(field) => (
            StatusCode::BAD_REQUEST,
            format!("Alamat pengiriman tidak lengkap: {field}"),
        ),
        CheckoutError::OrderNotFound => {
            (StatusCode::NOT_FOUND, "Pesanan tidak ditemukan".to_string())
        }
        CheckoutError::PaymentClosed => (
            StatusCode::CONFLICT,
            "Pesanan ini tidak dapat dibayar lagi".to_string(),
        ),
        CheckoutError::InvalidSignature => {
            (StatusCode::FORBIDDEN, "Signature tidak valid".to_string())
        }
        CheckoutError::AmountMismatch { .. } => (
            StatusCode::BAD_REQUEST,
            "Jumlah pembayaran tidak sesuai".to_string(),
        ),
        CheckoutError::Transition(_) => (
            StatusCode::CONFLICT,
            "Perubahan status pesanan tidak diizinkan".to_string(),
        ),
        CheckoutError::Gateway(_) => (
            StatusCode::BAD_GATEWAY,
            "Gagal menghubungi layanan pembayaran".to_string(),
        ),
        CheckoutError::InvalidAmount => server_error(),
        CheckoutError::Repository(err) => repository_response(err),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (status, Json(ErrorBody { message })).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;
    use rust_decimal::Decimal;

    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    async fn get_message(err: AppError) -> String {
        let body = to_bytes(err.into_response().into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        json["message"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("Produk".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(get_status(AppError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(get_status(AppError::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::RateLimited),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_domain_error_status_codes() {
        assert_eq!(
            get_status(CartServiceError::Rule(CartError::InsufficientStock {
                requested: 3,
                available: 1
            })
            .into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(TransitionError::Cancelled.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(CheckoutError::InvalidSignature.into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AuthError::UserAlreadyExists.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(RepositoryError::NotFound.into()),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_stock_message_is_indonesian() {
        let err: AppError = CartServiceError::Rule(CartError::InsufficientStock {
            requested: 3,
            available: 1,
        })
        .into();
        assert_eq!(get_message(err).await, "Stok tidak mencukupi");
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let err = AppError::Database(RepositoryError::DataCorruption(
            "negative stock on variant 7".to_string(),
        ));
        assert_eq!(get_message(err).await, SERVER_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn test_promo_minimum_message() {
        let err: AppError = CheckoutError::Promo(PromoError::BelowMinimum {
            minimum: Decimal::new(100_000, 0),
        })
        .into();
        assert!(get_message(err).await.starts_with("Minimal pembelian"));
    }
}
