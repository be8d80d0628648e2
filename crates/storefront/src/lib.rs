//! Omahring Storefront library.
//!
//! The JSON REST API behind the Omahring bird-hobby shop: catalog, carts,
//! checkout with Midtrans Snap, promos, blog and back office. Exposed as a
//! library so the binary, the CLI and the tests share one router.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, Request, header::CONTENT_TYPE},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::StorefrontConfig;
use crate::middleware::request_id::REQUEST_ID_HEADER;
use crate::middleware::{
    auth::SESSION_ID_HEADER, create_session_layer, request_id_middleware,
    security_headers_middleware,
};
use crate::state::AppState;

/// CORS policy for the SPA origin. Without a configured origin no
/// cross-origin request is allowed.
fn cors_layer(config: &StorefrontConfig) -> CorsLayer {
    let Some(origin) = config
        .cors_origin
        .as_deref()
        .and_then(|o| HeaderValue::from_str(o).ok())
    else {
        return CorsLayer::new();
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static(SESSION_ID_HEADER),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
}

/// Build the full application router with its middleware stack.
pub fn app(state: AppState) -> Router {
    let session_layer = create_session_layer(state.pool(), state.config());
    let cors = cors_layer(state.config());

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = tracing::field::Empty,
        )
    });

    routes::routes()
        .layer(session_layer)
        .layer(axum::middleware::from_fn(security_headers_middleware))
        .layer(cors)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(trace)
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use axum::body::{Body, to_bytes};
    use axum::http::StatusCode;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use super::*;
    use crate::config::MidtransConfig;
    use crate::services::midtrans::notification_signature;

    const SERVER_KEY: &str = "SB-Mid-server-7hGq2LkP9xVt4ZmW";

    fn test_state() -> AppState {
        let config = StorefrontConfig {
            database_url: SecretString::from("postgres://localhost/omahring_test"),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5000,
            base_url: "http://localhost:5000".to_string(),
            cors_origin: Some("http://localhost:5173".to_string()),
            session_secret: SecretString::from("x".repeat(64)),
            midtrans: MidtransConfig {
                server_key: SecretString::from(SERVER_KEY),
                client_key: None,
                is_production: false,
                snap_url: "http://127.0.0.1:9".to_string(),
                finish_url: None,
            },
            sentry_dsn: None,
            sentry_environment: None,
        };
        // Never connects unless a handler touches the database.
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/omahring_test")
            .unwrap();
        AppState::new(config, pool).unwrap()
    }

    fn notification_body(signature: &str) -> String {
        serde_json::json!({
            "order_id": "ORD-12-1772352000",
            "status_code": "200",
            "gross_amount": "81000.00",
            "signature_key": signature,
            "transaction_status": "settlement",
            "transaction_id": "9aed5972-5b6a-401e-894b-a32c91ed1a3a",
            "payment_type": "bank_transfer",
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(test_state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        assert_eq!(
            response.headers().get("x-frame-options").unwrap(),
            "DENY"
        );
        let body = to_bytes(response.into_body(), 64).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let response = app(test_state())
            .oneshot(
                Request::get("/health")
                    .header(REQUEST_ID_HEADER, "req-abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(REQUEST_ID_HEADER).unwrap(),
            "req-abc-123"
        );
    }

    #[tokio::test]
    async fn test_notification_with_bad_signature_is_rejected() {
        let response = app(test_state())
            .oneshot(
                Request::post("/api/payments/notification")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(notification_body(&"0".repeat(128))))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Signature tidak valid");
    }

    #[tokio::test]
    async fn test_notification_with_foreign_reference_is_ignored() {
        let signature = notification_signature(
            "INV-2026-0042",
            "200",
            "81000.00",
            &SecretString::from(SERVER_KEY),
        );
        let body = notification_body(&signature).replace("ORD-12-1772352000", "INV-2026-0042");

        let response = app(test_state())
            .oneshot(
                Request::post("/api/payments/notification")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ignored");
    }

    #[tokio::test]
    async fn test_cart_requires_owner() {
        let response = app(test_state())
            .oneshot(
                Request::get("/api/cart")
                    .header("x-forwarded-for", "198.51.100.4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_requires_login() {
        let response = app(test_state())
            .oneshot(
                Request::get("/api/admin/orders")
                    .header("x-forwarded-for", "198.51.100.4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
