//! Full middleware stack and routing, without a database.
//!
//! Every request here is answered before a handler needs Postgres: by an
//! extractor rejection, CORS, the rate limiter or signature verification.

#![allow(clippy::unwrap_used)]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use omahring_integration_tests::{SPA_ORIGIN, lazy_state, notification_json, signed_notification};
use tower::ServiceExt;

fn router() -> Router {
    omahring_storefront::app(lazy_state("http://127.0.0.1:9"))
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), 4096).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str, client_ip: &str) -> Request<Body> {
    Request::get(uri)
        .header("x-forwarded-for", client_ip)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_protected_routes_require_login() {
    let app = router();

    for uri in ["/api/auth/me", "/api/orders", "/api/account/addresses"] {
        let response = app.clone().oneshot(get(uri, "203.0.113.10")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        let json = json_body(response).await;
        assert!(json["message"].is_string(), "{uri}");
    }
}

#[tokio::test]
async fn test_cors_preflight_allows_spa_origin() {
    let response = router()
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/cart/items")
                .header(header::ORIGIN, SPA_ORIGIN)
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type,x-session-id")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_success());
    let headers = response.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        SPA_ORIGIN
    );
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
        "true"
    );
}

#[tokio::test]
async fn test_auth_routes_are_rate_limited_per_client() {
    let app = router();

    let mut statuses = Vec::new();
    for _ in 0..6 {
        let response = app
            .clone()
            .oneshot(get("/api/auth/me", "198.51.100.20"))
            .await
            .unwrap();
        statuses.push(response.status());
    }
    assert_eq!(statuses[..5], [StatusCode::UNAUTHORIZED; 5]);
    assert_eq!(statuses[5], StatusCode::TOO_MANY_REQUESTS);

    // Another client still gets through.
    let response = app.oneshot(get("/api/auth/me", "198.51.100.21")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_payment_notifications_are_not_rate_limited() {
    let app = router();
    let mut notification = signed_notification("ORD-3-1772352000", "56000.00", "settlement", None);
    notification.signature_key = "0".repeat(128);
    let body = notification_json(&notification).to_string();

    for _ in 0..10 {
        let response = app
            .clone()
            .oneshot(
                Request::post("/api/payments/notification")
                    .header("x-forwarded-for", "103.208.23.6")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}

#[tokio::test]
async fn test_non_payment_notification_is_acknowledged() {
    // `authorize` carries no payment decision; the order is never loaded.
    let notification = signed_notification("ORD-3-1772352000", "56000.00", "authorize", None);

    let response = router()
        .oneshot(
            Request::post("/api/payments/notification")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(notification_json(&notification).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ignored");
}

#[tokio::test]
async fn test_guest_cart_needs_session_header() {
    let response = router()
        .oneshot(get("/api/cart", "203.0.113.30"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["message"], "Session ID diperlukan");
}
