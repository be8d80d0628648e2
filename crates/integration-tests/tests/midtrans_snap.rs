//! Snap transaction and notification round trips against a mock gateway.

#![allow(clippy::unwrap_used)]

use chrono::{TimeZone, Utc};
use omahring_core::order::{Applied, OrderState};
use omahring_core::payment::{GatewayReference, event_for};
use omahring_core::{OrderId, OrderStatus, PaymentStatus};
use omahring_integration_tests::{midtrans_config, signed_notification};
use omahring_storefront::services::midtrans::{
    CustomerDetails, ItemDetail, MidtransClient, MidtransError, SnapAddress, SnapRequest,
    TransactionDetails,
};
use wiremock::matchers::{body_partial_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn customer() -> CustomerDetails {
    CustomerDetails {
        first_name: "Sari".to_string(),
        email: "sari@example.id".to_string(),
        phone: Some("081234567890".to_string()),
        shipping_address: SnapAddress {
            first_name: "Sari".to_string(),
            phone: "081234567890".to_string(),
            address: "Jl. Cucak Rowo 7".to_string(),
            city: "Yogyakarta".to_string(),
            postal_code: "55223".to_string(),
            country_code: "IDN",
        },
    }
}

#[tokio::test]
async fn test_discounted_order_is_paid_end_to_end() {
    let server = MockServer::start().await;
    let issued = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
    let reference = GatewayReference::new(OrderId::new(42), issued);

    // 2 x 95.000 + 1 x 35.000 - 22.500 discount = 202.500
    let items = vec![
        ItemDetail::new("7", 95_000, 2, "Voer Kenari Premium - 1 kg"),
        ItemDetail::new("9", 35_000, 1, "Jangkrik Kering - 100 gr"),
        ItemDetail::new("DISCOUNT", -22_500, 1, "Promo KICAU10"),
    ];
    let request = SnapRequest::new(
        TransactionDetails {
            order_id: reference.to_string(),
            gross_amount: 202_500,
        },
        items,
        customer(),
    );
    assert_eq!(request.item_details.len(), 3);

    Mock::given(method("POST"))
        .and(path("/snap/v1/transactions"))
        .and(header_exists("authorization"))
        .and(body_partial_json(serde_json::json!({
            "transaction_details": {"order_id": reference.as_str(), "gross_amount": 202_500},
            "customer_details": {"shipping_address": {"country_code": "IDN"}},
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "token": "b1c2d3e4-0000-4000-8000-000000000042",
            "redirect_url": "https://app.sandbox.midtrans.com/snap/v4/redirection/b1c2d3e4"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = MidtransClient::new(&midtrans_config(&server.uri())).unwrap();
    let snap = client.create_transaction(&request).await.unwrap();
    assert_eq!(snap.token, "b1c2d3e4-0000-4000-8000-000000000042");

    // The gateway reports settlement for the same reference.
    let notification = signed_notification(reference.as_str(), "202500.00", "settlement", None);
    assert!(client.verify_notification(&notification));

    let parsed = GatewayReference::parse(&notification.order_id).unwrap();
    assert_eq!(parsed.order_id(), Some(OrderId::new(42)));

    let event = event_for(&notification.transaction_status, None).unwrap();
    let Applied::Changed { state, settled } = OrderState::new().apply_payment(event).unwrap()
    else {
        panic!("settlement must change a new order");
    };
    assert!(settled);
    assert_eq!(state.status, OrderStatus::Processing);
    assert_eq!(state.payment, PaymentStatus::Paid);

    // A retried notification does not settle the order twice.
    assert_eq!(state.apply_payment(event).unwrap(), Applied::Unchanged);
}

#[tokio::test]
async fn test_notification_from_another_merchant_fails_verification() {
    let client = MidtransClient::new(&midtrans_config("http://127.0.0.1:9")).unwrap();
    let mut notification = signed_notification("ORD-42-1772352000", "202500.00", "settlement", None);
    notification.signature_key = "ab".repeat(64);

    assert!(!client.verify_notification(&notification));
}

#[tokio::test]
async fn test_gateway_outage_surfaces_raw_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/snap/v1/transactions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let client = MidtransClient::new(&midtrans_config(&server.uri())).unwrap();
    let request = SnapRequest::new(
        TransactionDetails {
            order_id: "ORD-5-1772352000".to_string(),
            gross_amount: 18_000,
        },
        vec![ItemDetail::new("3", 18_000, 1, "Cepuk Pakan Akrilik")],
        customer(),
    );

    match client.create_transaction(&request).await.unwrap_err() {
        MidtransError::Api { status, messages } => {
            assert_eq!(status, 503);
            assert_eq!(messages, vec!["upstream unavailable".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_malformed_success_body_is_a_parse_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/snap/v1/transactions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"status": "ok"})))
        .mount(&server)
        .await;

    let client = MidtransClient::new(&midtrans_config(&server.uri())).unwrap();
    let request = SnapRequest::new(
        TransactionDetails {
            order_id: "ORD-6-1772352000".to_string(),
            gross_amount: 28_000,
        },
        Vec::new(),
        customer(),
    );

    assert!(matches!(
        client.create_transaction(&request).await,
        Err(MidtransError::Parse(_))
    ));
}
