//! Payment gateway references, notification mapping and token freshness.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::order::PaymentEvent;
use crate::types::OrderId;

/// How long a Snap token is treated as usable after it was issued.
pub const SNAP_TOKEN_VALIDITY: Duration = Duration::hours(2);

/// Prefix of every gateway reference.
const REFERENCE_PREFIX: &str = "ORD";

/// The `order_id` string sent to the gateway.
///
/// The gateway refuses to open a second transaction with an `order_id` it has
/// already seen, so each token request gets a reference of the form
/// `ORD-{order id}-{unix seconds}` and notifications are traced back to the
/// order by parsing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GatewayReference(String);

impl GatewayReference {
    /// Build a reference for `order_id` issued at `at`.
    #[must_use]
    pub fn new(order_id: OrderId, at: DateTime<Utc>) -> Self {
        Self(format!("{REFERENCE_PREFIX}-{order_id}-{}", at.timestamp()))
    }

    /// Parse a reference received from the gateway.
    ///
    /// Returns `None` if it was not produced by [`GatewayReference::new`].
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split('-');
        let (Some(REFERENCE_PREFIX), Some(id), Some(ts), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return None;
        };
        id.parse::<i32>().ok()?;
        ts.parse::<i64>().ok()?;
        Some(Self(s.to_owned()))
    }

    /// The order this reference belongs to.
    #[must_use]
    pub fn order_id(&self) -> Option<OrderId> {
        self.0.split('-').nth(1)?.parse::<i32>().ok().map(OrderId::new)
    }

    /// The reference as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GatewayReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Map a gateway `transaction_status` (and `fraud_status`) to a payment event.
///
/// Returns `None` for statuses that carry no payment decision (for example
/// `authorize`), which callers acknowledge and ignore.
#[must_use]
pub fn event_for(transaction_status: &str, fraud_status: Option<&str>) -> Option<PaymentEvent> {
    match transaction_status {
        "capture" => match fraud_status {
            None | Some("accept") => Some(PaymentEvent::Paid),
            Some("challenge") => Some(PaymentEvent::Pending),
            Some(_) => Some(PaymentEvent::Failed),
        },
        "settlement" => Some(PaymentEvent::Paid),
        "pending" => Some(PaymentEvent::Pending),
        "deny" | "cancel" | "failure" => Some(PaymentEvent::Failed),
        "expire" => Some(PaymentEvent::Expired),
        "refund" | "partial_refund" => Some(PaymentEvent::Refunded),
        _ => None,
    }
}

/// A Snap token and when it was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapToken {
    pub token: String,
    pub redirect_url: String,
    pub issued_at: DateTime<Utc>,
}

impl SnapToken {
    /// When the token stops being reused.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + SNAP_TOKEN_VALIDITY
    }

    /// Whether the token is still fresh at `now`.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_reference_round_trip() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let reference = GatewayReference::new(OrderId::new(117), at);
        assert_eq!(reference.as_str(), format!("ORD-117-{}", at.timestamp()));

        let parsed = GatewayReference::parse(reference.as_str()).unwrap();
        assert_eq!(parsed.order_id(), Some(OrderId::new(117)));
    }

    #[test]
    fn test_reference_rejects_foreign_ids() {
        assert!(GatewayReference::parse("117").is_none());
        assert!(GatewayReference::parse("INV-117-1700000000").is_none());
        assert!(GatewayReference::parse("ORD-abc-1700000000").is_none());
        assert!(GatewayReference::parse("ORD-117-1700000000-x").is_none());
    }

    #[test]
    fn test_notification_mapping() {
        assert_eq!(event_for("settlement", None), Some(PaymentEvent::Paid));
        assert_eq!(event_for("capture", Some("accept")), Some(PaymentEvent::Paid));
        assert_eq!(
            event_for("capture", Some("challenge")),
            Some(PaymentEvent::Pending)
        );
        assert_eq!(event_for("pending", None), Some(PaymentEvent::Pending));
        assert_eq!(event_for("deny", None), Some(PaymentEvent::Failed));
        assert_eq!(event_for("cancel", None), Some(PaymentEvent::Failed));
        assert_eq!(event_for("expire", None), Some(PaymentEvent::Expired));
        assert_eq!(event_for("refund", None), Some(PaymentEvent::Refunded));
        assert_eq!(event_for("authorize", None), None);
    }

    #[test]
    fn test_token_freshness_window() {
        let issued_at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let token = SnapToken {
            token: "tok".to_owned(),
            redirect_url: "https://app.sandbox.midtrans.com/snap/v4/redirection/tok".to_owned(),
            issued_at,
        };

        assert!(token.is_fresh(issued_at + Duration::minutes(119)));
        assert!(!token.is_fresh(issued_at + Duration::hours(2)));
        assert!(!token.is_fresh(issued_at + Duration::hours(5)));
    }
}
