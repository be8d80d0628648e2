//! Order domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use omahring_core::order::OrderState;
use omahring_core::payment::SnapToken;
use omahring_core::{
    OrderId, OrderItemId, OrderStatus, PaymentStatus, Price, ProductId, UserId, VariantId,
};

use super::user::Address;

/// Shipping address copied onto the order at checkout.
///
/// Later edits to the user's saved address do not affect placed orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient_name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
}

impl ShippingAddress {
    /// Check that no field is blank.
    ///
    /// # Errors
    ///
    /// Returns the name of the first blank field.
    pub fn validate(&self) -> Result<(), &'static str> {
        let fields = [
            ("recipient_name", &self.recipient_name),
            ("phone", &self.phone),
            ("street", &self.street),
            ("city", &self.city),
            ("province", &self.province),
            ("postal_code", &self.postal_code),
        ];
        fields
            .into_iter()
            .find(|(_, value)| value.trim().is_empty())
            .map_or(Ok(()), |(name, _)| Err(name))
    }
}

impl From<&Address> for ShippingAddress {
    fn from(address: &Address) -> Self {
        Self {
            recipient_name: address.recipient_name.clone(),
            phone: address.phone.clone(),
            street: address.street.clone(),
            city: address.city.clone(),
            province: address.province.clone(),
            postal_code: address.postal_code.clone(),
        }
    }
}

/// A line of a placed order, snapshotted from the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    /// `None` once the product has been removed from the catalog.
    pub product_id: Option<ProductId>,
    pub variant_id: Option<VariantId>,
    pub product_name: String,
    pub variant_name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl OrderItem {
    #[must_use]
    pub fn line_total(&self) -> Price {
        Price::idr(self.unit_price).times(self.quantity)
    }
}

/// A placed order.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total_amount: Decimal,
    pub promo_code: Option<String>,
    pub shipping_address: ShippingAddress,
    pub items: Vec<OrderItem>,
    /// Current Snap token, if one has been issued.
    pub snap_token: Option<SnapToken>,
    /// Reference the current token was requested under.
    pub gateway_reference: Option<String>,
    /// Gateway-side transaction id, from the last notification.
    pub gateway_transaction_id: Option<String>,
    /// Payment method reported by the gateway (e.g. `bank_transfer`).
    pub payment_type: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// The order's joint lifecycle position.
    #[must_use]
    pub const fn state(&self) -> OrderState {
        OrderState {
            status: self.status,
            payment: self.payment_status,
        }
    }

    /// The stored token if it is still fresh at `now`.
    #[must_use]
    pub fn fresh_token(&self, now: DateTime<Utc>) -> Option<&SnapToken> {
        self.snap_token.as_ref().filter(|t| t.is_fresh(now))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            recipient_name: "Sari".to_string(),
            phone: "0812".to_string(),
            street: "Jl. Merpati 3".to_string(),
            city: "Solo".to_string(),
            province: "Jawa Tengah".to_string(),
            postal_code: "57126".to_string(),
        }
    }

    fn order(token_issued_at: Option<DateTime<Utc>>) -> Order {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        Order {
            id: OrderId::new(1),
            user_id: UserId::new(1),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            subtotal: Decimal::new(50_000, 0),
            discount: Decimal::ZERO,
            total_amount: Decimal::new(50_000, 0),
            promo_code: None,
            shipping_address: address(),
            items: vec![],
            snap_token: token_issued_at.map(|issued_at| SnapToken {
                token: "tok".to_string(),
                redirect_url: "https://app.sandbox.midtrans.com/snap/v4/redirection/tok"
                    .to_string(),
                issued_at,
            }),
            gateway_reference: None,
            gateway_transaction_id: None,
            payment_type: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_shipping_address_validation() {
        assert!(address().validate().is_ok());
        let mut blank = address();
        blank.postal_code = String::new();
        assert_eq!(blank.validate(), Err("postal_code"));
    }

    #[test]
    fn test_fresh_token() {
        let issued = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let o = order(Some(issued));
        assert!(o.fresh_token(issued + Duration::minutes(30)).is_some());
        assert!(o.fresh_token(issued + Duration::hours(3)).is_none());
        assert!(order(None).fresh_token(issued).is_none());
    }
}
