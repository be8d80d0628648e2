//! Checkout and the payment-token lifecycle.
//!
//! Placing an order re-reads every line's variant, checks stock, applies an
//! optional promo and persists the order before asking Midtrans for a Snap
//! token. If Midtrans refuses, the order is deleted again. Payment
//! notifications are verified, mapped to a [`PaymentEvent`](omahring_core::order::PaymentEvent) and applied
//! through the order state machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;

use omahring_core::order::{Applied, OrderState, PaymentEvent, TransitionError};
use omahring_core::payment::{GatewayReference, SnapToken, event_for};
use omahring_core::promo::PromoError;
use omahring_core::{AddressId, OrderId, OrderStatus, Price};

use crate::db::orders::{NewOrder, NewOrderItem, OrderUpdateError, PaymentDetails};
use crate::db::products::ProductRepository;
use crate::db::{AddressRepository, CartRepository, OrderRepository, PromoRepository, RepositoryError};
use crate::models::promo::normalize_code;
use crate::models::{CartOwner, Order, ShippingAddress, User};
use crate::services::midtrans::{
    CustomerDetails, ItemDetail, MidtransClient, MidtransError, Notification, SnapAddress,
    SnapRequest, TransactionDetails,
};

/// Errors from checkout and payment operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("{product} is no longer available")]
    Unavailable { product: String },

    #[error("insufficient stock for {product}: {available} left")]
    InsufficientStock { product: String, available: u32 },

    #[error("promo code not found")]
    PromoNotFound,

    #[error(transparent)]
    Promo(#[from] PromoError),

    #[error("no shipping address")]
    MissingAddress,

    #[error("shipping address field {0} is blank")]
    InvalidAddress(&'static str),

    #[error("order not found")]
    OrderNotFound,

    #[error("order no longer accepts payment")]
    PaymentClosed,

    #[error("order total cannot be sent to the gateway")]
    InvalidAmount,

    #[error("invalid notification signature")]
    InvalidSignature,

    #[error("notification amount {notified} does not match order total {expected}")]
    AmountMismatch { notified: String, expected: Decimal },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("payment gateway error: {0}")]
    Gateway(#[from] MidtransError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<OrderUpdateError> for CheckoutError {
    fn from(e: OrderUpdateError) -> Self {
        match e {
            OrderUpdateError::Repository(RepositoryError::NotFound) => Self::OrderNotFound,
            OrderUpdateError::Repository(r) => Self::Repository(r),
            OrderUpdateError::Transition(t) => Self::Transition(t),
        }
    }
}

/// Checkout request body.
///
/// The shipping address is taken from `address_id`, else from an inline
/// `shipping_address`, else from the user's default address.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub address_id: Option<AddressId>,
    #[serde(default)]
    pub shipping_address: Option<ShippingAddress>,
    #[serde(default)]
    pub promo_code: Option<String>,
}

/// Discount preview for the current cart.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PromoPreview {
    pub code: String,
    pub subtotal: Price,
    pub discount: Price,
    pub total: Price,
}

/// What a payment notification did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// The order's statuses changed.
    Applied { order_id: OrderId, settled: bool },
    /// The order was already in that payment status.
    Duplicate { order_id: OrderId },
    /// The status carries no payment decision or the reference is not ours.
    Ignored,
}

/// Checkout service.
pub struct CheckoutService<'a> {
    pool: &'a PgPool,
    midtrans: &'a MidtransClient,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, midtrans: &'a MidtransClient) -> Self {
        Self { pool, midtrans }
    }

    /// Place an order from the user's cart and obtain its first Snap token.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::EmptyCart`, a stock or promo error, or
    /// `CheckoutError::Gateway` after deleting the order again when Midtrans
    /// refuses the transaction.
    #[tracing::instrument(skip(self, user, request), fields(user_id = %user.id))]
    pub async fn place_order(
        &self,
        user: &User,
        request: &CheckoutRequest,
    ) -> Result<Order, CheckoutError> {
        let now = Utc::now();
        let shipping_address = self.resolve_address(user, request).await?;
        let items = self.priced_items(user).await?;
        let subtotal = subtotal_of(&items);

        let promo = match request.promo_code.as_deref().map(normalize_code) {
            Some(code) if !code.is_empty() => {
                let promo = PromoRepository::new(self.pool)
                    .get_by_code(&code)
                    .await?
                    .ok_or(CheckoutError::PromoNotFound)?;
                let discount = promo.rules.evaluate(subtotal, user.role, now)?;
                Some((promo.id, promo.code, discount))
            }
            _ => None,
        };
        let discount = promo.as_ref().map_or(Decimal::ZERO, |(_, _, d)| *d);

        let orders = OrderRepository::new(self.pool);
        let order = orders
            .create(&NewOrder {
                user_id: user.id,
                shipping_address,
                subtotal,
                discount,
                total_amount: Price::idr(subtotal).saturating_sub(discount).amount,
                promo: promo.map(|(id, code, _)| (id, code)),
                items,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => PromoError::UsageLimitReached.into(),
                other => CheckoutError::from(other),
            })?;

        tracing::info!(order_id = %order.id, total = %order.total_amount, "Order created");

        match self.issue_token(user, &order, now).await {
            Ok(token) => Ok(Order {
                snap_token: Some(token),
                ..order
            }),
            Err(e) => {
                if let Err(delete_err) = orders.delete_unsubmitted(order.id).await {
                    tracing::error!(
                        order_id = %order.id,
                        error = %delete_err,
                        "Failed to delete order after gateway failure"
                    );
                }
                Err(e)
            }
        }
    }

    /// The order's Snap token, regenerated if it is missing or stale.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::OrderNotFound` for another user's order and
    /// `CheckoutError::PaymentClosed` once payment is no longer open.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn payment_token(
        &self,
        user: &User,
        order_id: OrderId,
    ) -> Result<SnapToken, CheckoutError> {
        let order = OrderRepository::new(self.pool)
            .get_for_user(user.id, order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound)?;

        if !order.state().accepts_payment() {
            return Err(CheckoutError::PaymentClosed);
        }

        let now = Utc::now();
        if let Some(token) = order.fresh_token(now) {
            return Ok(token.clone());
        }

        tracing::info!(order_id = %order.id, "Snap token stale, requesting a new one");
        self.issue_token(user, &order, now).await
    }

    /// Cancel an unpaid order on behalf of its buyer.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::OrderNotFound` for another user's order and
    /// `CheckoutError::Transition` once the order is paid or in fulfilment.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn cancel(&self, user: &User, order_id: OrderId) -> Result<Order, CheckoutError> {
        let order = OrderRepository::new(self.pool)
            .update_state(order_id, Some(user.id), OrderState::cancel_by_buyer)
            .await?;
        tracing::info!(order_id = %order.id, "Order cancelled by buyer");
        Ok(order)
    }

    /// Move an order to a new fulfilment status (back office).
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Transition` for moves the lifecycle refuses.
    #[tracing::instrument(skip(self))]
    pub async fn set_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, CheckoutError> {
        let order = OrderRepository::new(self.pool)
            .update_state(order_id, None, |state| state.transition_to(status))
            .await?;
        tracing::info!(
            order_id = %order.id,
            status = order.status.as_str(),
            payment_status = order.payment_status.as_str(),
            "Order status updated"
        );
        Ok(order)
    }

    /// Preview the discount a promo would give on the user's current cart.
    ///
    /// The cart is priced exactly as [`Self::place_order`] prices it, from
    /// current variants, so the preview matches what checkout charges.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::PromoNotFound`, the promo's ineligibility
    /// reason, or the stock error checkout would raise for this cart.
    pub async fn preview_promo(
        &self,
        user: &User,
        code: &str,
    ) -> Result<PromoPreview, CheckoutError> {
        let code = normalize_code(code);
        let promo = PromoRepository::new(self.pool)
            .get_by_code(&code)
            .await?
            .ok_or(CheckoutError::PromoNotFound)?;

        let subtotal = subtotal_of(&self.priced_items(user).await?);
        let discount = promo.rules.evaluate(subtotal, user.role, Utc::now())?;

        Ok(PromoPreview {
            code: promo.code,
            subtotal: Price::idr(subtotal),
            discount: Price::idr(discount),
            total: Price::idr(subtotal).saturating_sub(discount),
        })
    }

    /// Verify and apply a Midtrans payment notification.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::InvalidSignature` for unsigned or tampered
    /// payloads, `CheckoutError::OrderNotFound` for unknown orders and
    /// `CheckoutError::AmountMismatch` when the amount differs from the order.
    #[tracing::instrument(
        skip(self, notification),
        fields(
            order_id = %notification.order_id,
            transaction_status = %notification.transaction_status
        )
    )]
    pub async fn handle_notification(
        &self,
        notification: &Notification,
    ) -> Result<NotificationOutcome, CheckoutError> {
        if !self.midtrans.verify_notification(notification) {
            tracing::warn!("Rejected notification with invalid signature");
            return Err(CheckoutError::InvalidSignature);
        }

        let Some(order_id) =
            GatewayReference::parse(&notification.order_id).and_then(|r| r.order_id())
        else {
            tracing::warn!("Notification for an unknown reference format");
            return Ok(NotificationOutcome::Ignored);
        };

        let Some(event) = event_for(
            &notification.transaction_status,
            notification.fraud_status.as_deref(),
        ) else {
            tracing::info!("Notification status carries no payment decision");
            return Ok(NotificationOutcome::Ignored);
        };

        let orders = OrderRepository::new(self.pool);
        let order = orders
            .get(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound)?;

        if is_superseded(
            &notification.order_id,
            order.gateway_reference.as_deref(),
            event,
        ) {
            tracing::info!(
                current_reference = ?order.gateway_reference,
                ?event,
                "Notification for a replaced Snap transaction ignored"
            );
            return Ok(NotificationOutcome::Ignored);
        }

        if !amount_matches(&notification.gross_amount, order.total_amount) {
            tracing::warn!(expected = %order.total_amount, notified = %notification.gross_amount, "Notification amount mismatch");
            return Err(CheckoutError::AmountMismatch {
                notified: notification.gross_amount.clone(),
                expected: order.total_amount,
            });
        }

        let details = PaymentDetails {
            reference: notification.order_id.clone(),
            transaction_id: notification.transaction_id.clone(),
            payment_type: notification.payment_type.clone(),
        };
        let result = orders.apply_payment(order_id, event, &details).await?;

        for variant_id in &result.oversold {
            tracing::warn!(%order_id, %variant_id, "Paid quantity exceeded stock, clamped to zero");
        }

        match result.applied {
            Applied::Unchanged => {
                tracing::info!(%order_id, ?event, "Duplicate notification ignored");
                Ok(NotificationOutcome::Duplicate { order_id })
            }
            Applied::Changed { state, settled } => {
                tracing::info!(
                    %order_id,
                    status = state.status.as_str(),
                    payment_status = state.payment.as_str(),
                    settled,
                    "Payment notification applied"
                );
                Ok(NotificationOutcome::Applied { order_id, settled })
            }
        }
    }

    async fn resolve_address(
        &self,
        user: &User,
        request: &CheckoutRequest,
    ) -> Result<ShippingAddress, CheckoutError> {
        let addresses = AddressRepository::new(self.pool);
        let address = if let Some(id) = request.address_id {
            let saved = addresses
                .get(user.id, id)
                .await?
                .ok_or(CheckoutError::MissingAddress)?;
            ShippingAddress::from(&saved)
        } else if let Some(inline) = &request.shipping_address {
            inline.clone()
        } else {
            let saved = addresses
                .get_default(user.id)
                .await?
                .ok_or(CheckoutError::MissingAddress)?;
            ShippingAddress::from(&saved)
        };

        address.validate().map_err(CheckoutError::InvalidAddress)?;
        Ok(address)
    }

    /// Re-read every cart line against current variants.
    async fn priced_items(&self, user: &User) -> Result<Vec<NewOrderItem>, CheckoutError> {
        let cart = CartRepository::new(self.pool)
            .get(&CartOwner::User(user.id))
            .await?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let products = ProductRepository::new(self.pool);
        let mut items = Vec::with_capacity(cart.items.len());
        for line in &cart.items {
            let found = products
                .find_purchasable(line.product_id, line.variant_id)
                .await?
                .ok_or_else(|| CheckoutError::Unavailable {
                    product: line.variant_name.clone(),
                })?;

            let label = format!("{} - {}", found.product_name, found.variant.name);
            if line.quantity > found.variant.stock {
                return Err(CheckoutError::InsufficientStock {
                    product: label,
                    available: found.variant.stock,
                });
            }

            items.push(NewOrderItem {
                product_id: line.product_id,
                variant_id: line.variant_id,
                product_name: found.product_name,
                variant_name: found.variant.name.clone(),
                unit_price: found.variant.effective_price(),
                quantity: line.quantity,
            });
        }
        Ok(items)
    }

    /// Request a Snap token under a fresh gateway reference and store it.
    async fn issue_token(
        &self,
        user: &User,
        order: &Order,
        now: DateTime<Utc>,
    ) -> Result<SnapToken, CheckoutError> {
        let reference = GatewayReference::new(order.id, now);
        let request = snap_request(&reference, user, order)?;

        let response = self.midtrans.create_transaction(&request).await?;
        let token = SnapToken {
            token: response.token,
            redirect_url: response.redirect_url,
            issued_at: now,
        };

        OrderRepository::new(self.pool)
            .store_token(order.id, &reference, &token)
            .await?;
        Ok(token)
    }
}

fn subtotal_of(items: &[NewOrderItem]) -> Decimal {
    items
        .iter()
        .map(|i| i.unit_price * Decimal::from(i.quantity))
        .sum()
}

/// Build the Snap request for an order.
fn snap_request(
    reference: &GatewayReference,
    user: &User,
    order: &Order,
) -> Result<SnapRequest, CheckoutError> {
    let gross_amount = Price::idr(order.total_amount)
        .gross_amount()
        .ok_or(CheckoutError::InvalidAmount)?;

    let mut items = Vec::with_capacity(order.items.len() + 1);
    for item in &order.items {
        let price = Price::idr(item.unit_price)
            .gross_amount()
            .ok_or(CheckoutError::InvalidAmount)?;
        let id = item
            .variant_id
            .map_or_else(|| item.id.to_string(), |v| v.to_string());
        items.push(ItemDetail::new(
            id,
            price,
            item.quantity,
            &format!("{} - {}", item.product_name, item.variant_name),
        ));
    }
    if order.discount > Decimal::ZERO {
        let discount = Price::idr(order.discount)
            .gross_amount()
            .ok_or(CheckoutError::InvalidAmount)?;
        items.push(ItemDetail::new(
            "DISCOUNT",
            -discount,
            1,
            &format!("Promo {}", order.promo_code.as_deref().unwrap_or_default()),
        ));
    }

    let address = &order.shipping_address;
    Ok(SnapRequest::new(
        TransactionDetails {
            order_id: reference.as_str().to_string(),
            gross_amount,
        },
        items,
        CustomerDetails {
            first_name: user.name.clone(),
            email: user.email.as_str().to_string(),
            phone: user.phone.clone(),
            shipping_address: SnapAddress {
                first_name: address.recipient_name.clone(),
                phone: address.phone.clone(),
                address: address.street.clone(),
                city: address.city.clone(),
                postal_code: address.postal_code.clone(),
                country_code: "IDN",
            },
        },
    ))
}

/// Whether a notification belongs to a Snap transaction the order has since
/// replaced with a new token. A settlement still counts: the buyer paid.
fn is_superseded(reference: &str, current: Option<&str>, event: PaymentEvent) -> bool {
    event != PaymentEvent::Paid && current.is_some_and(|c| c != reference)
}

/// Whether a notification's `gross_amount` string equals the whole-Rupiah
/// amount Snap was asked to charge for an order totalling `total`.
fn amount_matches(notified: &str, total: Decimal) -> bool {
    let Some(charged) = Price::idr(total).gross_amount() else {
        return false;
    };
    notified
        .parse::<Decimal>()
        .is_ok_and(|amount| amount == Decimal::from(charged))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use omahring_core::{Email, OrderItemId, PaymentStatus, ProductId, UserId, UserRole, VariantId};

    use super::*;
    use crate::models::OrderItem;

    fn user() -> User {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        User {
            id: UserId::new(3),
            email: Email::parse("sari@example.id").unwrap(),
            name: "Sari".to_string(),
            phone: Some("0812".to_string()),
            role: UserRole::User,
            created_at: at,
            updated_at: at,
        }
    }

    fn order(discount: i64) -> Order {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        Order {
            id: OrderId::new(12),
            user_id: UserId::new(3),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            subtotal: Decimal::new(90_000, 0),
            discount: Decimal::new(discount, 0),
            total_amount: Decimal::new(90_000 - discount, 0),
            promo_code: (discount > 0).then(|| "KICAU10".to_string()),
            shipping_address: ShippingAddress {
                recipient_name: "Sari".to_string(),
                phone: "0812".to_string(),
                street: "Jl. Merpati 3".to_string(),
                city: "Solo".to_string(),
                province: "Jawa Tengah".to_string(),
                postal_code: "57126".to_string(),
            },
            items: vec![OrderItem {
                id: OrderItemId::new(1),
                product_id: Some(ProductId::new(1)),
                variant_id: Some(VariantId::new(4)),
                product_name: "Pakan Kenari".to_string(),
                variant_name: "1 kg".to_string(),
                unit_price: Decimal::new(45_000, 0),
                quantity: 2,
            }],
            snap_token: None,
            gateway_reference: None,
            gateway_transaction_id: None,
            payment_type: None,
            paid_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_snap_request_items_add_up_with_discount() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let reference = GatewayReference::new(OrderId::new(12), at);
        let request = snap_request(&reference, &user(), &order(9_000)).unwrap();

        assert_eq!(request.transaction_details.gross_amount, 81_000);
        assert_eq!(request.item_details.len(), 2);
        assert_eq!(request.item_details[1].price, -9_000);
        assert_eq!(request.transaction_details.order_id, reference.as_str());
    }

    #[test]
    fn test_snap_request_without_discount() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let reference = GatewayReference::new(OrderId::new(12), at);
        let request = snap_request(&reference, &user(), &order(0)).unwrap();

        assert_eq!(request.item_details.len(), 1);
        assert_eq!(request.item_details[0].name, "Pakan Kenari - 1 kg");
    }

    #[test]
    fn test_amount_matches() {
        let total = Decimal::new(81_000, 0);
        assert!(amount_matches("81000.00", total));
        assert!(amount_matches("81000", total));
        assert!(!amount_matches("80000.00", total));
        assert!(!amount_matches("abc", total));
    }

    #[test]
    fn test_subtotal_uses_current_prices() {
        let item = |price: i64, quantity: u32| NewOrderItem {
            product_id: ProductId::new(1),
            variant_id: VariantId::new(4),
            product_name: "Pakan Kenari".to_string(),
            variant_name: "1 kg".to_string(),
            unit_price: Decimal::new(price, 0),
            quantity,
        };
        assert_eq!(
            subtotal_of(&[item(42_000, 2), item(9_500, 3)]),
            Decimal::new(112_500, 0)
        );
        assert_eq!(subtotal_of(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_replaced_transaction_cannot_close_the_order() {
        let old = "ORD-12-1772352000";
        let current = Some("ORD-12-1772359200");

        assert!(is_superseded(old, current, PaymentEvent::Expired));
        assert!(is_superseded(old, current, PaymentEvent::Failed));
        assert!(is_superseded(old, current, PaymentEvent::Pending));
        assert!(!is_superseded(old, current, PaymentEvent::Paid));
        assert!(!is_superseded("ORD-12-1772359200", current, PaymentEvent::Expired));
        assert!(!is_superseded(old, None, PaymentEvent::Expired));
    }

    #[test]
    fn test_fractional_total_matches_the_charged_amount() {
        let mut fractional = order(0);
        fractional.total_amount = Decimal::new(1_500_050, 2);
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let reference = GatewayReference::new(fractional.id, at);
        let request = snap_request(&reference, &user(), &fractional).unwrap();
        assert_eq!(request.transaction_details.gross_amount, 15_001);

        let charged = format!("{}.00", request.transaction_details.gross_amount);
        assert!(amount_matches(&charged, fractional.total_amount));
        assert!(!amount_matches("15000.50", fractional.total_amount));
    }
}
