//! Cart, promo and order lifecycle rules working together.

#![allow(clippy::unwrap_used)]

use chrono::{Duration, Utc};
use omahring_core::cart::{CartError, CartLine, MergeOutcome, cart_total, plan_merge, quantity_after_add};
use omahring_core::order::{Applied, OrderState, PaymentEvent, TransitionError};
use omahring_core::promo::{PromoError, PromoRules};
use omahring_core::{CartItemId, OrderStatus, PaymentStatus, ProductId, PromoType, UserRole, VariantId};
use rust_decimal::Decimal;

fn idr(v: i64) -> Decimal {
    Decimal::new(v, 0)
}

fn line(id: Option<i32>, variant: i32, price: i64, quantity: u32) -> CartLine {
    CartLine {
        id: id.map(CartItemId::new),
        product_id: ProductId::new(variant / 10),
        variant_id: VariantId::new(variant),
        variant_name: format!("Varian {variant}"),
        unit_price: idr(price),
        quantity,
    }
}

fn kicau10() -> PromoRules {
    PromoRules {
        promo_type: PromoType::Percentage,
        value: idr(10),
        min_purchase: Some(idr(100_000)),
        max_discount: Some(idr(50_000)),
        starts_at: Some(Utc::now() - Duration::days(1)),
        ends_at: Some(Utc::now() + Duration::days(30)),
        usage_limit: Some(2),
        used_count: 0,
        is_active: true,
        member_only: false,
    }
}

#[test]
fn test_guest_cart_merged_then_discounted() {
    // Guest added feed and cups before logging in; the account already held
    // one bag of feed.
    let user = vec![line(Some(1), 70, 95_000, 1)];
    let guest = vec![
        line(Some(11), 70, 89_000, 3),
        line(Some(12), 30, 18_000, 2),
        line(Some(13), 90, 35_000, 1),
    ];
    let stock = |v: VariantId| match v.as_i32() {
        70 => Some(2),
        30 => Some(60),
        _ => None,
    };

    let plan = plan_merge(&user, &guest, stock);
    assert_eq!(
        plan.outcomes,
        vec![
            MergeOutcome::Summed {
                key: user[0].key(),
                quantity: 4,
                over_stock: true
            },
            MergeOutcome::Appended {
                key: guest[1].key(),
                quantity: 2
            },
            MergeOutcome::SkippedUnavailable { key: guest[2].key() },
        ]
    );
    // The user's existing line keeps its own price snapshot.
    assert_eq!(plan.total().amount, idr(4 * 95_000 + 2 * 18_000));
    assert_eq!(plan.total(), cart_total(&plan.lines));

    let now = Utc::now();
    let discount = kicau10()
        .evaluate(plan.total().amount, UserRole::User, now)
        .unwrap();
    assert_eq!(discount, idr(41_600));
}

#[test]
fn test_add_to_cart_respects_stock() {
    assert_eq!(quantity_after_add(Some(2), 3, 5), Ok(5));
    assert_eq!(
        quantity_after_add(Some(2), 4, 5),
        Err(CartError::InsufficientStock {
            requested: 6,
            available: 5
        })
    );
}

#[test]
fn test_promo_usage_limit_and_membership() {
    let mut promo = kicau10();
    let now = Utc::now();

    promo.used_count = 2;
    assert_eq!(
        promo.evaluate(idr(150_000), UserRole::Member, now),
        Err(PromoError::UsageLimitReached)
    );

    promo.used_count = 0;
    promo.member_only = true;
    assert_eq!(
        promo.evaluate(idr(150_000), UserRole::User, now),
        Err(PromoError::MembersOnly)
    );
    assert_eq!(
        promo.evaluate(idr(150_000), UserRole::Manager, now),
        Ok(idr(15_000))
    );
}

#[test]
fn test_fulfilment_after_payment() {
    let Applied::Changed { state, .. } = OrderState::new()
        .apply_payment(PaymentEvent::Pending)
        .unwrap()
    else {
        panic!("pending must change a new order");
    };
    assert_eq!(state.status, OrderStatus::Pending);

    // Staff cannot ship before the money arrives.
    assert!(matches!(
        state.transition_to(OrderStatus::Processing),
        Err(TransitionError::PaymentRequired { .. })
    ));

    let Applied::Changed { state, settled } = state.apply_payment(PaymentEvent::Paid).unwrap()
    else {
        panic!("payment must change a pending order");
    };
    assert!(settled);

    let shipped = state.transition_to(OrderStatus::Shipped).unwrap();
    let delivered = shipped.transition_to(OrderStatus::Delivered).unwrap();
    assert_eq!(delivered.payment, PaymentStatus::Paid);
    assert!(delivered.cancel_by_buyer().is_err());
}

#[test]
fn test_expired_payment_cancels_and_blocks_late_settlement() {
    let Applied::Changed { state, settled } = OrderState::new()
        .apply_payment(PaymentEvent::Expired)
        .unwrap()
    else {
        panic!("expiry must change a new order");
    };
    assert!(!settled);
    assert_eq!(state.status, OrderStatus::Cancelled);
    assert!(!state.accepts_payment());

    assert!(state.apply_payment(PaymentEvent::Paid).is_err());
}

#[test]
fn test_buyer_cancel_closes_payment() {
    let cancelled = OrderState::new().cancel_by_buyer().unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.payment, PaymentStatus::Failed);
}
