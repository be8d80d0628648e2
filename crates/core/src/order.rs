//! Joint order/payment state machine.
//!
//! An order carries two statuses: fulfilment ([`OrderStatus`]) and payment
//! ([`PaymentStatus`]). They are only ever changed together through
//! [`OrderState`], so a paid order is always at least `processing` and a
//! failed payment always cancels the order.
//!
//! ```text
//! payment:  unpaid ─► pending ─► paid ─► refunded
//!             │          │
//!             └──────────┴─► failed | expired
//!
//! order:    pending ─► processing ─► shipped ─► delivered
//!             │            │
//!             └────────────┴─► cancelled
//! ```
//!
//! A paid order only reaches `cancelled` through a `refunded` payment event.
//! Leaving for `cancelled` gives back the order's promo use, and its stock
//! too if the order had been paid.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{OrderStatus, PaymentStatus};

/// A transition that the state machine refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("payment cannot move from {} to {}", .from.as_str(), .to.as_str())]
    Payment {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("order cannot move from {} to {}", .from.as_str(), .to.as_str())]
    Order { from: OrderStatus, to: OrderStatus },

    #[error("order must be paid before it can be {}", .to.as_str())]
    PaymentRequired { to: OrderStatus },

    #[error("order is cancelled")]
    Cancelled,

    #[error("a paid order can only be cancelled by refunding it")]
    RefundRequired,
}

/// Payment outcome reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEvent {
    Pending,
    Paid,
    Failed,
    Expired,
    Refunded,
}

impl PaymentEvent {
    /// Payment status this event moves the order to.
    #[must_use]
    pub const fn status(self) -> PaymentStatus {
        match self {
            Self::Pending => PaymentStatus::Pending,
            Self::Paid => PaymentStatus::Paid,
            Self::Failed => PaymentStatus::Failed,
            Self::Expired => PaymentStatus::Expired,
            Self::Refunded => PaymentStatus::Refunded,
        }
    }
}

/// Result of applying a payment event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The order was already in the event's payment status.
    Unchanged,
    /// Statuses changed.
    Changed {
        state: OrderState,
        /// This is the first time the order became paid. Stock must be
        /// decremented and the buyer's cart cleared exactly once, here.
        settled: bool,
    },
}

/// The pair of statuses that make up an order's lifecycle position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct OrderState {
    pub status: OrderStatus,
    pub payment: PaymentStatus,
}

impl OrderState {
    /// State of a freshly created order.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            status: OrderStatus::Pending,
            payment: PaymentStatus::Unpaid,
        }
    }

    /// Apply a gateway payment event.
    ///
    /// Re-applying the current payment status is [`Applied::Unchanged`], so
    /// duplicate notifications are harmless.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::Payment`] for a payment move the lifecycle
    /// does not allow (e.g. `paid -> pending`) and
    /// [`TransitionError::Cancelled`] when a payment arrives for an order that
    /// was already cancelled.
    pub fn apply_payment(self, event: PaymentEvent) -> Result<Applied, TransitionError> {
        use PaymentStatus as P;

        let to = event.status();
        if self.payment == to {
            return Ok(Applied::Unchanged);
        }

        let allowed = matches!(
            (self.payment, to),
            (P::Unpaid, P::Pending | P::Paid | P::Failed | P::Expired)
                | (P::Pending, P::Paid | P::Failed | P::Expired)
                | (P::Paid, P::Refunded)
        );
        if !allowed {
            return Err(TransitionError::Payment {
                from: self.payment,
                to,
            });
        }

        let status = match event {
            PaymentEvent::Pending => self.status,
            PaymentEvent::Paid => match self.status {
                OrderStatus::Cancelled => return Err(TransitionError::Cancelled),
                OrderStatus::Pending => OrderStatus::Processing,
                other => other,
            },
            PaymentEvent::Failed | PaymentEvent::Expired | PaymentEvent::Refunded => {
                match self.status {
                    OrderStatus::Pending | OrderStatus::Processing => OrderStatus::Cancelled,
                    other => other,
                }
            }
        };

        Ok(Applied::Changed {
            state: Self {
                status,
                payment: to,
            },
            settled: to == P::Paid,
        })
    }

    /// Move the order to a new fulfilment status (back-office action).
    ///
    /// Setting the current status again is accepted and returns `self`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::Order`] for moves outside the lifecycle and
    /// [`TransitionError::PaymentRequired`] when fulfilling an unpaid order.
    pub fn transition_to(self, next: OrderStatus) -> Result<Self, TransitionError> {
        use OrderStatus as O;

        if self.status == next {
            return Ok(self);
        }

        let allowed = matches!(
            (self.status, next),
            (O::Pending, O::Processing | O::Cancelled)
                | (O::Processing, O::Shipped | O::Cancelled)
                | (O::Shipped, O::Delivered)
        );
        if !allowed {
            return Err(TransitionError::Order {
                from: self.status,
                to: next,
            });
        }

        if matches!(next, O::Processing | O::Shipped) && self.payment != PaymentStatus::Paid {
            return Err(TransitionError::PaymentRequired { to: next });
        }
        if next == O::Cancelled && self.payment == PaymentStatus::Paid {
            return Err(TransitionError::RefundRequired);
        }

        let payment = if next == O::Cancelled && self.payment.is_open() {
            PaymentStatus::Failed
        } else {
            self.payment
        };

        Ok(Self {
            status: next,
            payment,
        })
    }

    /// Cancel on behalf of the buyer.
    ///
    /// Buyers may only cancel orders they have not paid for yet.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::Order`] if the order is past `pending` or
    /// [`TransitionError::Payment`] if payment is no longer open.
    pub fn cancel_by_buyer(self) -> Result<Self, TransitionError> {
        if self.status != OrderStatus::Pending {
            return Err(TransitionError::Order {
                from: self.status,
                to: OrderStatus::Cancelled,
            });
        }
        if !self.payment.is_open() {
            return Err(TransitionError::Payment {
                from: self.payment,
                to: PaymentStatus::Failed,
            });
        }
        self.transition_to(OrderStatus::Cancelled)
    }

    /// Whether moving to `next` cancels the order, releasing its promo use.
    #[must_use]
    pub const fn releases_promo_use(self, next: Self) -> bool {
        matches!(next.status, OrderStatus::Cancelled)
            && !matches!(self.status, OrderStatus::Cancelled)
    }

    /// Whether moving to `next` must put the order's quantities back into
    /// stock (they were taken out at settlement).
    #[must_use]
    pub const fn restores_stock(self, next: Self) -> bool {
        self.releases_promo_use(next) && matches!(self.payment, PaymentStatus::Paid)
    }

    /// Whether a payment token may be issued for this order.
    #[must_use]
    pub const fn accepts_payment(self) -> bool {
        self.payment.is_open() && matches!(self.status, OrderStatus::Pending)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn state(status: OrderStatus, payment: PaymentStatus) -> OrderState {
        OrderState { status, payment }
    }

    #[test]
    fn test_paid_moves_pending_order_to_processing() {
        let applied = OrderState::new().apply_payment(PaymentEvent::Paid).unwrap();
        assert_eq!(
            applied,
            Applied::Changed {
                state: state(OrderStatus::Processing, PaymentStatus::Paid),
                settled: true,
            }
        );
    }

    #[test]
    fn test_duplicate_settlement_is_unchanged() {
        let paid = state(OrderStatus::Processing, PaymentStatus::Paid);
        assert_eq!(
            paid.apply_payment(PaymentEvent::Paid).unwrap(),
            Applied::Unchanged
        );
    }

    #[test]
    fn test_pending_then_paid_settles_once() {
        let Applied::Changed { state: s, settled } = OrderState::new()
            .apply_payment(PaymentEvent::Pending)
            .unwrap()
        else {
            panic!("expected change");
        };
        assert!(!settled);
        assert_eq!(s.status, OrderStatus::Pending);

        let Applied::Changed { settled, .. } = s.apply_payment(PaymentEvent::Paid).unwrap() else {
            panic!("expected change");
        };
        assert!(settled);
    }

    #[test]
    fn test_failure_and_expiry_cancel_the_order() {
        for event in [PaymentEvent::Failed, PaymentEvent::Expired] {
            let Applied::Changed { state: s, settled } =
                OrderState::new().apply_payment(event).unwrap()
            else {
                panic!("expected change");
            };
            assert_eq!(s.status, OrderStatus::Cancelled);
            assert!(!settled);
        }
    }

    #[test]
    fn test_paid_cannot_go_back_to_pending() {
        let paid = state(OrderStatus::Processing, PaymentStatus::Paid);
        assert_eq!(
            paid.apply_payment(PaymentEvent::Pending),
            Err(TransitionError::Payment {
                from: PaymentStatus::Paid,
                to: PaymentStatus::Pending,
            })
        );
    }

    #[test]
    fn test_refund_only_after_paid() {
        assert!(OrderState::new().apply_payment(PaymentEvent::Refunded).is_err());

        let delivered = state(OrderStatus::Delivered, PaymentStatus::Paid);
        let Applied::Changed { state: s, .. } =
            delivered.apply_payment(PaymentEvent::Refunded).unwrap()
        else {
            panic!("expected change");
        };
        assert_eq!(s.status, OrderStatus::Delivered);
        assert_eq!(s.payment, PaymentStatus::Refunded);
    }

    #[test]
    fn test_payment_for_cancelled_order_is_rejected() {
        let cancelled = state(OrderStatus::Cancelled, PaymentStatus::Pending);
        assert_eq!(
            cancelled.apply_payment(PaymentEvent::Paid),
            Err(TransitionError::Cancelled)
        );
    }

    #[test]
    fn test_fulfilment_requires_payment() {
        assert_eq!(
            OrderState::new().transition_to(OrderStatus::Processing),
            Err(TransitionError::PaymentRequired {
                to: OrderStatus::Processing
            })
        );

        let paid = state(OrderStatus::Processing, PaymentStatus::Paid);
        let shipped = paid.transition_to(OrderStatus::Shipped).unwrap();
        let delivered = shipped.transition_to(OrderStatus::Delivered).unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
    }

    #[test]
    fn test_fulfilment_cannot_skip_or_reverse() {
        let paid = state(OrderStatus::Processing, PaymentStatus::Paid);
        assert!(paid.transition_to(OrderStatus::Delivered).is_err());
        assert!(paid.transition_to(OrderStatus::Pending).is_err());

        let delivered = state(OrderStatus::Delivered, PaymentStatus::Paid);
        assert!(delivered.transition_to(OrderStatus::Cancelled).is_err());
    }

    #[test]
    fn test_cancel_closes_open_payment() {
        let cancelled = OrderState::new().cancel_by_buyer().unwrap();
        assert_eq!(
            cancelled,
            state(OrderStatus::Cancelled, PaymentStatus::Failed)
        );
        assert!(!cancelled.accepts_payment());
    }

    #[test]
    fn test_buyer_cannot_cancel_paid_order() {
        let paid = state(OrderStatus::Processing, PaymentStatus::Paid);
        assert!(paid.cancel_by_buyer().is_err());
    }

    #[test]
    fn test_paid_order_is_cancelled_only_by_refund() {
        let paid = state(OrderStatus::Processing, PaymentStatus::Paid);
        assert_eq!(
            paid.transition_to(OrderStatus::Cancelled),
            Err(TransitionError::RefundRequired)
        );

        let Applied::Changed { state: refunded, settled } =
            paid.apply_payment(PaymentEvent::Refunded).unwrap()
        else {
            panic!("expected change");
        };
        assert!(!settled);
        assert_eq!(
            refunded,
            state(OrderStatus::Cancelled, PaymentStatus::Refunded)
        );
        assert!(paid.restores_stock(refunded));
        assert!(paid.releases_promo_use(refunded));
    }

    #[test]
    fn test_cancelled_order_never_keeps_paid_status() {
        let statuses = [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ];
        let payments = [
            PaymentStatus::Unpaid,
            PaymentStatus::Pending,
            PaymentStatus::Paid,
            PaymentStatus::Failed,
            PaymentStatus::Expired,
            PaymentStatus::Refunded,
        ];
        for from in statuses {
            for payment in payments {
                let current = state(from, payment);
                if let Ok(next) = current.transition_to(OrderStatus::Cancelled)
                    && next != current
                {
                    assert_ne!(next.payment, PaymentStatus::Paid, "{current:?}");
                }
            }
        }
    }

    #[test]
    fn test_unpaid_cancellation_releases_promo_but_not_stock() {
        let open = OrderState::new();
        let cancelled = open.cancel_by_buyer().unwrap();
        assert!(open.releases_promo_use(cancelled));
        assert!(!open.restores_stock(cancelled));

        let Applied::Changed { state: expired, .. } =
            open.apply_payment(PaymentEvent::Expired).unwrap()
        else {
            panic!("expected change");
        };
        assert!(open.releases_promo_use(expired));
        assert!(!open.restores_stock(expired));
    }

    #[test]
    fn test_refund_after_delivery_releases_nothing() {
        let delivered = state(OrderStatus::Delivered, PaymentStatus::Paid);
        let Applied::Changed { state: refunded, .. } =
            delivered.apply_payment(PaymentEvent::Refunded).unwrap()
        else {
            panic!("expected change");
        };
        assert!(!delivered.releases_promo_use(refunded));
        assert!(!delivered.restores_stock(refunded));
    }

    #[test]
    fn test_same_status_is_accepted() {
        let s = OrderState::new();
        assert_eq!(s.transition_to(OrderStatus::Pending), Ok(s));
    }
}
