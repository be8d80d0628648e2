//! Promo code eligibility and discount calculation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{PromoType, UserRole};

/// Why a promo cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromoError {
    #[error("promo is not active")]
    Inactive,

    #[error("promo is not valid yet")]
    NotStarted,

    #[error("promo has expired")]
    Expired,

    #[error("promo usage limit reached")]
    UsageLimitReached,

    #[error("minimum purchase of {minimum} not met")]
    BelowMinimum { minimum: Decimal },

    #[error("promo is for members only")]
    MembersOnly,

    #[error("cart is empty")]
    EmptyCart,
}

/// The eligibility rules and value of a promo code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoRules {
    pub promo_type: PromoType,
    /// Percentage (0-100) or fixed Rupiah amount, depending on `promo_type`.
    pub value: Decimal,
    #[serde(default)]
    pub min_purchase: Option<Decimal>,
    /// Upper bound for percentage discounts.
    #[serde(default)]
    pub max_discount: Option<Decimal>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub usage_limit: Option<i32>,
    #[serde(default)]
    pub used_count: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub member_only: bool,
}

const fn default_active() -> bool {
    true
}

impl PromoRules {
    /// Compute the discount for a subtotal.
    ///
    /// The result never exceeds the subtotal.
    ///
    /// # Errors
    ///
    /// Returns the first [`PromoError`] that makes the promo unusable.
    pub fn evaluate(
        &self,
        subtotal: Decimal,
        role: UserRole,
        now: DateTime<Utc>,
    ) -> Result<Decimal, PromoError> {
        if !self.is_active {
            return Err(PromoError::Inactive);
        }
        if self.starts_at.is_some_and(|start| now < start) {
            return Err(PromoError::NotStarted);
        }
        if self.ends_at.is_some_and(|end| now > end) {
            return Err(PromoError::Expired);
        }
        if self
            .usage_limit
            .is_some_and(|limit| self.used_count >= limit)
        {
            return Err(PromoError::UsageLimitReached);
        }
        if self.member_only && !role.is_member() {
            return Err(PromoError::MembersOnly);
        }
        if subtotal <= Decimal::ZERO {
            return Err(PromoError::EmptyCart);
        }
        if let Some(minimum) = self.min_purchase
            && subtotal < minimum
        {
            return Err(PromoError::BelowMinimum { minimum });
        }

        let raw = match self.promo_type {
            PromoType::Percentage => {
                let pct = (subtotal * self.value / Decimal::ONE_HUNDRED).round_dp(0);
                self.max_discount.map_or(pct, |cap| pct.min(cap))
            }
            PromoType::Fixed => self.value,
        };

        Ok(raw.clamp(Decimal::ZERO, subtotal))
    }

    /// Validate the rule values themselves (admin input).
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.value <= Decimal::ZERO {
            return Err("value must be positive".to_owned());
        }
        if self.promo_type == PromoType::Percentage && self.value > Decimal::ONE_HUNDRED {
            return Err("percentage cannot exceed 100".to_owned());
        }
        if self.min_purchase.is_some_and(|m| m < Decimal::ZERO)
            || self.max_discount.is_some_and(|m| m < Decimal::ZERO)
        {
            return Err("amounts cannot be negative".to_owned());
        }
        if let (Some(start), Some(end)) = (self.starts_at, self.ends_at)
            && end < start
        {
            return Err("end date is before start date".to_owned());
        }
        if self.usage_limit.is_some_and(|l| l < 0) {
            return Err("usage limit cannot be negative".to_owned());
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn rules(promo_type: PromoType, value: i64) -> PromoRules {
        PromoRules {
            promo_type,
            value: Decimal::new(value, 0),
            min_purchase: None,
            max_discount: None,
            starts_at: None,
            ends_at: None,
            usage_limit: None,
            used_count: 0,
            is_active: true,
            member_only: false,
        }
    }

    fn idr(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    #[test]
    fn test_percentage_with_cap() {
        let mut promo = rules(PromoType::Percentage, 10);
        let now = Utc::now();
        assert_eq!(promo.evaluate(idr(200_000), UserRole::User, now), Ok(idr(20_000)));

        promo.max_discount = Some(idr(15_000));
        assert_eq!(promo.evaluate(idr(200_000), UserRole::User, now), Ok(idr(15_000)));
    }

    #[test]
    fn test_fixed_never_exceeds_subtotal() {
        let promo = rules(PromoType::Fixed, 50_000);
        assert_eq!(
            promo.evaluate(idr(30_000), UserRole::User, Utc::now()),
            Ok(idr(30_000))
        );
    }

    #[test]
    fn test_window_and_usage() {
        let now = Utc::now();
        let mut promo = rules(PromoType::Fixed, 5_000);

        promo.starts_at = Some(now + Duration::days(1));
        assert_eq!(
            promo.evaluate(idr(10_000), UserRole::User, now),
            Err(PromoError::NotStarted)
        );

        promo.starts_at = None;
        promo.ends_at = Some(now - Duration::days(1));
        assert_eq!(
            promo.evaluate(idr(10_000), UserRole::User, now),
            Err(PromoError::Expired)
        );

        promo.ends_at = None;
        promo.usage_limit = Some(3);
        promo.used_count = 3;
        assert_eq!(
            promo.evaluate(idr(10_000), UserRole::User, now),
            Err(PromoError::UsageLimitReached)
        );
    }

    #[test]
    fn test_minimum_and_membership() {
        let now = Utc::now();
        let mut promo = rules(PromoType::Fixed, 5_000);
        promo.min_purchase = Some(idr(100_000));
        assert_eq!(
            promo.evaluate(idr(99_999), UserRole::User, now),
            Err(PromoError::BelowMinimum {
                minimum: idr(100_000)
            })
        );

        promo.min_purchase = None;
        promo.member_only = true;
        assert_eq!(
            promo.evaluate(idr(10_000), UserRole::User, now),
            Err(PromoError::MembersOnly)
        );
        assert_eq!(
            promo.evaluate(idr(10_000), UserRole::Member, now),
            Ok(idr(5_000))
        );
    }

    #[test]
    fn test_inactive_and_empty() {
        let now = Utc::now();
        let mut promo = rules(PromoType::Fixed, 5_000);
        assert_eq!(
            promo.evaluate(Decimal::ZERO, UserRole::User, now),
            Err(PromoError::EmptyCart)
        );
        promo.is_active = false;
        assert_eq!(
            promo.evaluate(idr(10_000), UserRole::User, now),
            Err(PromoError::Inactive)
        );
    }

    #[test]
    fn test_rules_deserialize_with_defaults() {
        let promo: PromoRules =
            serde_json::from_str(r#"{"promo_type":"fixed","value":"10000"}"#).unwrap();
        assert!(promo.is_active);
        assert!(!promo.member_only);
        assert_eq!(promo.used_count, 0);
        assert_eq!(promo.usage_limit, None);
    }

    #[test]
    fn test_validate_rules() {
        assert!(rules(PromoType::Percentage, 50).validate().is_ok());
        assert!(rules(PromoType::Percentage, 150).validate().is_err());
        assert!(rules(PromoType::Fixed, 0).validate().is_err());
    }
}
