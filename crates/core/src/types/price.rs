//! Type-safe price representation using decimal arithmetic.
//!
//! The store sells in Indonesian Rupiah. Rupiah has no minor unit in
//! practice, and the payment gateway only accepts whole amounts, so
//! [`Price::gross_amount`] rounds to an integer at the boundary while all
//! internal arithmetic stays in [`Decimal`].

use std::iter::Sum;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit.
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Create a Rupiah price.
    #[must_use]
    pub const fn idr(amount: Decimal) -> Self {
        Self::new(amount, CurrencyCode::IDR)
    }

    /// Zero Rupiah.
    #[must_use]
    pub const fn zero() -> Self {
        Self::idr(Decimal::ZERO)
    }

    /// Price of `quantity` units.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self::new(self.amount * Decimal::from(quantity), self.currency_code)
    }

    /// Subtract `other`, never going below zero.
    #[must_use]
    pub fn saturating_sub(self, other: Decimal) -> Self {
        Self::new((self.amount - other).max(Decimal::ZERO), self.currency_code)
    }

    /// Whole-unit amount as sent to the payment gateway.
    ///
    /// Rounds half away from zero. Returns `None` if the amount does not fit
    /// in an `i64`.
    #[must_use]
    pub fn gross_amount(&self) -> Option<i64> {
        self.amount
            .round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
    }

    /// Format for display, e.g. `Rp150.000`.
    #[must_use]
    pub fn display(&self) -> String {
        let whole = self.gross_amount().unwrap_or_default();
        let digits = whole.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(c);
        }
        let sign = if whole < 0 { "-" } else { "" };
        format!("{sign}{}{grouped}", self.currency_code.symbol())
    }
}

impl Default for Price {
    fn default() -> Self {
        Self::zero()
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, p| {
            Self::new(acc.amount + p.amount, p.currency_code)
        })
    }
}

/// ISO 4217 currency codes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum CurrencyCode {
    #[default]
    IDR,
}

impl CurrencyCode {
    /// Display symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::IDR => "Rp",
        }
    }
}
