//! Promo code domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use omahring_core::PromoId;
use omahring_core::promo::PromoRules;

/// A stored promo code.
#[derive(Debug, Clone, Serialize)]
pub struct Promo {
    pub id: PromoId,
    /// Upper-case code the buyer types in.
    pub code: String,
    pub description: String,
    #[serde(flatten)]
    pub rules: PromoRules,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Promo fields accepted from the back office.
#[derive(Debug, Clone, Deserialize)]
pub struct PromoInput {
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub rules: PromoRules,
}

/// Normalize a promo code as typed by a user.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}
