//! Status enums for various entities.
//!
//! Each enum maps to a `PostgreSQL` enum type in the `storefront` schema when
//! the `postgres` feature is enabled, and to `snake_case` strings in JSON.

use serde::{Deserialize, Serialize};

/// Fulfilment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Every order status, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Processing,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether no further fulfilment transitions are possible.
    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

/// Payment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.payment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Order created, no payment attempt reported yet.
    #[default]
    Unpaid,
    /// The gateway reported a transaction awaiting completion.
    Pending,
    Paid,
    Failed,
    Expired,
    Refunded,
}

impl PaymentStatus {
    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Refunded => "refunded",
        }
    }

    /// Whether the customer can still pay for the order.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Unpaid | Self::Pending)
    }
}

/// Account role.
///
/// `Member` is the paid membership tier; `Admin` and `Manager` can manage the
/// catalog, orders, promos and posts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    User,
    Member,
    Admin,
    Manager,
}

impl UserRole {
    /// Whether the role may use back-office endpoints.
    #[must_use]
    pub const fn is_staff(self) -> bool {
        matches!(self, Self::Admin | Self::Manager)
    }

    /// Whether the role gets member-only benefits.
    ///
    /// Staff accounts count as members.
    #[must_use]
    pub const fn is_member(self) -> bool {
        !matches!(self, Self::User)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Member => write!(f, "member"),
            Self::Admin => write!(f, "admin"),
            Self::Manager => write!(f, "manager"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "member" => Ok(Self::Member),
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            _ => Err(format!("invalid user role: {s}")),
        }
    }
}

/// How a promo's value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.promo_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PromoType {
    /// Value is a percentage of the subtotal (0-100).
    Percentage,
    /// Value is a fixed Rupiah amount.
    Fixed,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [
            UserRole::User,
            UserRole::Member,
            UserRole::Admin,
            UserRole::Manager,
        ] {
            assert_eq!(role.to_string().parse::<UserRole>().unwrap(), role);
        }
        assert!("owner".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_role_privileges() {
        assert!(!UserRole::User.is_member());
        assert!(UserRole::Member.is_member());
        assert!(!UserRole::Member.is_staff());
        assert!(UserRole::Manager.is_staff());
    }

    #[test]
    fn test_status_json_names() {
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Unpaid).unwrap(),
            "\"unpaid\""
        );
        assert_eq!(
            serde_json::from_str::<OrderStatus>("\"processing\"").unwrap(),
            OrderStatus::Processing
        );
        for status in OrderStatus::ALL {
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{}\"", status.as_str())
            );
        }
    }
}
