//! User and address domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use omahring_core::{AddressId, Email, UserId, UserRole};

/// A registered customer or staff account.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A saved shipping address.
///
/// At most one address per user has `is_default` set.
#[derive(Debug, Clone, Serialize)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    /// Short name chosen by the user ("Rumah", "Kantor").
    pub label: String,
    pub recipient_name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when creating or replacing an address.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressInput {
    pub label: String,
    pub recipient_name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    #[serde(default)]
    pub is_default: bool,
}

impl AddressInput {
    /// Check that no required field is blank.
    ///
    /// # Errors
    ///
    /// Returns the name of the first blank field.
    pub fn validate(&self) -> Result<(), &'static str> {
        let fields = [
            ("label", &self.label),
            ("recipient_name", &self.recipient_name),
            ("phone", &self.phone),
            ("street", &self.street),
            ("city", &self.city),
            ("province", &self.province),
            ("postal_code", &self.postal_code),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> AddressInput {
        AddressInput {
            label: "Rumah".to_string(),
            recipient_name: "Budi Santoso".to_string(),
            phone: "081234567890".to_string(),
            street: "Jl. Kenari No. 12".to_string(),
            city: "Yogyakarta".to_string(),
            province: "DI Yogyakarta".to_string(),
            postal_code: "55281".to_string(),
            is_default: true,
        }
    }

    #[test]
    fn test_address_input_validation() {
        assert!(input().validate().is_ok());

        let mut blank_city = input();
        blank_city.city = "   ".to_string();
        assert_eq!(blank_city.validate(), Err("city"));
    }
}
