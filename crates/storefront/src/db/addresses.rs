//! Saved shipping addresses.
//!
//! A user has at most one default address (partial unique index). The first
//! address a user saves becomes the default, and deleting the default promotes
//! the most recently created remaining address.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use omahring_core::{AddressId, UserId};

use super::RepositoryError;
use crate::models::Address;
use crate::models::user::AddressInput;

const ADDRESS_COLUMNS: &str = "id, user_id, label, recipient_name, phone, street, city, \
                               province, postal_code, is_default, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct AddressRow {
    id: AddressId,
    user_id: UserId,
    label: String,
    recipient_name: String,
    phone: String,
    street: String,
    city: String,
    province: String,
    postal_code: String,
    is_default: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AddressRow> for Address {
    fn from(r: AddressRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            label: r.label,
            recipient_name: r.recipient_name,
            phone: r.phone,
            street: r.street,
            city: r.city,
            province: r.province,
            postal_code: r.postal_code,
            is_default: r.is_default,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Repository for address database operations.
pub struct AddressRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AddressRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All addresses of a user, default first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<Address>, RepositoryError> {
        let rows = sqlx::query_as::<_, AddressRow>(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM storefront.address \
             WHERE user_id = $1 \
             ORDER BY is_default DESC, created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Address::from).collect())
    }

    /// One address, scoped to its owner.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(
        &self,
        user_id: UserId,
        id: AddressId,
    ) -> Result<Option<Address>, RepositoryError> {
        let row = sqlx::query_as::<_, AddressRow>(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM storefront.address WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Address::from))
    }

    /// The user's default address, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_default(&self, user_id: UserId) -> Result<Option<Address>, RepositoryError> {
        let row = sqlx::query_as::<_, AddressRow>(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM storefront.address \
             WHERE user_id = $1 AND is_default"
        ))
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Address::from))
    }

    /// Save a new address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create(
        &self,
        user_id: UserId,
        input: &AddressInput,
    ) -> Result<Address, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let has_any: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM storefront.address WHERE user_id = $1)",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let is_default = input.is_default || !has_any;
        if is_default {
            clear_default(&mut tx, user_id).await?;
        }

        let row = sqlx::query_as::<_, AddressRow>(&format!(
            "INSERT INTO storefront.address \
                 (user_id, label, recipient_name, phone, street, city, province, postal_code, is_default) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {ADDRESS_COLUMNS}"
        ))
        .bind(user_id)
        .bind(&input.label)
        .bind(&input.recipient_name)
        .bind(&input.phone)
        .bind(&input.street)
        .bind(&input.city)
        .bind(&input.province)
        .bind(&input.postal_code)
        .bind(is_default)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    /// Replace an address's fields.
    ///
    /// Unsetting `is_default` on the default address is ignored; choose a
    /// different default instead.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the address does not belong to the user.
    pub async fn update(
        &self,
        user_id: UserId,
        id: AddressId,
        input: &AddressInput,
    ) -> Result<Address, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if input.is_default {
            sqlx::query(
                "UPDATE storefront.address SET is_default = FALSE \
                 WHERE user_id = $1 AND is_default AND id <> $2",
            )
            .bind(user_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        let row = sqlx::query_as::<_, AddressRow>(&format!(
            "UPDATE storefront.address SET \
                 label = $3, recipient_name = $4, phone = $5, street = $6, city = $7, \
                 province = $8, postal_code = $9, is_default = is_default OR $10, \
                 updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 \
             RETURNING {ADDRESS_COLUMNS}"
        ))
        .bind(id)
        .bind(user_id)
        .bind(&input.label)
        .bind(&input.recipient_name)
        .bind(&input.phone)
        .bind(&input.street)
        .bind(&input.city)
        .bind(&input.province)
        .bind(&input.postal_code)
        .bind(input.is_default)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        tx.commit().await?;
        Ok(row.into())
    }

    /// Delete an address, promoting another one if it was the default.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the address does not belong to the user.
    pub async fn delete(&self, user_id: UserId, id: AddressId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let was_default: bool = sqlx::query_scalar(
            "DELETE FROM storefront.address WHERE id = $1 AND user_id = $2 RETURNING is_default",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        if was_default {
            sqlx::query(
                "UPDATE storefront.address SET is_default = TRUE \
                 WHERE id = ( \
                     SELECT id FROM storefront.address WHERE user_id = $1 \
                     ORDER BY created_at DESC LIMIT 1 \
                 )",
            )
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn clear_default(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE storefront.address SET is_default = FALSE WHERE user_id = $1 AND is_default")
        .bind(user_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
