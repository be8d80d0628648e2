//! Promo code repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use omahring_core::promo::PromoRules;
use omahring_core::{PromoId, PromoType};

use super::RepositoryError;
use crate::models::Promo;
use crate::models::promo::PromoInput;

const PROMO_COLUMNS: &str = "id, code, description, promo_type, value, min_purchase, \
                             max_discount, starts_at, ends_at, usage_limit, used_count, \
                             is_active, member_only, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PromoRow {
    id: PromoId,
    code: String,
    description: String,
    promo_type: PromoType,
    value: Decimal,
    min_purchase: Option<Decimal>,
    max_discount: Option<Decimal>,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    usage_limit: Option<i32>,
    used_count: i32,
    is_active: bool,
    member_only: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PromoRow> for Promo {
    fn from(r: PromoRow) -> Self {
        Self {
            id: r.id,
            code: r.code,
            description: r.description,
            rules: PromoRules {
                promo_type: r.promo_type,
                value: r.value,
                min_purchase: r.min_purchase,
                max_discount: r.max_discount,
                starts_at: r.starts_at,
                ends_at: r.ends_at,
                usage_limit: r.usage_limit,
                used_count: r.used_count,
                is_active: r.is_active,
                member_only: r.member_only,
            },
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Repository for promo database operations.
pub struct PromoRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PromoRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All promos, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Promo>, RepositoryError> {
        let rows = sqlx::query_as::<_, PromoRow>(&format!(
            "SELECT {PROMO_COLUMNS} FROM storefront.promo ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Promo::from).collect())
    }

    /// Look up a promo by its normalized code.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_code(&self, code: &str) -> Result<Option<Promo>, RepositoryError> {
        let row = sqlx::query_as::<_, PromoRow>(&format!(
            "SELECT {PROMO_COLUMNS} FROM storefront.promo WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Promo::from))
    }

    /// Create a promo. `code` must already be normalized.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code is taken.
    pub async fn create(&self, code: &str, input: &PromoInput) -> Result<Promo, RepositoryError> {
        let r = &input.rules;
        let row = sqlx::query_as::<_, PromoRow>(&format!(
            "INSERT INTO storefront.promo \
                 (code, description, promo_type, value, min_purchase, max_discount, \
                  starts_at, ends_at, usage_limit, is_active, member_only) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {PROMO_COLUMNS}"
        ))
        .bind(code)
        .bind(&input.description)
        .bind(r.promo_type)
        .bind(r.value)
        .bind(r.min_purchase)
        .bind(r.max_discount)
        .bind(r.starts_at)
        .bind(r.ends_at)
        .bind(r.usage_limit)
        .bind(r.is_active)
        .bind(r.member_only)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "promo code"))?;

        Ok(row.into())
    }

    /// Replace a promo's fields. The used count is kept.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the promo does not exist and
    /// `RepositoryError::Conflict` if the new code is taken.
    pub async fn update(
        &self,
        id: PromoId,
        code: &str,
        input: &PromoInput,
    ) -> Result<Promo, RepositoryError> {
        let r = &input.rules;
        let row = sqlx::query_as::<_, PromoRow>(&format!(
            "UPDATE storefront.promo SET \
                 code = $2, description = $3, promo_type = $4, value = $5, \
                 min_purchase = $6, max_discount = $7, starts_at = $8, ends_at = $9, \
                 usage_limit = $10, is_active = $11, member_only = $12, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {PROMO_COLUMNS}"
        ))
        .bind(id)
        .bind(code)
        .bind(&input.description)
        .bind(r.promo_type)
        .bind(r.value)
        .bind(r.min_purchase)
        .bind(r.max_discount)
        .bind(r.starts_at)
        .bind(r.ends_at)
        .bind(r.usage_limit)
        .bind(r.is_active)
        .bind(r.member_only)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "promo code"))?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    /// Delete a promo. Orders keep the code they were placed with.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the promo does not exist.
    pub async fn delete(&self, id: PromoId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.promo WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
