//! Catalog repository: products and their variants.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use omahring_core::{ProductId, VariantId};

use super::{RepositoryError, to_i32, to_u32};
use crate::models::product::{ProductInput, VariantInput};
use crate::models::{Product, Variant};

const PRODUCT_COLUMNS: &str =
    "id, name, slug, description, category, images, is_active, created_at, updated_at";
const VARIANT_COLUMNS: &str = "id, product_id, name, price, sale_price, stock";

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    slug: String,
    description: String,
    category: String,
    images: Vec<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_product(self, variants: Vec<Variant>) -> Product {
        Product {
            id: self.id,
            name: self.name,
            slug: self.slug,
            description: self.description,
            category: self.category,
            images: self.images,
            is_active: self.is_active,
            variants,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VariantRow {
    id: VariantId,
    product_id: ProductId,
    name: String,
    price: Decimal,
    sale_price: Option<Decimal>,
    stock: i32,
}

impl TryFrom<VariantRow> for Variant {
    type Error = RepositoryError;

    fn try_from(r: VariantRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            product_id: r.product_id,
            name: r.name,
            price: r.price,
            sale_price: r.sale_price,
            stock: to_u32(r.stock, "stock")?,
        })
    }
}

/// Public catalog listing filters.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category: Option<String>,
    /// Case-insensitive substring match on name and description.
    pub search: Option<String>,
    /// Include inactive products (back office only).
    pub include_inactive: bool,
    pub limit: i64,
    pub offset: i64,
}

/// A variant that can currently be put in a cart, with its product name.
#[derive(Debug, Clone)]
pub struct PurchasableVariant {
    pub product_name: String,
    pub variant: Variant,
}

/// Repository for catalog database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List products matching `filter`, newest first, with the total match count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list(&self, filter: &ProductFilter) -> Result<(Vec<Product>, i64), RepositoryError> {
        let pattern = filter
            .search
            .as_deref()
            .map(|s| format!("%{}%", escape_like(s.trim())));
        let where_clause = "WHERE ($1::text IS NULL OR category = $1) \
                              AND ($2::text IS NULL OR name ILIKE $2 OR description ILIKE $2) \
                              AND ($3 OR is_active)";

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM storefront.product {where_clause}"
        ))
        .bind(filter.category.as_deref())
        .bind(pattern.as_deref())
        .bind(filter.include_inactive)
        .fetch_one(self.pool)
        .await?;

        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM storefront.product {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT $4 OFFSET $5"
        ))
        .bind(filter.category.as_deref())
        .bind(pattern.as_deref())
        .bind(filter.include_inactive)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(self.pool)
        .await?;

        let products = self.attach_variants(rows).await?;
        Ok((products, total))
    }

    /// Get a product by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_by_slug(
        &self,
        slug: &str,
        include_inactive: bool,
    ) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM storefront.product \
             WHERE slug = $1 AND ($2 OR is_active)"
        ))
        .bind(slug)
        .bind(include_inactive)
        .fetch_optional(self.pool)
        .await?;

        Ok(self.attach_variants(row.into_iter().collect()).await?.pop())
    }

    /// Get a product by id, active or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM storefront.product WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(self.attach_variants(row.into_iter().collect()).await?.pop())
    }

    /// Look up a variant of an active product.
    ///
    /// Returns `None` if the product is missing or inactive, or the variant
    /// does not belong to it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_purchasable(
        &self,
        product_id: ProductId,
        variant_id: VariantId,
    ) -> Result<Option<PurchasableVariant>, RepositoryError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            product_name: String,
            #[sqlx(flatten)]
            variant: VariantRow,
        }

        let row = sqlx::query_as::<_, Row>(
            "SELECT p.name AS product_name, v.id, v.product_id, v.name, v.price, v.sale_price, v.stock \
             FROM storefront.product_variant v \
             JOIN storefront.product p ON p.id = v.product_id \
             WHERE v.id = $1 AND v.product_id = $2 AND p.is_active",
        )
        .bind(variant_id)
        .bind(product_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| {
            Ok(PurchasableVariant {
                product_name: r.product_name,
                variant: r.variant.try_into()?,
            })
        })
        .transpose()
    }

    /// Create a product with its variants.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    pub async fn create(&self, input: &ProductInput) -> Result<Product, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO storefront.product (name, slug, description, category, images, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(input.name.trim())
        .bind(&input.slug)
        .bind(&input.description)
        .bind(input.category.trim())
        .bind(&input.images)
        .bind(input.is_active)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::unique(e, "slug"))?;

        let variants = upsert_variants(&mut tx, row.id, &input.variants).await?;
        tx.commit().await?;

        Ok(row.into_product(variants))
    }

    /// Replace a product's fields and variant list.
    ///
    /// Variants are matched by name: matching ones are updated in place (so
    /// cart lines keep pointing at them), new ones inserted and missing ones
    /// deleted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist and
    /// `RepositoryError::Conflict` if the new slug is taken.
    pub async fn update(
        &self,
        id: ProductId,
        input: &ProductInput,
    ) -> Result<Product, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE storefront.product SET \
                 name = $2, slug = $3, description = $4, category = $5, images = $6, \
                 is_active = $7, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(input.name.trim())
        .bind(&input.slug)
        .bind(&input.description)
        .bind(input.category.trim())
        .bind(&input.images)
        .bind(input.is_active)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| RepositoryError::unique(e, "slug"))?
        .ok_or(RepositoryError::NotFound)?;

        let names: Vec<String> = input
            .variants
            .iter()
            .map(|v| v.name.trim().to_string())
            .collect();
        sqlx::query(
            "DELETE FROM storefront.product_variant WHERE product_id = $1 AND name <> ALL($2)",
        )
        .bind(id)
        .bind(&names)
        .execute(&mut *tx)
        .await?;

        let variants = upsert_variants(&mut tx, id, &input.variants).await?;
        tx.commit().await?;

        Ok(row.into_product(variants))
    }

    /// Delete a product. Its variants and any cart lines go with it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.product WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Set a variant's stock count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the variant does not belong to the product.
    pub async fn set_stock(
        &self,
        product_id: ProductId,
        variant_id: VariantId,
        stock: u32,
    ) -> Result<Variant, RepositoryError> {
        let row = sqlx::query_as::<_, VariantRow>(&format!(
            "UPDATE storefront.product_variant SET stock = $3 \
             WHERE id = $1 AND product_id = $2 \
             RETURNING {VARIANT_COLUMNS}"
        ))
        .bind(variant_id)
        .bind(product_id)
        .bind(to_i32(stock, "stock")?)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    async fn attach_variants(&self, rows: Vec<ProductRow>) -> Result<Vec<Product>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = rows.iter().map(|r| r.id.as_i32()).collect();
        let variant_rows = sqlx::query_as::<_, VariantRow>(&format!(
            "SELECT {VARIANT_COLUMNS} FROM storefront.product_variant \
             WHERE product_id = ANY($1) \
             ORDER BY position, id"
        ))
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;

        let mut by_product: HashMap<ProductId, Vec<Variant>> = HashMap::new();
        for row in variant_rows {
            let variant = Variant::try_from(row)?;
            by_product.entry(variant.product_id).or_default().push(variant);
        }

        Ok(rows
            .into_iter()
            .map(|r| {
                let variants = by_product.remove(&r.id).unwrap_or_default();
                r.into_product(variants)
            })
            .collect())
    }
}

/// Stock of each variant, locked for the rest of the transaction.
///
/// Variants of inactive products are left out.
pub(crate) async fn lock_stock(
    tx: &mut Transaction<'_, Postgres>,
    variant_ids: &[VariantId],
) -> Result<HashMap<VariantId, u32>, RepositoryError> {
    let ids: Vec<i32> = variant_ids.iter().map(VariantId::as_i32).collect();
    let rows: Vec<(VariantId, i32)> = sqlx::query_as(
        "SELECT v.id, v.stock FROM storefront.product_variant v \
         JOIN storefront.product p ON p.id = v.product_id \
         WHERE v.id = ANY($1) AND p.is_active \
         FOR UPDATE OF v",
    )
    .bind(&ids)
    .fetch_all(&mut **tx)
    .await?;

    rows.into_iter()
        .map(|(id, stock)| Ok((id, to_u32(stock, "stock")?)))
        .collect()
}

async fn upsert_variants(
    tx: &mut Transaction<'_, Postgres>,
    product_id: ProductId,
    variants: &[VariantInput],
) -> Result<Vec<Variant>, RepositoryError> {
    let mut saved = Vec::with_capacity(variants.len());
    for (position, v) in (0_i32..).zip(variants) {
        let row = sqlx::query_as::<_, VariantRow>(&format!(
            "INSERT INTO storefront.product_variant \
                 (product_id, name, price, sale_price, stock, position) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (product_id, name) DO UPDATE SET \
                 price = EXCLUDED.price, \
                 sale_price = EXCLUDED.sale_price, \
                 stock = EXCLUDED.stock, \
                 position = EXCLUDED.position \
             RETURNING {VARIANT_COLUMNS}"
        ))
        .bind(product_id)
        .bind(v.name.trim())
        .bind(v.price)
        .bind(v.sale_price)
        .bind(to_i32(v.stock, "stock")?)
        .bind(position)
        .fetch_one(&mut **tx)
        .await?;
        saved.push(row.try_into()?);
    }
    Ok(saved)
}

/// Escape `%`, `_` and `\` for use inside a `LIKE` pattern.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
