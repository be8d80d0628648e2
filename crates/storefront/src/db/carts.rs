//! Cart repository.
//!
//! Every mutation ends with [`refresh_total`], which re-derives the cached
//! `cart.total` from the lines in SQL.

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use omahring_core::cart::{CartLine, MergeMode, MergePlan, plan_merge};
use omahring_core::{CartId, CartItemId, ProductId, UserId, VariantId};

use super::products::lock_stock;
use super::{RepositoryError, to_i32, to_u32};
use crate::models::{Cart, CartOwner};

const LINE_COLUMNS: &str = "id, product_id, variant_id, variant_name, unit_price, quantity";

#[derive(sqlx::FromRow)]
struct LineRow {
    id: CartItemId,
    product_id: ProductId,
    variant_id: VariantId,
    variant_name: String,
    unit_price: Decimal,
    quantity: i32,
}

impl TryFrom<LineRow> for CartLine {
    type Error = RepositoryError;

    fn try_from(r: LineRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Some(r.id),
            product_id: r.product_id,
            variant_id: r.variant_id,
            variant_name: r.variant_name,
            unit_price: r.unit_price,
            quantity: to_u32(r.quantity, "quantity")?,
        })
    }
}

/// Bind values selecting a cart by owner.
fn owner_binds(owner: &CartOwner) -> (Option<UserId>, Option<&str>) {
    match owner {
        CartOwner::User(id) => (Some(*id), None),
        CartOwner::Session(sid) => (None, Some(sid.as_str())),
    }
}

/// Result of merging a guest cart into a user's cart.
#[derive(Debug)]
pub struct MergeResult {
    /// The plan that was applied, `None` in replace mode.
    pub plan: Option<MergePlan>,
    /// Whether a guest cart existed.
    pub guest_found: bool,
}

/// Repository for cart database operations.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Load the owner's cart with its lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn find(&self, owner: &CartOwner) -> Result<Option<Cart>, RepositoryError> {
        let (user_id, session_id) = owner_binds(owner);
        let cart_id: Option<CartId> = sqlx::query_scalar(
            "SELECT id FROM storefront.cart WHERE user_id = $1 OR session_id = $2",
        )
        .bind(user_id)
        .bind(session_id)
        .fetch_optional(self.pool)
        .await?;

        let Some(cart_id) = cart_id else {
            return Ok(None);
        };
        let lines = load_lines(self.pool, cart_id).await?;
        Ok(Some(Cart::from_lines(cart_id, owner.clone(), lines)))
    }

    /// Load the owner's cart, or an empty unsaved view.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get(&self, owner: &CartOwner) -> Result<Cart, RepositoryError> {
        Ok(self
            .find(owner)
            .await?
            .unwrap_or_else(|| Cart::empty(owner.clone())))
    }

    /// The owner's cart id, creating an empty cart if needed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn ensure(&self, owner: &CartOwner) -> Result<CartId, RepositoryError> {
        let (user_id, session_id) = owner_binds(owner);
        sqlx::query(
            "INSERT INTO storefront.cart (user_id, session_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(session_id)
        .execute(self.pool)
        .await?;

        let id = sqlx::query_scalar(
            "SELECT id FROM storefront.cart WHERE user_id = $1 OR session_id = $2",
        )
        .bind(user_id)
        .bind(session_id)
        .fetch_one(self.pool)
        .await?;
        Ok(id)
    }

    /// Insert a line, or set the quantity of the existing line for the same
    /// variant. The existing line keeps its price snapshot.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn save_line(&self, cart_id: CartId, line: &CartLine) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        upsert_line(&mut tx, cart_id, line).await?;
        refresh_total(&mut tx, cart_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Set the quantity of a line by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line is not in this cart.
    pub async fn set_quantity(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE storefront.cart_item SET quantity = $3 WHERE id = $1 AND cart_id = $2",
        )
        .bind(item_id)
        .bind(cart_id)
        .bind(to_i32(quantity, "quantity")?)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        refresh_total(&mut tx, cart_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Remove a line by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line is not in this cart.
    pub async fn remove_line(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM storefront.cart_item WHERE id = $1 AND cart_id = $2")
            .bind(item_id)
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        refresh_total(&mut tx, cart_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Delete the owner's cart and all of its lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, owner: &CartOwner) -> Result<bool, RepositoryError> {
        let (user_id, session_id) = owner_binds(owner);
        let result =
            sqlx::query("DELETE FROM storefront.cart WHERE user_id = $1 OR session_id = $2")
                .bind(user_id)
                .bind(session_id)
                .execute(self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fold the guest cart of `session_id` into the user's cart.
    ///
    /// Runs in one transaction: both carts and the affected variants are
    /// locked, the merge is planned with [`plan_merge`] against current stock,
    /// the user's lines are written and the guest cart is deleted. In
    /// [`MergeMode::Replace`] the guest cart is only deleted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn merge_guest(
        &self,
        user_id: UserId,
        session_id: &str,
        mode: MergeMode,
    ) -> Result<MergeResult, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let guest_id: Option<CartId> = sqlx::query_scalar(
            "SELECT id FROM storefront.cart WHERE session_id = $1 FOR UPDATE",
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(guest_id) = guest_id else {
            return Ok(MergeResult {
                plan: None,
                guest_found: false,
            });
        };

        let plan = if mode == MergeMode::Merge {
            let guest_lines = load_lines(&mut *tx, guest_id).await?;

            sqlx::query(
                "INSERT INTO storefront.cart (user_id) VALUES ($1) ON CONFLICT DO NOTHING",
            )
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
            let user_cart_id: CartId = sqlx::query_scalar(
                "SELECT id FROM storefront.cart WHERE user_id = $1 FOR UPDATE",
            )
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
            let user_lines = load_lines(&mut *tx, user_cart_id).await?;

            let variant_ids: Vec<VariantId> = guest_lines.iter().map(|l| l.variant_id).collect();
            let stock = lock_stock(&mut tx, &variant_ids).await?;
            let plan = plan_merge(&user_lines, &guest_lines, |id| stock.get(&id).copied());

            for line in &plan.lines {
                upsert_line(&mut tx, user_cart_id, line).await?;
            }
            refresh_total(&mut tx, user_cart_id).await?;
            Some(plan)
        } else {
            None
        };

        sqlx::query("DELETE FROM storefront.cart WHERE id = $1")
            .bind(guest_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(MergeResult {
            plan,
            guest_found: true,
        })
    }
}

async fn load_lines<'e, E>(executor: E, cart_id: CartId) -> Result<Vec<CartLine>, RepositoryError>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, LineRow>(&format!(
        "SELECT {LINE_COLUMNS} FROM storefront.cart_item WHERE cart_id = $1 ORDER BY id"
    ))
    .bind(cart_id)
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(CartLine::try_from).collect()
}

async fn upsert_line(
    tx: &mut Transaction<'_, Postgres>,
    cart_id: CartId,
    line: &CartLine,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO storefront.cart_item \
             (cart_id, product_id, variant_id, variant_name, unit_price, quantity) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (cart_id, product_id, variant_id) DO UPDATE SET \
             quantity = EXCLUDED.quantity",
    )
    .bind(cart_id)
    .bind(line.product_id)
    .bind(line.variant_id)
    .bind(&line.variant_name)
    .bind(line.unit_price)
    .bind(to_i32(line.quantity, "quantity")?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Re-derive `cart.total` from the cart's lines.
async fn refresh_total(
    tx: &mut Transaction<'_, Postgres>,
    cart_id: CartId,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE storefront.cart SET \
             total = COALESCE( \
                 (SELECT SUM(unit_price * quantity) FROM storefront.cart_item WHERE cart_id = $1), \
                 0), \
             updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(cart_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
