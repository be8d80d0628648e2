//! Order repository.
//!
//! Status changes go through [`OrderState`] while the order row is locked, and
//! the final `UPDATE` is conditioned on the statuses that were read, so two
//! concurrent writers can never both apply a transition.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;

use omahring_core::order::{Applied, OrderState, PaymentEvent, TransitionError};
use omahring_core::payment::{GatewayReference, SnapToken};
use omahring_core::{
    OrderId, OrderItemId, OrderStatus, PaymentStatus, ProductId, PromoId, UserId, VariantId,
};

use super::{RepositoryError, to_i32, to_u32};
use crate::models::{Order, OrderItem, ShippingAddress};

const ORDER_COLUMNS: &str = "id, user_id, status, payment_status, subtotal, discount, \
                             total_amount, promo_code, shipping_address, snap_token, \
                             snap_redirect_url, snap_token_issued_at, gateway_reference, \
                             gateway_transaction_id, payment_type, paid_at, created_at, updated_at";
const ITEM_COLUMNS: &str =
    "id, order_id, product_id, variant_id, product_name, variant_name, unit_price, quantity";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: UserId,
    status: OrderStatus,
    payment_status: PaymentStatus,
    subtotal: Decimal,
    discount: Decimal,
    total_amount: Decimal,
    promo_code: Option<String>,
    shipping_address: Json<ShippingAddress>,
    snap_token: Option<String>,
    snap_redirect_url: Option<String>,
    snap_token_issued_at: Option<DateTime<Utc>>,
    gateway_reference: Option<String>,
    gateway_transaction_id: Option<String>,
    payment_type: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Order {
        let snap_token = match (self.snap_token, self.snap_redirect_url, self.snap_token_issued_at)
        {
            (Some(token), Some(redirect_url), Some(issued_at)) => Some(SnapToken {
                token,
                redirect_url,
                issued_at,
            }),
            _ => None,
        };

        Order {
            id: self.id,
            user_id: self.user_id,
            status: self.status,
            payment_status: self.payment_status,
            subtotal: self.subtotal,
            discount: self.discount,
            total_amount: self.total_amount,
            promo_code: self.promo_code,
            shipping_address: self.shipping_address.0,
            items,
            snap_token,
            gateway_reference: self.gateway_reference,
            gateway_transaction_id: self.gateway_transaction_id,
            payment_type: self.payment_type,
            paid_at: self.paid_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: OrderItemId,
    order_id: OrderId,
    product_id: Option<ProductId>,
    variant_id: Option<VariantId>,
    product_name: String,
    variant_name: String,
    unit_price: Decimal,
    quantity: i32,
}

impl TryFrom<ItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(r: ItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            product_id: r.product_id,
            variant_id: r.variant_id,
            product_name: r.product_name,
            variant_name: r.variant_name,
            unit_price: r.unit_price,
            quantity: to_u32(r.quantity, "quantity")?,
        })
    }
}

/// Errors from operations that move an order through its lifecycle.
#[derive(Debug, Error)]
pub enum OrderUpdateError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl From<sqlx::Error> for OrderUpdateError {
    fn from(e: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(e))
    }
}

/// A line to be written with a new order.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub product_name: String,
    pub variant_name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
}

/// Everything needed to persist a new order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub shipping_address: ShippingAddress,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total_amount: Decimal,
    /// Promo to charge one use against, with its code.
    pub promo: Option<(PromoId, String)>,
    pub items: Vec<NewOrderItem>,
}

/// Gateway details that accompany a payment notification.
#[derive(Debug, Clone, Default)]
pub struct PaymentDetails {
    /// Reference the notification was sent for. Recorded on settlement so a
    /// later refund of that transaction is recognised.
    pub reference: String,
    pub transaction_id: Option<String>,
    pub payment_type: Option<String>,
}

/// Outcome of applying a payment event.
#[derive(Debug)]
pub struct PaymentApplied {
    pub applied: Applied,
    /// Variants whose stock did not cover the paid quantity (clamped to zero).
    pub oversold: Vec<VariantId>,
}

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Persist a new `pending`/`unpaid` order and its lines.
    ///
    /// Charges one use of the promo in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the promo ran out of uses
    /// between evaluation and insert.
    pub async fn create(&self, new: &NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if let Some((promo_id, _)) = &new.promo {
            let charged = sqlx::query(
                "UPDATE storefront.promo SET used_count = used_count + 1, updated_at = NOW() \
                 WHERE id = $1 AND (usage_limit IS NULL OR used_count < usage_limit)",
            )
            .bind(promo_id)
            .execute(&mut *tx)
            .await?;
            if charged.rows_affected() == 0 {
                return Err(RepositoryError::Conflict("promo usage limit reached".to_string()));
            }
        }

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO storefront.order \
                 (user_id, subtotal, discount, total_amount, promo_code, shipping_address) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(new.user_id)
        .bind(new.subtotal)
        .bind(new.discount)
        .bind(new.total_amount)
        .bind(new.promo.as_ref().map(|(_, code)| code.as_str()))
        .bind(Json(&new.shipping_address))
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(new.items.len());
        for item in &new.items {
            let item_row = sqlx::query_as::<_, ItemRow>(&format!(
                "INSERT INTO storefront.order_item \
                     (order_id, product_id, variant_id, product_name, variant_name, unit_price, quantity) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 RETURNING {ITEM_COLUMNS}"
            ))
            .bind(row.id)
            .bind(item.product_id)
            .bind(item.variant_id)
            .bind(&item.product_name)
            .bind(&item.variant_name)
            .bind(item.unit_price)
            .bind(to_i32(item.quantity, "quantity")?)
            .fetch_one(&mut *tx)
            .await?;
            items.push(item_row.try_into()?);
        }

        tx.commit().await?;
        Ok(row.into_order(items))
    }

    /// Delete an order that never reached the gateway, returning its promo use.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn delete_unsubmitted(&self, id: OrderId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let promo_code: Option<Option<String>> = sqlx::query_scalar(
            "DELETE FROM storefront.order WHERE id = $1 AND payment_status = 'unpaid' \
             RETURNING promo_code",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(Some(code)) = promo_code {
            sqlx::query(
                "UPDATE storefront.promo SET used_count = GREATEST(used_count - 1, 0) \
                 WHERE code = $1",
            )
            .bind(code)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Get an order by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.order WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(self.attach_items(row.into_iter().collect()).await?.pop())
    }

    /// Get an order by id, only if it belongs to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_for_user(
        &self,
        user_id: UserId,
        id: OrderId,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self.get(id).await?.filter(|o| o.user_id == user_id))
    }

    /// A user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.order WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        self.attach_items(rows).await
    }

    /// All orders, newest first, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list_all(
        &self,
        status: Option<OrderStatus>,
        payment_status: Option<PaymentStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.order \
             WHERE ($1::storefront.order_status IS NULL OR status = $1) \
               AND ($2::storefront.payment_status IS NULL OR payment_status = $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        ))
        .bind(status)
        .bind(payment_status)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        self.attach_items(rows).await
    }

    /// Store a freshly issued Snap token and the reference it was requested under.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order no longer exists.
    pub async fn store_token(
        &self,
        id: OrderId,
        reference: &GatewayReference,
        token: &SnapToken,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE storefront.order SET \
                 snap_token = $2, snap_redirect_url = $3, snap_token_issued_at = $4, \
                 gateway_reference = $5, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(&token.token)
        .bind(&token.redirect_url)
        .bind(token.issued_at)
        .bind(reference.as_str())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Apply a fulfilment transition (or any other pure state change).
    ///
    /// `user_id` restricts the update to that user's order.
    ///
    /// # Errors
    ///
    /// Returns `OrderUpdateError::Transition` if `change` refuses and
    /// `RepositoryError::NotFound` if the order does not exist.
    pub async fn update_state<F>(
        &self,
        id: OrderId,
        user_id: Option<UserId>,
        change: F,
    ) -> Result<Order, OrderUpdateError>
    where
        F: FnOnce(OrderState) -> Result<OrderState, TransitionError>,
    {
        let mut tx = self.pool.begin().await?;

        let (owner, current) = lock_state(&mut tx, id).await?;
        if user_id.is_some_and(|u| u != owner) {
            return Err(RepositoryError::NotFound.into());
        }

        let next = change(current)?;
        if next != current && write_state(&mut tx, id, current, next, false).await? {
            release_holds(&mut tx, id, current, next).await?;
        }

        tx.commit().await?;
        self.get(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound.into())
    }

    /// Apply a gateway payment event to an order.
    ///
    /// On the first transition into `paid` the order's stock is decremented,
    /// `paid_at` is set and the buyer's cart is deleted, all in this
    /// transaction. An event that cancels the order gives back its promo use
    /// and, after a refund, its stock. A repeated event is [`Applied::Unchanged`] and writes
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns `OrderUpdateError::Transition` for events the lifecycle refuses
    /// and `RepositoryError::NotFound` for unknown orders.
    pub async fn apply_payment(
        &self,
        id: OrderId,
        event: PaymentEvent,
        details: &PaymentDetails,
    ) -> Result<PaymentApplied, OrderUpdateError> {
        let mut tx = self.pool.begin().await?;

        let (owner, current) = lock_state(&mut tx, id).await?;
        let applied = current.apply_payment(event)?;

        let Applied::Changed { state, settled } = applied else {
            return Ok(PaymentApplied {
                applied,
                oversold: Vec::new(),
            });
        };

        if !write_state(&mut tx, id, current, state, settled).await? {
            return Ok(PaymentApplied {
                applied: Applied::Unchanged,
                oversold: Vec::new(),
            });
        }

        release_holds(&mut tx, id, current, state).await?;

        sqlx::query(
            "UPDATE storefront.order SET \
                 gateway_transaction_id = COALESCE($2, gateway_transaction_id), \
                 payment_type = COALESCE($3, payment_type) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(details.transaction_id.as_deref())
        .bind(details.payment_type.as_deref())
        .execute(&mut *tx)
        .await?;

        let oversold = if settled {
            sqlx::query("UPDATE storefront.order SET gateway_reference = $2 WHERE id = $1")
                .bind(id)
                .bind(&details.reference)
                .execute(&mut *tx)
                .await?;
            let oversold = decrement_stock(&mut tx, id).await?;
            sqlx::query("DELETE FROM storefront.cart WHERE user_id = $1")
                .bind(owner)
                .execute(&mut *tx)
                .await?;
            oversold
        } else {
            Vec::new()
        };

        tx.commit().await?;
        Ok(PaymentApplied { applied, oversold })
    }

    async fn attach_items(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = rows.iter().map(|r| r.id.as_i32()).collect();
        let item_rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM storefront.order_item WHERE order_id = ANY($1) ORDER BY id"
        ))
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;

        let mut by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            let order_id = row.order_id;
            by_order.entry(order_id).or_default().push(row.try_into()?);
        }

        Ok(rows
            .into_iter()
            .map(|r| {
                let items = by_order.remove(&r.id).unwrap_or_default();
                r.into_order(items)
            })
            .collect())
    }
}

async fn lock_state(
    tx: &mut Transaction<'_, Postgres>,
    id: OrderId,
) -> Result<(UserId, OrderState), RepositoryError> {
    let row: Option<(UserId, OrderStatus, PaymentStatus)> = sqlx::query_as(
        "SELECT user_id, status, payment_status FROM storefront.order WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;

    let (owner, status, payment) = row.ok_or(RepositoryError::NotFound)?;
    Ok((owner, OrderState { status, payment }))
}

/// Write `next` if the row still holds `current`. Returns whether it did.
async fn write_state(
    tx: &mut Transaction<'_, Postgres>,
    id: OrderId,
    current: OrderState,
    next: OrderState,
    settled: bool,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        "UPDATE storefront.order SET \
             status = $4, payment_status = $5, \
             paid_at = CASE WHEN $6 THEN NOW() ELSE paid_at END, \
             updated_at = NOW() \
         WHERE id = $1 AND status = $2 AND payment_status = $3",
    )
    .bind(id)
    .bind(current.status)
    .bind(current.payment)
    .bind(next.status)
    .bind(next.payment)
    .bind(settled)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Give back what an order held once it is cancelled: one use of its promo,
/// and its quantities if settlement had already taken them out of stock.
async fn release_holds(
    tx: &mut Transaction<'_, Postgres>,
    id: OrderId,
    current: OrderState,
    next: OrderState,
) -> Result<(), RepositoryError> {
    if current.releases_promo_use(next) {
        sqlx::query(
            "UPDATE storefront.promo p SET \
                 used_count = GREATEST(p.used_count - 1, 0), updated_at = NOW() \
             FROM storefront.order o \
             WHERE o.id = $1 AND p.code = o.promo_code",
        )
        .bind(id)
        .execute(&mut **tx)
        .await?;
    }

    if current.restores_stock(next) {
        sqlx::query(
            "UPDATE storefront.product_variant v \
             SET stock = v.stock + w.quantity \
             FROM ( \
                 SELECT variant_id, SUM(quantity)::INTEGER AS quantity \
                 FROM storefront.order_item \
                 WHERE order_id = $1 AND variant_id IS NOT NULL \
                 GROUP BY variant_id \
             ) w \
             WHERE v.id = w.variant_id",
        )
        .bind(id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Take the paid quantities out of stock. Stock never goes below zero;
/// variants that could not cover their quantity are returned.
async fn decrement_stock(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
) -> Result<Vec<VariantId>, RepositoryError> {
    let oversold: Vec<VariantId> = sqlx::query_scalar(
        "WITH wanted AS ( \
             SELECT variant_id, SUM(quantity) AS quantity \
             FROM storefront.order_item \
             WHERE order_id = $1 AND variant_id IS NOT NULL \
             GROUP BY variant_id \
         ), \
         before AS ( \
             SELECT v.id, v.stock, w.quantity \
             FROM storefront.product_variant v \
             JOIN wanted w ON w.variant_id = v.id \
             FOR UPDATE OF v \
         ), \
         updated AS ( \
             UPDATE storefront.product_variant v \
             SET stock = GREATEST(b.stock - b.quantity, 0) \
             FROM before b \
             WHERE v.id = b.id \
             RETURNING v.id \
         ) \
         SELECT b.id FROM before b JOIN updated u ON u.id = b.id WHERE b.stock < b.quantity",
    )
    .bind(order_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(oversold)
}
