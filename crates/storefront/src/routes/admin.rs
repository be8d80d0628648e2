//! Back-office route handlers for orders and users.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tracing::instrument;

use omahring_core::{OrderId, OrderStatus, PaymentStatus, UserId, UserRole};

use crate::db::{OrderRepository, UserRepository};
use crate::error::AppError;
use crate::middleware::RequireStaff;
use crate::models::{Order, User};
use crate::routes::page_window;
use crate::services::CheckoutService;
use crate::state::AppState;

/// Order listing filters.
#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// User listing filters.
#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<UserRole>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Order status change body.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
}

/// Role change body.
#[derive(Debug, Deserialize)]
pub struct RoleUpdate {
    pub role: UserRole,
}

/// All orders, newest first.
#[instrument(skip(state, staff), fields(user_id = %staff.id))]
pub async fn list_orders(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Query(query): Query<OrderQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    let (limit, offset) = page_window(query.page, query.per_page);
    let orders = OrderRepository::new(state.pool())
        .list_all(query.status, query.payment_status, limit, offset)
        .await?;
    Ok(Json(orders))
}

/// Move an order through its fulfilment lifecycle.
#[instrument(skip(state, staff), fields(user_id = %staff.id))]
pub async fn set_order_status(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Path(id): Path<OrderId>,
    Json(body): Json<StatusUpdate>,
) -> Result<Json<Order>, AppError> {
    let order = CheckoutService::new(state.pool(), state.midtrans())
        .set_status(id, body.status)
        .await?;
    Ok(Json(order))
}

/// All users, newest first.
#[instrument(skip(state, staff), fields(user_id = %staff.id))]
pub async fn list_users(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<User>>, AppError> {
    let (limit, offset) = page_window(query.page, query.per_page);
    let users = UserRepository::new(state.pool())
        .list(query.role, limit, offset)
        .await?;
    Ok(Json(users))
}

/// Change a user's role. Upgrading to `member` unlocks member-only promos.
///
/// Only admins may grant or revoke staff roles.
#[instrument(skip(state, staff), fields(user_id = %staff.id))]
pub async fn set_user_role(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Path(id): Path<UserId>,
    Json(body): Json<RoleUpdate>,
) -> Result<Json<User>, AppError> {
    let users = UserRepository::new(state.pool());
    let target = users
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Pengguna".to_string()))?;

    let touches_staff = body.role.is_staff() || target.role.is_staff();
    if touches_staff && staff.role != UserRole::Admin {
        return Err(AppError::Forbidden);
    }
    if id == staff.id {
        return Err(AppError::BadRequest(
            "Tidak dapat mengubah peran akun sendiri".to_string(),
        ));
    }

    let user = users.set_role(id, body.role).await?;
    tracing::info!(target_user_id = %user.id, role = %user.role, "User role changed");
    Ok(Json(user))
}
