//! Order route handlers for buyers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use omahring_core::OrderId;
use omahring_core::payment::SnapToken;

use crate::db::OrderRepository;
use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::Order;
use crate::routes::load_user;
use crate::services::{CheckoutRequest, CheckoutService};
use crate::state::AppState;

/// Snap credentials for the client.
#[derive(Debug, Serialize)]
pub struct PaymentToken {
    pub token: String,
    pub redirect_url: String,
    pub expires_at: DateTime<Utc>,
    /// Midtrans client key for Snap.js.
    pub client_key: Option<String>,
}

impl PaymentToken {
    fn new(token: &SnapToken, state: &AppState) -> Self {
        Self {
            token: token.token.clone(),
            redirect_url: token.redirect_url.clone(),
            expires_at: token.expires_at(),
            client_key: state.config().midtrans.client_key.clone(),
        }
    }
}

/// A freshly placed order and how to pay for it.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order: Order,
    pub payment: Option<PaymentToken>,
}

/// Place an order from the cart.
#[instrument(skip(state, current, request), fields(user_id = %current.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = load_user(&state, &current).await?;
    let order = CheckoutService::new(state.pool(), state.midtrans())
        .place_order(&user, &request)
        .await?;

    let payment = order
        .snap_token
        .as_ref()
        .map(|token| PaymentToken::new(token, &state));
    Ok((StatusCode::CREATED, Json(CheckoutResponse { order, payment })))
}

/// The logged-in user's orders, newest first.
#[instrument(skip(state, current), fields(user_id = %current.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<Json<Vec<Order>>, AppError> {
    let orders = OrderRepository::new(state.pool())
        .list_for_user(current.id)
        .await?;
    Ok(Json(orders))
}

/// One of the logged-in user's orders.
#[instrument(skip(state, current), fields(user_id = %current.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, AppError> {
    let order = OrderRepository::new(state.pool())
        .get_for_user(current.id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Pesanan".to_string()))?;
    Ok(Json(order))
}

/// A usable Snap token for an unpaid order, regenerated when stale.
#[instrument(skip(state, current), fields(user_id = %current.id))]
pub async fn payment_token(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<PaymentToken>, AppError> {
    let user = load_user(&state, &current).await?;
    let token = CheckoutService::new(state.pool(), state.midtrans())
        .payment_token(&user, id)
        .await?;
    Ok(Json(PaymentToken::new(&token, &state)))
}

/// Cancel an order that has not been paid.
#[instrument(skip(state, current), fields(user_id = %current.id))]
pub async fn cancel(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, AppError> {
    let user = load_user(&state, &current).await?;
    let order = CheckoutService::new(state.pool(), state.midtrans())
        .cancel(&user, id)
        .await?;
    Ok(Json(order))
}
