//! Cart route handlers.
//!
//! Every handler works on the cart resolved by [`ResolvedCartOwner`]: the
//! logged-in user's cart, or the guest cart named by `X-Session-Id`.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use omahring_core::cart::MergeMode;
use omahring_core::{CartItemId, Price, ProductId, VariantId};

use crate::db::CartRepository;
use crate::error::AppError;
use crate::middleware::{RequireAuth, ResolvedCartOwner};
use crate::models::{Cart, CartOwner};
use crate::services::{CartService, MergeSummary};
use crate::state::AppState;

/// Add-to-cart body.
#[derive(Debug, Deserialize)]
pub struct AddItem {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

const fn default_quantity() -> u32 {
    1
}

/// Quantity update body. Zero removes the line.
#[derive(Debug, Deserialize)]
pub struct UpdateItem {
    pub quantity: u32,
}

/// Merge request sent right after login.
#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub session_id: String,
    #[serde(default)]
    pub mode: MergeMode,
}

/// Whether a guest cart is waiting to be merged.
#[derive(Debug, Serialize)]
pub struct GuestCartSummary {
    pub exists: bool,
    pub item_count: u32,
    pub total: Price,
}

/// Show the cart.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    ResolvedCartOwner(owner): ResolvedCartOwner,
) -> Result<Json<Cart>, AppError> {
    Ok(Json(CartService::new(state.pool()).get(&owner).await?))
}

/// Add units of a variant.
#[instrument(skip(state))]
pub async fn add(
    State(state): State<AppState>,
    ResolvedCartOwner(owner): ResolvedCartOwner,
    Json(body): Json<AddItem>,
) -> Result<Json<Cart>, AppError> {
    let cart = CartService::new(state.pool())
        .add_item(&owner, body.product_id, body.variant_id, body.quantity)
        .await?;
    Ok(Json(cart))
}

/// Change a line's quantity.
#[instrument(skip(state))]
pub async fn update(
    State(state): State<AppState>,
    ResolvedCartOwner(owner): ResolvedCartOwner,
    Path(id): Path<CartItemId>,
    Json(body): Json<UpdateItem>,
) -> Result<Json<Cart>, AppError> {
    let cart = CartService::new(state.pool())
        .update_item(&owner, id, body.quantity)
        .await?;
    Ok(Json(cart))
}

/// Remove a line.
#[instrument(skip(state))]
pub async fn remove(
    State(state): State<AppState>,
    ResolvedCartOwner(owner): ResolvedCartOwner,
    Path(id): Path<CartItemId>,
) -> Result<Json<Cart>, AppError> {
    let cart = CartService::new(state.pool())
        .remove_item(&owner, id)
        .await?;
    Ok(Json(cart))
}

/// Empty the cart.
#[instrument(skip(state))]
pub async fn clear(
    State(state): State<AppState>,
    ResolvedCartOwner(owner): ResolvedCartOwner,
) -> Result<Json<Cart>, AppError> {
    Ok(Json(CartService::new(state.pool()).clear(&owner).await?))
}

/// Merge or discard a guest cart into the logged-in user's cart.
#[instrument(skip(state, current, body), fields(user_id = %current.id, mode = ?body.mode))]
pub async fn merge(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Json(body): Json<MergeRequest>,
) -> Result<Json<MergeSummary>, AppError> {
    let Some(CartOwner::Session(session_id)) = CartOwner::session(&body.session_id) else {
        return Err(AppError::BadRequest("Session ID tidak valid".to_string()));
    };

    let summary = CartService::new(state.pool())
        .merge(current.id, &session_id, body.mode)
        .await?;
    Ok(Json(summary))
}

/// Summary of a guest cart, so the client can offer to merge it.
#[instrument(skip(state))]
pub async fn guest_summary(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<GuestCartSummary>, AppError> {
    let owner = CartOwner::session(&session_id)
        .ok_or_else(|| AppError::BadRequest("Session ID tidak valid".to_string()))?;

    let summary = match CartRepository::new(state.pool()).find(&owner).await? {
        Some(cart) if !cart.is_empty() => GuestCartSummary {
            exists: true,
            item_count: cart.item_count,
            total: cart.total,
        },
        _ => GuestCartSummary {
            exists: false,
            item_count: 0,
            total: Price::zero(),
        },
    };
    Ok(Json(summary))
}
