//! Promo code route handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::instrument;

use omahring_core::PromoId;

use crate::db::PromoRepository;
use crate::error::AppError;
use crate::middleware::{RequireAuth, RequireStaff};
use crate::models::promo::normalize_code;
use crate::models::{Promo, PromoInput};
use crate::routes::load_user;
use crate::services::CheckoutService;
use crate::services::checkout::PromoPreview;
use crate::state::AppState;

/// Longest accepted promo code.
const MAX_CODE_LENGTH: usize = 32;

/// Promo preview body.
#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub code: String,
}

/// Normalize and check the code and rules of a promo input.
fn checked_code(input: &PromoInput) -> Result<String, AppError> {
    let code = normalize_code(&input.code);
    if code.is_empty()
        || code.len() > MAX_CODE_LENGTH
        || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::BadRequest(
            "Kode promo hanya boleh berisi huruf, angka, - dan _".to_string(),
        ));
    }
    input.rules.validate().map_err(AppError::BadRequest)?;
    Ok(code)
}

/// List all promos.
#[instrument(skip(state, staff), fields(user_id = %staff.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
) -> Result<Json<Vec<Promo>>, AppError> {
    Ok(Json(PromoRepository::new(state.pool()).list().await?))
}

/// Create a promo.
#[instrument(skip(state, staff, input), fields(user_id = %staff.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Json(input): Json<PromoInput>,
) -> Result<impl IntoResponse, AppError> {
    let code = checked_code(&input)?;
    let promo = PromoRepository::new(state.pool())
        .create(&code, &input)
        .await?;
    tracing::info!(promo_id = %promo.id, code = %promo.code, "Promo created");
    Ok((StatusCode::CREATED, Json(promo)))
}

/// Replace a promo. Its used count is kept.
#[instrument(skip(state, staff, input), fields(user_id = %staff.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Path(id): Path<PromoId>,
    Json(input): Json<PromoInput>,
) -> Result<Json<Promo>, AppError> {
    let code = checked_code(&input)?;
    let promo = PromoRepository::new(state.pool())
        .update(id, &code, &input)
        .await?;
    Ok(Json(promo))
}

/// Delete a promo. Orders keep the code they were placed with.
#[instrument(skip(state, staff), fields(user_id = %staff.id))]
pub async fn delete(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Path(id): Path<PromoId>,
) -> Result<StatusCode, AppError> {
    PromoRepository::new(state.pool()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Preview the discount a code gives on the current cart.
#[instrument(skip(state, current, body), fields(user_id = %current.id))]
pub async fn validate(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Json(body): Json<ValidateRequest>,
) -> Result<Json<PromoPreview>, AppError> {
    let user = load_user(&state, &current).await?;
    let preview = CheckoutService::new(state.pool(), state.midtrans())
        .preview_promo(&user, &body.code)
        .await?;
    Ok(Json(preview))
}
