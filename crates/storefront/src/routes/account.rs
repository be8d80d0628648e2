//! Account route handlers: profile and saved addresses.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::instrument;

use omahring_core::AddressId;

use crate::db::{AddressRepository, UserRepository};
use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::{Address, AddressInput, User};
use crate::services::auth::validate_name;
use crate::state::AppState;

/// Longest accepted phone number.
const MAX_PHONE_LENGTH: usize = 20;

/// Profile update body.
#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Update the logged-in user's name and phone.
#[instrument(skip(state, current, body), fields(user_id = %current.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Json(body): Json<ProfileUpdate>,
) -> Result<Json<User>, AppError> {
    let name = validate_name(&body.name)?;
    let phone = body
        .phone
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());
    if phone.is_some_and(|p| p.len() > MAX_PHONE_LENGTH) {
        return Err(AppError::BadRequest("Nomor telepon terlalu panjang".to_string()));
    }

    let user = UserRepository::new(state.pool())
        .update_profile(current.id, name, phone)
        .await?;
    Ok(Json(user))
}

/// List saved addresses, default first.
#[instrument(skip(state, current), fields(user_id = %current.id))]
pub async fn list_addresses(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<Json<Vec<Address>>, AppError> {
    let addresses = AddressRepository::new(state.pool()).list(current.id).await?;
    Ok(Json(addresses))
}

/// Save a new address.
#[instrument(skip(state, current, input), fields(user_id = %current.id))]
pub async fn create_address(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Json(input): Json<AddressInput>,
) -> Result<impl IntoResponse, AppError> {
    input
        .validate()
        .map_err(|field| AppError::BadRequest(format!("Kolom {field} wajib diisi")))?;

    let address = AddressRepository::new(state.pool())
        .create(current.id, &input)
        .await?;
    Ok((StatusCode::CREATED, Json(address)))
}

/// Replace a saved address.
#[instrument(skip(state, current, input), fields(user_id = %current.id))]
pub async fn update_address(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(id): Path<AddressId>,
    Json(input): Json<AddressInput>,
) -> Result<Json<Address>, AppError> {
    input
        .validate()
        .map_err(|field| AppError::BadRequest(format!("Kolom {field} wajib diisi")))?;

    let address = AddressRepository::new(state.pool())
        .update(current.id, id, &input)
        .await?;
    Ok(Json(address))
}

/// Delete a saved address.
#[instrument(skip(state, current), fields(user_id = %current.id))]
pub async fn delete_address(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    Path(id): Path<AddressId>,
) -> Result<StatusCode, AppError> {
    AddressRepository::new(state.pool())
        .delete(current.id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
