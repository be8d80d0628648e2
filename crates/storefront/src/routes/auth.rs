//! Authentication route handlers.
//!
//! Password registration and login. The logged-in user is kept in the
//! tower-sessions session; merging a guest cart is a separate call to
//! `POST /api/cart/merge`.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::middleware::{RequireAuth, clear_current_user, set_current_user};
use crate::models::{CurrentUser, User};
use crate::routes::load_user;
use crate::services::{AuthService, Registration};
use crate::state::AppState;

/// Registration request body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

async fn start_session(session: &Session, user: &User) -> Result<(), AppError> {
    set_current_user(
        session,
        &CurrentUser {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
        },
    )
    .await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    Ok(())
}

/// Open an account and log it in.
#[instrument(skip(state, session, body), fields(email = %body.email))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = AuthService::new(state.pool())
        .register(&Registration {
            email: &body.email,
            password: &body.password,
            name: &body.name,
            phone: body.phone.as_deref(),
        })
        .await?;

    start_session(&session, &user).await?;
    tracing::info!(user_id = %user.id, "User registered");
    Ok((StatusCode::CREATED, Json(user)))
}

/// Log in with email and password.
#[instrument(skip(state, session, body), fields(email = %body.email))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<LoginRequest>,
) -> Result<Json<User>, AppError> {
    let user = match AuthService::new(state.pool())
        .login(&body.email, &body.password)
        .await
    {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, "Login failed");
            return Err(e.into());
        }
    };

    start_session(&session, &user).await?;
    tracing::info!(user_id = %user.id, "User logged in");
    Ok(Json(user))
}

/// Log out and discard the session.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Result<StatusCode, AppError> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

/// The logged-in user's profile.
#[instrument(skip(state, current), fields(user_id = %current.id))]
pub async fn me(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<Json<User>, AppError> {
    Ok(Json(load_user(&state, &current).await?))
}
