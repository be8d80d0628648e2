//! Authentication extractors.
//!
//! The logged-in user lives in the tower-sessions session under
//! [`session_keys::CURRENT_USER`]. Rejections are JSON [`AppError`]s.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::error::AppError;
use crate::models::{CartOwner, CurrentUser, session_keys};

/// Header carrying the browser-generated guest cart identifier.
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Read the current user from the request's session, if any.
async fn current_user(parts: &Parts) -> Option<CurrentUser> {
    let session = parts.extensions.get::<Session>()?;
    session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()
}

/// Extractor that requires a logged-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn me(RequireAuth(user): RequireAuth) -> impl IntoResponse {
///     Json(user)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_user(parts)
            .await
            .map(Self)
            .ok_or(AppError::Unauthorized)
    }
}

/// Extractor that requires an admin or manager.
pub struct RequireStaff(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireStaff
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = current_user(parts).await.ok_or(AppError::Unauthorized)?;
        if !user.role.is_staff() {
            tracing::warn!(user_id = %user.id, role = %user.role, path = %parts.uri.path(), "Staff endpoint refused");
            return Err(AppError::Forbidden);
        }
        Ok(Self(user))
    }
}

/// Extractor that optionally gets the current user.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(current_user(parts).await))
    }
}

/// Extractor resolving whose cart a request operates on.
///
/// A logged-in user always gets their own cart. Otherwise the
/// `X-Session-Id` header selects a guest cart. Without either the request is
/// rejected with 400.
pub struct ResolvedCartOwner(pub CartOwner);

impl<S> FromRequestParts<S> for ResolvedCartOwner
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = current_user(parts).await {
            return Ok(Self(CartOwner::User(user.id)));
        }

        parts
            .headers
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(CartOwner::session)
            .map(Self)
            .ok_or_else(|| AppError::BadRequest("Session ID diperlukan".to_string()))
    }
}

/// Store the logged-in user in the session.
///
/// The session id is cycled first so a pre-login id cannot be reused.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Clear the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn resolve(request: Request<()>) -> Result<CartOwner, AppError> {
        let (mut parts, ()) = request.into_parts();
        ResolvedCartOwner::from_request_parts(&mut parts, &())
            .await
            .map(|owner| owner.0)
    }

    #[tokio::test]
    async fn test_guest_cart_owner_from_header() {
        let request = Request::builder()
            .header(SESSION_ID_HEADER, "guest-7f3a")
            .body(())
            .unwrap();
        let owner = resolve(request).await.unwrap();
        assert_eq!(owner, CartOwner::Session("guest-7f3a".to_string()));
    }

    #[tokio::test]
    async fn test_cart_owner_required() {
        let request = Request::builder().body(()).unwrap();
        assert!(matches!(resolve(request).await, Err(AppError::BadRequest(_))));

        let blank = Request::builder()
            .header(SESSION_ID_HEADER, "   ")
            .body(())
            .unwrap();
        assert!(matches!(resolve(blank).await, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_require_auth_without_session() {
        let (mut parts, ()) = Request::builder().body(()).unwrap().into_parts();
        let result = RequireAuth::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }
}
