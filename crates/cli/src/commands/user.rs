//! User account commands.
//!
//! # Usage
//!
//! ```bash
//! # Promote an existing customer
//! omahring user role -e budi@example.com -r manager
//!
//! # Create a staff account directly
//! omahring user create -e admin@omahring.id -n "Admin Toko" -p 'kata-sandi-panjang' -r admin
//! ```

use omahring_core::{Email, UserRole};
use omahring_storefront::db::{RepositoryError, UserRepository};
use omahring_storefront::services::{AuthError, AuthService, Registration};
use thiserror::Error;

use super::{ConnectError, connect};

/// Errors that can occur during user operations.
#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Invalid role.
    #[error("Invalid role: {0}. Valid roles: user, member, admin, manager")]
    InvalidRole(String),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// No account with this email.
    #[error("No user with email: {0}")]
    NotFound(String),

    /// Registration rejected the input.
    #[error("Cannot create user: {0}")]
    Auth(#[from] AuthError),

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
}

fn parse_role(role: &str) -> Result<UserRole, UserError> {
    role.parse()
        .map_err(|_| UserError::InvalidRole(role.to_owned()))
}

/// Change the role of an existing account.
///
/// # Errors
///
/// Returns an error if the role or email is invalid, the user does not
/// exist, or the database is unreachable.
pub async fn set_role(email: &str, role: &str) -> Result<(), UserError> {
    let role = parse_role(role)?;
    let parsed = Email::parse(email).map_err(|_| UserError::InvalidEmail(email.to_owned()))?;

    let pool = connect().await?;
    let user = match UserRepository::new(&pool).set_role_by_email(&parsed, role).await {
        Ok(user) => user,
        Err(RepositoryError::NotFound) => return Err(UserError::NotFound(email.to_owned())),
        Err(e) => return Err(e.into()),
    };

    tracing::info!(user_id = %user.id, email = %user.email, %role, "Role updated");
    tracing::info!("Existing sessions keep the old role until the user logs in again");
    Ok(())
}

/// Register an account and give it a role in one step.
///
/// # Errors
///
/// Returns an error if registration fails (taken email, weak password) or
/// the role is invalid.
pub async fn create(email: &str, name: &str, password: &str, role: &str) -> Result<(), UserError> {
    let role = parse_role(role)?;
    let pool = connect().await?;

    tracing::info!("Creating user: {} ({})", email, role);
    let user = AuthService::new(&pool)
        .register(&Registration {
            email,
            password,
            name,
            phone: None,
        })
        .await?;

    let user = if role == user.role {
        user
    } else {
        UserRepository::new(&pool)
            .set_role(user.id, role)
            .await?
    };

    tracing::info!(user_id = %user.id, role = %user.role, "User created");
    Ok(())
}
