//! User repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use omahring_core::{Email, UserId, UserRole};

use super::RepositoryError;
use crate::models::User;

const USER_COLUMNS: &str = "id, email, name, phone, role, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: UserId,
    email: Email,
    name: String,
    phone: Option<String>,
    role: UserRole,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            email: r.email,
            name: r.name,
            phone: r.phone,
            role: r.role,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserWithHashRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM storefront.user WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    /// Get a user and their password hash by email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_with_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let row = sqlx::query_as::<_, UserWithHashRow>(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM storefront.user WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|r| (User::from(r.user), r.password_hash)))
    }

    /// Create a new user with a password hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(
        &self,
        email: &Email,
        name: &str,
        phone: Option<&str>,
        password_hash: &str,
    ) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO storefront.user (email, name, phone, password_hash) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(name)
        .bind(phone)
        .bind(password_hash)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "email"))?;

        Ok(row.into())
    }

    /// Update name and phone.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn update_profile(
        &self,
        id: UserId,
        name: &str,
        phone: Option<&str>,
    ) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE storefront.user SET name = $2, phone = $3, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(phone)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    /// Change a user's role.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn set_role(&self, id: UserId, role: UserRole) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE storefront.user SET role = $2, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(role)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    /// Change a user's role, looked up by email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no user has that email.
    pub async fn set_role_by_email(
        &self,
        email: &Email,
        role: UserRole,
    ) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE storefront.user SET role = $2, updated_at = NOW() \
             WHERE email = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(role)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    /// List users, newest first, optionally filtered by role.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        role: Option<UserRole>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM storefront.user \
             WHERE ($1::storefront.user_role IS NULL OR role = $1) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(role)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(User::from).collect())
    }
}
