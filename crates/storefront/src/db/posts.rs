//! Blog post repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use omahring_core::{PostId, UserId};

use super::RepositoryError;
use crate::models::Post;
use crate::models::post::PostInput;

const POST_COLUMNS: &str = "id, title, slug, excerpt, body, cover_image, is_published, \
                            author_id, published_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: PostId,
    title: String,
    slug: String,
    excerpt: String,
    body: String,
    cover_image: Option<String>,
    is_published: bool,
    author_id: Option<UserId>,
    published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PostRow> for Post {
    fn from(r: PostRow) -> Self {
        Self {
            id: r.id,
            title: r.title,
            slug: r.slug,
            excerpt: r.excerpt,
            body: r.body,
            cover_image: r.cover_image,
            is_published: r.is_published,
            author_id: r.author_id,
            published_at: r.published_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Repository for blog post database operations.
pub struct PostRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PostRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Posts, most recently published first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        include_drafts: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>, RepositoryError> {
        let rows = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM storefront.post \
             WHERE $1 OR is_published \
             ORDER BY COALESCE(published_at, created_at) DESC, id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(include_drafts)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Post::from).collect())
    }

    /// Get a post by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_slug(
        &self,
        slug: &str,
        include_drafts: bool,
    ) -> Result<Option<Post>, RepositoryError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM storefront.post WHERE slug = $1 AND ($2 OR is_published)"
        ))
        .bind(slug)
        .bind(include_drafts)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Post::from))
    }

    /// Create a post. `published_at` is set when it is created published.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    pub async fn create(
        &self,
        author_id: UserId,
        input: &PostInput,
    ) -> Result<Post, RepositoryError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "INSERT INTO storefront.post \
                 (title, slug, excerpt, body, cover_image, is_published, author_id, published_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, CASE WHEN $6 THEN NOW() END) \
             RETURNING {POST_COLUMNS}"
        ))
        .bind(input.title.trim())
        .bind(&input.slug)
        .bind(&input.excerpt)
        .bind(&input.body)
        .bind(input.cover_image.as_deref())
        .bind(input.is_published)
        .bind(author_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "slug"))?;

        Ok(row.into())
    }

    /// Replace a post's fields. `published_at` is set the first time it is
    /// published and kept afterwards.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the post does not exist and
    /// `RepositoryError::Conflict` if the new slug is taken.
    pub async fn update(&self, id: PostId, input: &PostInput) -> Result<Post, RepositoryError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "UPDATE storefront.post SET \
                 title = $2, slug = $3, excerpt = $4, body = $5, cover_image = $6, \
                 is_published = $7, \
                 published_at = CASE WHEN $7 THEN COALESCE(published_at, NOW()) ELSE published_at END, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {POST_COLUMNS}"
        ))
        .bind(id)
        .bind(input.title.trim())
        .bind(&input.slug)
        .bind(&input.excerpt)
        .bind(&input.body)
        .bind(input.cover_image.as_deref())
        .bind(input.is_published)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::unique(e, "slug"))?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    /// Delete a post.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the post does not exist.
    pub async fn delete(&self, id: PostId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.post WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
