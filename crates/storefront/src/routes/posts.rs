//! Blog route handlers.
//!
//! Post bodies are stored as markdown and rendered to HTML on read with
//! comrak. Raw HTML in the markdown is escaped.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use comrak::{Options, markdown_to_html};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use omahring_core::PostId;

use crate::db::PostRepository;
use crate::error::AppError;
use crate::middleware::{OptionalAuth, RequireStaff};
use crate::models::product::is_valid_slug;
use crate::models::{Post, PostInput};
use crate::routes::page_window;
use crate::state::AppState;

/// Post listing query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PostQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Staff only: include unpublished drafts.
    #[serde(default)]
    pub drafts: bool,
}

/// A post with its rendered body.
#[derive(Debug, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub html: String,
}

/// Render post markdown to HTML.
#[must_use]
pub fn render_markdown(markdown: &str) -> String {
    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    options.extension.footnotes = true;
    markdown_to_html(markdown, &options)
}

fn validate(input: &PostInput) -> Result<(), AppError> {
    if input.title.trim().is_empty() {
        return Err(AppError::BadRequest("Judul wajib diisi".to_string()));
    }
    if !is_valid_slug(&input.slug) {
        return Err(AppError::BadRequest(
            "Slug hanya boleh berisi huruf kecil, angka dan tanda -".to_string(),
        ));
    }
    Ok(())
}

/// List published posts (staff may include drafts).
#[instrument(skip(state, user))]
pub async fn index(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<PostQuery>,
) -> Result<Json<Vec<Post>>, AppError> {
    let (limit, offset) = page_window(query.page, query.per_page);
    let include_drafts = query.drafts && user.is_some_and(|u| u.role.is_staff());
    let posts = PostRepository::new(state.pool())
        .list(include_drafts, limit, offset)
        .await?;
    Ok(Json(posts))
}

/// A post by slug, rendered.
#[instrument(skip(state, user))]
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Path(slug): Path<String>,
) -> Result<Json<PostView>, AppError> {
    let is_staff = user.is_some_and(|u| u.role.is_staff());
    let post = PostRepository::new(state.pool())
        .get_by_slug(&slug, is_staff)
        .await?
        .ok_or_else(|| AppError::NotFound("Artikel".to_string()))?;

    let html = render_markdown(&post.body);
    Ok(Json(PostView { post, html }))
}

/// Create a post.
#[instrument(skip(state, staff, input), fields(user_id = %staff.id, slug = %input.slug))]
pub async fn create(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Json(input): Json<PostInput>,
) -> Result<impl IntoResponse, AppError> {
    validate(&input)?;
    let post = PostRepository::new(state.pool())
        .create(staff.id, &input)
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// Replace a post.
#[instrument(skip(state, staff, input), fields(user_id = %staff.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Path(id): Path<PostId>,
    Json(input): Json<PostInput>,
) -> Result<Json<Post>, AppError> {
    validate(&input)?;
    let post = PostRepository::new(state.pool()).update(id, &input).await?;
    Ok(Json(post))
}

/// Delete a post.
#[instrument(skip(state, staff), fields(user_id = %staff.id))]
pub async fn delete(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Path(id): Path<PostId>,
) -> Result<StatusCode, AppError> {
    PostRepository::new(state.pool()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_markdown() {
        let html = render_markdown("# Perawatan Murai\n\n~~salah~~ **benar**");
        assert!(html.contains("<h1>Perawatan Murai</h1>"));
        assert!(html.contains("<del>salah</del>"));
        assert!(html.contains("<strong>benar</strong>"));
    }

    #[test]
    fn test_render_markdown_escapes_raw_html() {
        let html = render_markdown("<script>alert(1)</script>");
        assert!(!html.contains("<script>"));
    }
}
