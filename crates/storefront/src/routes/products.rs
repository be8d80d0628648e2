//! Product catalog route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use omahring_core::{ProductId, VariantId};

use crate::db::ProductRepository;
use crate::db::products::ProductFilter;
use crate::error::AppError;
use crate::middleware::{OptionalAuth, RequireStaff};
use crate::models::{Product, ProductInput, Variant};
use crate::routes::page_window;
use crate::state::AppState;

/// Product listing query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
    /// Free-text search over name and description.
    pub q: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Staff only: include deactivated products.
    #[serde(default)]
    pub include_inactive: bool,
}

/// One page of products.
#[derive(Debug, Serialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Stock update body.
#[derive(Debug, Deserialize)]
pub struct StockUpdate {
    pub stock: u32,
}

/// List products.
#[instrument(skip(state, user))]
pub async fn index(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ProductPage>, AppError> {
    let (limit, offset) = page_window(query.page, query.per_page);
    let is_staff = user.is_some_and(|u| u.role.is_staff());

    let filter = ProductFilter {
        category: query.category.filter(|c| !c.trim().is_empty()),
        search: query.q.filter(|q| !q.trim().is_empty()),
        include_inactive: is_staff && query.include_inactive,
        limit,
        offset,
    };
    let (products, total) = ProductRepository::new(state.pool()).list(&filter).await?;

    Ok(Json(ProductPage {
        products,
        total,
        limit,
        offset,
    }))
}

/// Product detail by slug.
#[instrument(skip(state, user))]
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Path(slug): Path<String>,
) -> Result<Json<Product>, AppError> {
    let is_staff = user.is_some_and(|u| u.role.is_staff());
    let product = ProductRepository::new(state.pool())
        .get_by_slug(&slug, is_staff)
        .await?
        .ok_or_else(|| AppError::NotFound("Produk".to_string()))?;
    Ok(Json(product))
}

/// Create a product with its variants.
#[instrument(skip(state, staff, input), fields(user_id = %staff.id, slug = %input.slug))]
pub async fn create(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Json(input): Json<ProductInput>,
) -> Result<impl IntoResponse, AppError> {
    input.validate().map_err(AppError::BadRequest)?;

    let product = ProductRepository::new(state.pool()).create(&input).await?;
    tracing::info!(product_id = %product.id, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

/// Replace a product and its variants.
///
/// Variants are matched by name: unnamed ones are deleted, the rest upserted.
#[instrument(skip(state, staff, input), fields(user_id = %staff.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Path(id): Path<ProductId>,
    Json(input): Json<ProductInput>,
) -> Result<Json<Product>, AppError> {
    input.validate().map_err(AppError::BadRequest)?;

    let product = ProductRepository::new(state.pool())
        .update(id, &input)
        .await?;
    tracing::info!(product_id = %product.id, "Product updated");
    Ok(Json(product))
}

/// Delete a product. Past orders keep their line snapshots.
#[instrument(skip(state, staff), fields(user_id = %staff.id))]
pub async fn delete(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Path(id): Path<ProductId>,
) -> Result<StatusCode, AppError> {
    ProductRepository::new(state.pool()).delete(id).await?;
    tracing::info!(product_id = %id, "Product deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Set a variant's stock level.
#[instrument(skip(state, staff, body), fields(user_id = %staff.id, stock = body.stock))]
pub async fn set_stock(
    State(state): State<AppState>,
    RequireStaff(staff): RequireStaff,
    Path((product_id, variant_id)): Path<(ProductId, VariantId)>,
    Json(body): Json<StockUpdate>,
) -> Result<Json<Variant>, AppError> {
    let variant = ProductRepository::new(state.pool())
        .set_stock(product_id, variant_id, body.stock)
        .await?;
    Ok(Json(variant))
}
