//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                              - Liveness
//! GET  /health/ready                        - Readiness (database)
//!
//! # Auth (strict rate limit)
//! POST /api/auth/register | login | logout
//! GET  /api/auth/me
//!
//! # Account (requires auth)
//! PATCH  /api/account
//! GET    /api/account/addresses             POST same
//! PATCH  /api/account/addresses/{id}        DELETE same
//!
//! # Catalog
//! GET    /api/products                      POST (staff)
//! GET    /api/products/{slug}
//! PUT    /api/products/{id}                 DELETE (staff)
//! PATCH  /api/products/{id}/variants/{variant_id}/stock (staff)
//!
//! # Cart (user session or X-Session-Id)
//! GET    /api/cart                          DELETE (clear)
//! POST   /api/cart/items
//! PATCH  /api/cart/items/{id}               DELETE same
//! POST   /api/cart/merge
//! GET    /api/cart/guest/{session_id}
//!
//! # Orders (requires auth)
//! POST   /api/orders                        GET (mine)
//! GET    /api/orders/{id}
//! POST   /api/orders/{id}/payment-token
//! POST   /api/orders/{id}/cancel
//!
//! # Payments (Midtrans, not rate limited)
//! POST   /api/payments/notification
//!
//! # Promos
//! GET    /api/promos (staff)                POST (staff)
//! PUT    /api/promos/{id}                   DELETE (staff)
//! POST   /api/promos/validate
//!
//! # Blog
//! GET    /api/posts                         POST (staff)
//! GET    /api/posts/{slug}
//! PUT    /api/posts/{id}                    DELETE (staff)
//!
//! # Back office (staff)
//! GET    /api/admin/orders
//! PATCH  /api/admin/orders/{id}/status
//! GET    /api/admin/users
//! PATCH  /api/admin/users/{id}/role
//! ```
//!
//! Slug and id routes share one path segment (`{key}`); handlers read it as
//! whichever they need.

pub mod account;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod health;
pub mod orders;
pub mod payments;
pub mod posts;
pub mod products;
pub mod promos;

use axum::{
    Router,
    routing::{get, patch, post, put},
};

use crate::db::UserRepository;
use crate::error::AppError;
use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::models::{CurrentUser, User};
use crate::state::AppState;

/// Default page size for list endpoints.
const DEFAULT_PER_PAGE: u32 = 20;

/// Largest page size a client may request.
const MAX_PER_PAGE: u32 = 100;

/// Convert 1-based `page`/`per_page` query values to `(limit, offset)`.
#[must_use]
pub fn page_window(page: Option<u32>, per_page: Option<u32>) -> (i64, i64) {
    let limit = per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    let page = page.unwrap_or(1).max(1);
    let offset = i64::from(page - 1) * i64::from(limit);
    (i64::from(limit), offset)
}

/// Load the full account behind a session user.
///
/// A session that outlived its account is treated as logged out.
pub(crate) async fn load_user(state: &AppState, current: &CurrentUser) -> Result<User, AppError> {
    UserRepository::new(state.pool())
        .get_by_id(current.id)
        .await?
        .ok_or(AppError::Unauthorized)
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/", patch(account::update_profile))
        .route(
            "/addresses",
            get(account::list_addresses).post(account::create_address),
        )
        .route(
            "/addresses/{id}",
            patch(account::update_address).delete(account::delete_address),
        )
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index).post(products::create))
        .route(
            "/{key}",
            get(products::show)
                .put(products::update)
                .delete(products::delete),
        )
        .route(
            "/{key}/variants/{variant_id}/stock",
            patch(products::set_stock),
        )
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/items", post(cart::add))
        .route("/items/{id}", patch(cart::update).delete(cart::remove))
        .route("/merge", post(cart::merge))
        .route("/guest/{session_id}", get(cart::guest_summary))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index).post(orders::create))
        .route("/{id}", get(orders::show))
        .route("/{id}/payment-token", post(orders::payment_token))
        .route("/{id}/cancel", post(orders::cancel))
}

/// Create the promo routes router.
pub fn promo_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(promos::index).post(promos::create))
        .route("/validate", post(promos::validate))
        .route("/{id}", put(promos::update).delete(promos::delete))
}

/// Create the blog routes router.
pub fn post_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(posts::index).post(posts::create))
        .route(
            "/{key}",
            get(posts::show).put(posts::update).delete(posts::delete),
        )
}

/// Create the back-office routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(admin::list_orders))
        .route("/orders/{id}/status", patch(admin::set_order_status))
        .route("/users", get(admin::list_users))
        .route("/users/{id}/role", patch(admin::set_user_role))
}

/// Create all `/api` routes.
pub fn api_routes() -> Router<AppState> {
    let general = Router::new()
        .nest("/account", account_routes())
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .nest("/orders", order_routes())
        .nest("/promos", promo_routes())
        .nest("/posts", post_routes())
        .nest("/admin", admin_routes())
        .layer(api_rate_limiter());

    Router::new()
        .nest("/auth", auth_routes().layer(auth_rate_limiter()))
        .route("/payments/notification", post(payments::notification))
        .merge(general)
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api", api_routes())
}
