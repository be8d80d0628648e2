//! Domain models for the storefront API.
//!
//! These are the validated shapes handlers work with and serialize to JSON.
//! Database row types live next to their queries in [`crate::db`].

pub mod cart;
pub mod order;
pub mod post;
pub mod product;
pub mod promo;
pub mod session;
pub mod user;

pub use cart::{Cart, CartOwner};
pub use order::{Order, OrderItem, ShippingAddress};
pub use post::{Post, PostInput};
pub use product::{Product, ProductInput, Variant, VariantInput};
pub use promo::{Promo, PromoInput};
pub use session::{CurrentUser, keys as session_keys};
pub use user::{Address, AddressInput, User};
