//! Business logic services for storefront.
//!
//! Route handlers stay thin; anything that touches more than one repository
//! or an external API lives here.
//!
//! # Services
//!
//! - [`auth`] - Registration and password login
//! - [`cart`] - Cart mutations and guest-cart merge
//! - [`checkout`] - Order placement, payment tokens and payment notifications
//! - [`midtrans`] - Midtrans Snap API client and notification signatures

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod midtrans;

pub use auth::{AuthError, AuthService, Registration};
pub use cart::{CartService, CartServiceError, MergeSummary};
pub use checkout::{CheckoutError, CheckoutRequest, CheckoutService, NotificationOutcome};
pub use midtrans::{MidtransClient, MidtransError};
