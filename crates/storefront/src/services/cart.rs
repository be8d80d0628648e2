//! Cart operations on top of the cart rules in `omahring_core::cart`.

use sqlx::PgPool;
use thiserror::Error;

use omahring_core::cart::{
    CartError, CartLine, MergeMode, MergeOutcome, ensure_in_stock, quantity_after_add,
};
use omahring_core::{CartItemId, ProductId, UserId, VariantId};

use crate::db::products::ProductRepository;
use crate::db::{CartRepository, RepositoryError};
use crate::models::{Cart, CartOwner};

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartServiceError {
    /// A cart rule refused the change.
    #[error(transparent)]
    Rule(#[from] CartError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Result of merging a guest cart at login.
#[derive(Debug, serde::Serialize)]
pub struct MergeSummary {
    pub cart: Cart,
    /// What happened to each guest line. Empty in replace mode.
    pub outcomes: Vec<MergeOutcome>,
    /// Whether a guest cart existed.
    pub guest_found: bool,
}

/// Cart service.
pub struct CartService<'a> {
    carts: CartRepository<'a>,
    products: ProductRepository<'a>,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            carts: CartRepository::new(pool),
            products: ProductRepository::new(pool),
        }
    }

    /// The owner's cart, empty if none is stored.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Repository` if a query fails.
    pub async fn get(&self, owner: &CartOwner) -> Result<Cart, CartServiceError> {
        Ok(self.carts.get(owner).await?)
    }

    /// Add units of a variant.
    ///
    /// Quantities for a variant already in the cart are summed and the sum
    /// must be covered by stock. New lines snapshot the effective price.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Unavailable` if the product is missing, inactive or
    /// does not own the variant, and `CartError::InsufficientStock` when stock
    /// does not cover the resulting quantity.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        owner: &CartOwner,
        product_id: ProductId,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<Cart, CartServiceError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity.into());
        }

        let found = self
            .products
            .find_purchasable(product_id, variant_id)
            .await?
            .ok_or(CartError::Unavailable)?;

        let current = self.carts.get(owner).await?;
        let existing = current
            .items
            .iter()
            .find(|l| l.product_id == product_id && l.variant_id == variant_id);

        let new_quantity =
            quantity_after_add(existing.map(|l| l.quantity), quantity, found.variant.stock)?;

        let line = existing.map_or_else(
            || CartLine {
                id: None,
                product_id,
                variant_id,
                variant_name: found.variant.name.clone(),
                unit_price: found.variant.effective_price(),
                quantity: new_quantity,
            },
            |l| CartLine {
                quantity: new_quantity,
                ..l.clone()
            },
        );

        let cart_id = match current.id {
            Some(id) => id,
            None => self.carts.ensure(owner).await?,
        };
        self.carts.save_line(cart_id, &line).await?;

        Ok(self.carts.get(owner).await?)
    }

    /// Set a line's quantity. Zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` if the line is not in the owner's
    /// cart and `CartError::InsufficientStock` when stock does not cover the
    /// new quantity.
    #[tracing::instrument(skip(self))]
    pub async fn update_item(
        &self,
        owner: &CartOwner,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<Cart, CartServiceError> {
        let current = self.carts.get(owner).await?;
        let cart_id = current.id.ok_or(CartError::ItemNotFound)?;
        let line = current
            .items
            .iter()
            .find(|l| l.id == Some(item_id))
            .ok_or(CartError::ItemNotFound)?;

        if quantity == 0 {
            self.carts
                .remove_line(cart_id, item_id)
                .await
                .map_err(not_found_as_item)?;
            return Ok(self.carts.get(owner).await?);
        }

        let found = self
            .products
            .find_purchasable(line.product_id, line.variant_id)
            .await?
            .ok_or(CartError::Unavailable)?;
        ensure_in_stock(quantity, found.variant.stock)?;

        self.carts
            .set_quantity(cart_id, item_id, quantity)
            .await
            .map_err(not_found_as_item)?;
        Ok(self.carts.get(owner).await?)
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` if the line is not in the owner's cart.
    pub async fn remove_item(
        &self,
        owner: &CartOwner,
        item_id: CartItemId,
    ) -> Result<Cart, CartServiceError> {
        let current = self.carts.get(owner).await?;
        let cart_id = current.id.ok_or(CartError::ItemNotFound)?;
        self.carts
            .remove_line(cart_id, item_id)
            .await
            .map_err(not_found_as_item)?;
        Ok(self.carts.get(owner).await?)
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Repository` if the delete fails.
    pub async fn clear(&self, owner: &CartOwner) -> Result<Cart, CartServiceError> {
        self.carts.delete(owner).await?;
        Ok(Cart::empty(owner.clone()))
    }

    /// Merge (or discard) the guest cart of `session_id` after login.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Repository` if the transaction fails.
    #[tracing::instrument(skip(self, session_id))]
    pub async fn merge(
        &self,
        user_id: UserId,
        session_id: &str,
        mode: MergeMode,
    ) -> Result<MergeSummary, CartServiceError> {
        let result = self.carts.merge_guest(user_id, session_id, mode).await?;
        let outcomes = result.plan.map(|p| p.outcomes).unwrap_or_default();

        let skipped = outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o,
                    MergeOutcome::SkippedOutOfStock { .. } | MergeOutcome::SkippedUnavailable { .. }
                )
            })
            .count();
        tracing::info!(
            guest_found = result.guest_found,
            merged = outcomes.len() - skipped,
            skipped,
            "Guest cart merged"
        );

        let cart = self.carts.get(&CartOwner::User(user_id)).await?;
        Ok(MergeSummary {
            cart,
            outcomes,
            guest_found: result.guest_found,
        })
    }
}

fn not_found_as_item(e: RepositoryError) -> CartServiceError {
    match e {
        RepositoryError::NotFound => CartError::ItemNotFound.into(),
        other => other.into(),
    }
}
