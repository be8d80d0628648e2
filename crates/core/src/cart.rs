//! Cart arithmetic and guest-cart merge planning.
//!
//! A cart's cached total is never updated incrementally: every mutation
//! re-derives it from the lines with [`cart_total`]. Merging a guest cart into
//! a user's cart is planned here as a pure function so the storefront only has
//! to persist the resulting lines.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{CartItemId, Price, ProductId, VariantId};

/// Errors raised by cart rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Quantity was zero where at least one unit is required.
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// The variant does not have enough stock for the requested quantity.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        /// Quantity the line would end up with.
        requested: u32,
        /// Units currently in stock.
        available: u32,
    },

    /// The variant no longer exists or its product is inactive.
    #[error("variant is no longer available")]
    Unavailable,

    /// No line with that id exists in the cart.
    #[error("cart item not found")]
    ItemNotFound,
}

/// Identity of a cart line: one line per (product, variant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineKey {
    pub product_id: ProductId,
    pub variant_id: VariantId,
}

/// A cart line with the variant snapshot taken when it was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Database id, `None` for lines not yet persisted.
    pub id: Option<CartItemId>,
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub variant_name: String,
    /// Effective unit price at the time the line was added.
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl CartLine {
    /// The (product, variant) identity of this line.
    #[must_use]
    pub const fn key(&self) -> LineKey {
        LineKey {
            product_id: self.product_id,
            variant_id: self.variant_id,
        }
    }

    /// `unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        Price::idr(self.unit_price).times(self.quantity)
    }
}

/// Derive a cart total from its lines.
#[must_use]
pub fn cart_total(lines: &[CartLine]) -> Price {
    lines.iter().map(CartLine::line_total).sum()
}

/// Total number of units across all lines.
#[must_use]
pub fn item_count(lines: &[CartLine]) -> u32 {
    lines.iter().map(|l| l.quantity).sum()
}

/// Quantity a line should have after adding `requested` units.
///
/// `existing` is the quantity already in the cart for the same variant.
///
/// # Errors
///
/// Returns [`CartError::InvalidQuantity`] for a zero request and
/// [`CartError::InsufficientStock`] when the combined quantity exceeds `stock`.
pub fn quantity_after_add(
    existing: Option<u32>,
    requested: u32,
    stock: u32,
) -> Result<u32, CartError> {
    if requested == 0 {
        return Err(CartError::InvalidQuantity);
    }
    let total = existing.unwrap_or(0).saturating_add(requested);
    ensure_in_stock(total, stock)?;
    Ok(total)
}

/// Check that `quantity` units can be covered by `stock`.
///
/// # Errors
///
/// Returns [`CartError::InsufficientStock`] when they cannot.
pub const fn ensure_in_stock(quantity: u32, stock: u32) -> Result<(), CartError> {
    if quantity > stock {
        return Err(CartError::InsufficientStock {
            requested: quantity,
            available: stock,
        });
    }
    Ok(())
}

/// What to do with the guest cart when a user logs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Fold guest lines into the user's cart, then delete the guest cart.
    #[default]
    Merge,
    /// Delete the guest cart and keep the user's cart unchanged.
    Replace,
}

/// What happened to a single guest line during a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// Added to an existing user line with the same variant.
    Summed {
        key: LineKey,
        quantity: u32,
        /// The sum is more than current stock. Checkout refuses the cart
        /// until the buyer lowers the line.
        over_stock: bool,
    },
    /// Appended as a new line.
    Appended { key: LineKey, quantity: u32 },
    /// Dropped because stock does not cover the guest quantity.
    SkippedOutOfStock { key: LineKey, available: u32 },
    /// Dropped because the variant is gone or the product is inactive.
    SkippedUnavailable { key: LineKey },
}

/// Result of planning a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    /// The user's cart lines after the merge. Lines with an `id` already exist
    /// and may have a new quantity; lines without one must be inserted.
    pub lines: Vec<CartLine>,
    /// One entry per guest line, in guest order.
    pub outcomes: Vec<MergeOutcome>,
}

impl MergePlan {
    /// Derived total of the merged cart.
    #[must_use]
    pub fn total(&self) -> Price {
        cart_total(&self.lines)
    }
}

/// Plan folding `guest` lines into `user` lines.
///
/// `stock_of` returns current stock for a variant, or `None` if the variant
/// can no longer be sold. Matching lines are summed with no stock ceiling,
/// unlike add-to-cart; the outcome flags sums that exceed stock.
/// Non-matching lines are appended only when stock covers their quantity.
/// Guest lines keep their price snapshot.
pub fn plan_merge<F>(user: &[CartLine], guest: &[CartLine], stock_of: F) -> MergePlan
where
    F: Fn(VariantId) -> Option<u32>,
{
    let mut lines = user.to_vec();
    let mut outcomes = Vec::with_capacity(guest.len());

    for guest_line in guest {
        let key = guest_line.key();
        let Some(stock) = stock_of(guest_line.variant_id) else {
            outcomes.push(MergeOutcome::SkippedUnavailable { key });
            continue;
        };

        if let Some(existing) = lines.iter_mut().find(|l| l.key() == key) {
            let quantity = existing.quantity.saturating_add(guest_line.quantity);
            existing.quantity = quantity;
            outcomes.push(MergeOutcome::Summed {
                key,
                quantity,
                over_stock: quantity > stock,
            });
        } else if guest_line.quantity <= stock && guest_line.quantity > 0 {
            lines.push(CartLine {
                id: None,
                ..guest_line.clone()
            });
            outcomes.push(MergeOutcome::Appended {
                key,
                quantity: guest_line.quantity,
            });
        } else {
            outcomes.push(MergeOutcome::SkippedOutOfStock {
                key,
                available: stock,
            });
        }
    }

    MergePlan { lines, outcomes }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: Option<i32>, product: i32, variant: i32, price: i64, qty: u32) -> CartLine {
        CartLine {
            id: id.map(CartItemId::new),
            product_id: ProductId::new(product),
            variant_id: VariantId::new(variant),
            variant_name: format!("Varian {variant}"),
            unit_price: Decimal::new(price, 0),
            quantity: qty,
        }
    }

    #[test]
    fn test_cart_total_is_sum_of_lines() {
        let lines = [line(Some(1), 1, 10, 15_000, 2), line(Some(2), 2, 20, 7_500, 4)];
        assert_eq!(cart_total(&lines).amount, Decimal::new(60_000, 0));
        assert_eq!(item_count(&lines), 6);
        assert_eq!(cart_total(&[]).amount, Decimal::ZERO);
    }

    #[test]
    fn test_quantity_after_add() {
        assert_eq!(quantity_after_add(None, 2, 5), Ok(2));
        assert_eq!(quantity_after_add(Some(3), 2, 5), Ok(5));
        assert_eq!(
            quantity_after_add(Some(3), 3, 5),
            Err(CartError::InsufficientStock {
                requested: 6,
                available: 5
            })
        );
        assert_eq!(quantity_after_add(None, 0, 5), Err(CartError::InvalidQuantity));
    }

    #[test]
    fn test_merge_sums_matching_lines() {
        let user = [line(Some(1), 1, 10, 15_000, 2)];
        let guest = [line(Some(9), 1, 10, 15_000, 3)];
        let plan = plan_merge(&user, &guest, |_| Some(10));

        assert_eq!(plan.lines.len(), 1);
        assert_eq!(plan.lines[0].quantity, 5);
        assert_eq!(plan.lines[0].id, Some(CartItemId::new(1)));
        assert!(matches!(
            plan.outcomes[0],
            MergeOutcome::Summed {
                quantity: 5,
                over_stock: false,
                ..
            }
        ));
        assert_eq!(plan.total().amount, Decimal::new(75_000, 0));
    }

    #[test]
    fn test_merge_sums_past_stock() {
        let user = [line(Some(1), 1, 10, 15_000, 2)];
        let guest = [line(Some(9), 1, 10, 15_000, 5)];
        let plan = plan_merge(&user, &guest, |_| Some(4));

        assert_eq!(plan.lines[0].quantity, 7);
        assert!(matches!(
            plan.outcomes[0],
            MergeOutcome::Summed {
                quantity: 7,
                over_stock: true,
                ..
            }
        ));
        // add-to-cart would have refused the same sum
        assert!(quantity_after_add(Some(2), 5, 4).is_err());
    }

    #[test]
    fn test_merge_appends_only_when_stock_covers() {
        let user = [line(Some(1), 1, 10, 15_000, 1)];
        let guest = [
            line(Some(8), 2, 20, 9_000, 2),
            line(Some(9), 3, 30, 5_000, 7),
        ];
        let plan = plan_merge(&user, &guest, |v| match v.as_i32() {
            20 => Some(2),
            30 => Some(6),
            _ => Some(100),
        });

        assert_eq!(plan.lines.len(), 2);
        assert_eq!(plan.lines[1].id, None);
        assert_eq!(plan.lines[1].variant_id, VariantId::new(20));
        assert!(matches!(plan.outcomes[0], MergeOutcome::Appended { quantity: 2, .. }));
        assert!(matches!(
            plan.outcomes[1],
            MergeOutcome::SkippedOutOfStock { available: 6, .. }
        ));
    }

    #[test]
    fn test_merge_skips_unavailable_variants() {
        let guest = [line(Some(9), 4, 40, 5_000, 1)];
        let plan = plan_merge(&[], &guest, |_| None);
        assert!(plan.lines.is_empty());
        assert!(matches!(
            plan.outcomes[0],
            MergeOutcome::SkippedUnavailable { .. }
        ));
    }

    #[test]
    fn test_merge_into_empty_user_cart() {
        let guest = [line(Some(9), 1, 10, 15_000, 2)];
        let plan = plan_merge(&[], &guest, |_| Some(2));
        assert_eq!(plan.lines.len(), 1);
        assert_eq!(plan.total().amount, Decimal::new(30_000, 0));
    }
}
