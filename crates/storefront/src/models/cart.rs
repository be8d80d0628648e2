//! Cart view types.

use serde::Serialize;

use omahring_core::cart::{CartLine, cart_total, item_count};
use omahring_core::{CartId, Price, UserId};

/// Longest accepted anonymous session identifier.
const MAX_SESSION_ID_LEN: usize = 128;

/// Who a cart belongs to. Exactly one of user or browser session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartOwner {
    User(UserId),
    Session(String),
}

impl CartOwner {
    /// Build a session owner from a browser-generated identifier.
    ///
    /// Returns `None` for empty, oversized or non-printable identifiers.
    #[must_use]
    pub fn session(id: &str) -> Option<Self> {
        let id = id.trim();
        let valid = !id.is_empty()
            && id.len() <= MAX_SESSION_ID_LEN
            && id.chars().all(|c| c.is_ascii_graphic());
        valid.then(|| Self::Session(id.to_string()))
    }
}

/// A cart with its lines and derived totals.
#[derive(Debug, Clone, Serialize)]
pub struct Cart {
    /// `None` when the owner has no stored cart yet.
    pub id: Option<CartId>,
    pub owner: CartOwner,
    pub items: Vec<CartLine>,
    pub total: Price,
    pub item_count: u32,
}

impl Cart {
    /// An unsaved, empty cart.
    #[must_use]
    pub fn empty(owner: CartOwner) -> Self {
        Self {
            id: None,
            owner,
            items: Vec::new(),
            total: Price::zero(),
            item_count: 0,
        }
    }

    /// Build a cart view, deriving the totals from the lines.
    #[must_use]
    pub fn from_lines(id: CartId, owner: CartOwner, items: Vec<CartLine>) -> Self {
        let total = cart_total(&items);
        let item_count = item_count(&items);
        Self {
            id: Some(id),
            owner,
            items,
            total,
            item_count,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use omahring_core::{CartItemId, ProductId, VariantId};

    use super::*;

    #[test]
    fn test_session_owner_validation() {
        assert_eq!(
            CartOwner::session(" 4f1c-guest "),
            Some(CartOwner::Session("4f1c-guest".to_string()))
        );
        assert_eq!(CartOwner::session(""), None);
        assert_eq!(CartOwner::session("has space"), None);
        assert_eq!(CartOwner::session(&"x".repeat(129)), None);
    }

    #[test]
    fn test_cart_totals_are_derived() {
        let lines = vec![CartLine {
            id: Some(CartItemId::new(1)),
            product_id: ProductId::new(1),
            variant_id: VariantId::new(2),
            variant_name: "1 kg".to_string(),
            unit_price: Decimal::new(42_000, 0),
            quantity: 3,
        }];
        let cart = Cart::from_lines(CartId::new(7), CartOwner::User(UserId::new(1)), lines);
        assert_eq!(cart.total.amount, Decimal::new(126_000, 0));
        assert_eq!(cart.item_count, 3);
        assert!(!cart.is_empty());
        assert!(Cart::empty(CartOwner::User(UserId::new(1))).is_empty());
    }
}
