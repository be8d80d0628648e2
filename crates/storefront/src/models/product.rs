//! Catalog domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use omahring_core::{Price, ProductId, VariantId};

/// A catalog entry with its purchasable variants.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub category: String,
    /// Image URLs, first one is the cover.
    pub images: Vec<String>,
    pub is_active: bool,
    pub variants: Vec<Variant>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Find a variant of this product by id.
    #[must_use]
    pub fn variant(&self, id: VariantId) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == id)
    }

    /// Lowest effective price across variants, for listing cards.
    #[must_use]
    pub fn price_from(&self) -> Option<Price> {
        self.variants
            .iter()
            .map(Variant::effective_price)
            .min()
            .map(Price::idr)
    }
}

/// A purchasable option of a product with its own price and stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub stock: u32,
}

impl Variant {
    /// Sale price if set, otherwise the regular price.
    #[must_use]
    pub fn effective_price(&self) -> Decimal {
        self.sale_price.unwrap_or(self.price)
    }
}

/// Variant fields accepted from the back office.
#[derive(Debug, Clone, Deserialize)]
pub struct VariantInput {
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub sale_price: Option<Decimal>,
    #[serde(default)]
    pub stock: u32,
}

/// Product fields accepted from the back office.
///
/// `variants` replaces the product's variant list wholesale.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub variants: Vec<VariantInput>,
}

const fn default_active() -> bool {
    true
}

impl ProductInput {
    /// Check names, slug and variant prices.
    ///
    /// # Errors
    ///
    /// Returns a client-facing message describing the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Nama produk wajib diisi".to_string());
        }
        if self.category.trim().is_empty() {
            return Err("Kategori wajib diisi".to_string());
        }
        if !is_valid_slug(&self.slug) {
            return Err("Slug hanya boleh berisi huruf kecil, angka dan tanda hubung".to_string());
        }
        if self.variants.is_empty() {
            return Err("Produk harus memiliki minimal satu varian".to_string());
        }
        for variant in &self.variants {
            if variant.name.trim().is_empty() {
                return Err("Nama varian wajib diisi".to_string());
            }
            if variant.price < Decimal::ZERO {
                return Err(format!("Harga varian {} tidak boleh negatif", variant.name));
            }
            if let Some(sale) = variant.sale_price
                && (sale < Decimal::ZERO || sale > variant.price)
            {
                return Err(format!(
                    "Harga diskon varian {} harus di antara 0 dan harga normal",
                    variant.name
                ));
            }
        }
        let mut names: Vec<&str> = self.variants.iter().map(|v| v.name.trim()).collect();
        names.sort_unstable();
        if names.windows(2).any(|w| matches!(w, [a, b] if a == b)) {
            return Err("Nama varian tidak boleh sama".to_string());
        }
        Ok(())
    }
}

/// Whether `slug` is lowercase ASCII words joined by single dashes.
#[must_use]
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
