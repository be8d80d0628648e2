//! Seed the database with a small demo catalog.
//!
//! Products and promos that already exist (same slug or code) are skipped,
//! so the command can be re-run against a populated database.

use omahring_core::PromoType;
use omahring_core::promo::PromoRules;
use omahring_storefront::db::{ProductRepository, PromoRepository, RepositoryError};
use omahring_storefront::models::{ProductInput, PromoInput, VariantInput};
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::connect;

fn variant(name: &str, price: i64, sale_price: Option<i64>, stock: u32) -> VariantInput {
    VariantInput {
        name: name.to_owned(),
        price: Decimal::from(price),
        sale_price: sale_price.map(Decimal::from),
        stock,
    }
}

fn product(
    name: &str,
    slug: &str,
    category: &str,
    description: &str,
    variants: Vec<VariantInput>,
) -> ProductInput {
    ProductInput {
        name: name.to_owned(),
        slug: slug.to_owned(),
        description: description.to_owned(),
        category: category.to_owned(),
        images: Vec::new(),
        is_active: true,
        variants,
    }
}

/// The demo catalog: feed, cages and accessories.
fn demo_products() -> Vec<ProductInput> {
    vec![
        product(
            "Voer Kenari Premium",
            "voer-kenari-premium",
            "pakan",
            "Pakan racikan untuk kenari masa kicau dan mabung.",
            vec![
                variant("250 gr", 28_000, None, 40),
                variant("1 kg", 95_000, Some(89_000), 15),
            ],
        ),
        product(
            "Jangkrik Kering",
            "jangkrik-kering",
            "pakan",
            "Jangkrik oven tanpa pengawet, cocok untuk murai dan kacer.",
            vec![variant("100 gr", 35_000, None, 25)],
        ),
        product(
            "Sangkar Bambu Kotak",
            "sangkar-bambu-kotak",
            "sangkar",
            "Sangkar bambu ukir untuk lomba dan harian.",
            vec![
                variant("No. 1", 185_000, None, 6),
                variant("No. 2", 225_000, None, 4),
            ],
        ),
        product(
            "Cepuk Pakan Akrilik",
            "cepuk-pakan-akrilik",
            "aksesoris",
            "Tempat pakan dan minum bening, mudah dibersihkan.",
            vec![variant("Sepasang", 22_000, Some(18_000), 60)],
        ),
    ]
}

fn demo_promo() -> PromoInput {
    PromoInput {
        code: "KICAU10".to_owned(),
        description: "Diskon 10% untuk pembelian minimal Rp100.000".to_owned(),
        rules: PromoRules {
            promo_type: PromoType::Percentage,
            value: Decimal::from(10),
            min_purchase: Some(Decimal::from(100_000)),
            max_discount: Some(Decimal::from(50_000)),
            starts_at: None,
            ends_at: None,
            usage_limit: Some(100),
            used_count: 0,
            is_active: true,
            member_only: false,
        },
    }
}

/// Insert the demo catalog.
///
/// # Errors
///
/// Returns an error if environment variables are missing or a database
/// operation other than a duplicate insert fails.
pub async fn demo() -> Result<(), Box<dyn std::error::Error>> {
    let pool = connect().await?;
    let products = ProductRepository::new(&pool);

    let (mut created, mut skipped) = (0, 0);
    for input in demo_products() {
        if let Err(message) = input.validate() {
            warn!(slug = %input.slug, %message, "Skipping invalid demo product");
            continue;
        }
        match products.create(&input).await {
            Ok(product) => {
                info!(id = %product.id, slug = %product.slug, "Created product");
                created += 1;
            }
            Err(RepositoryError::Conflict(_)) => {
                info!(slug = %input.slug, "Product exists, skipping");
                skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    let promo = demo_promo();
    match PromoRepository::new(&pool).create(&promo.code, &promo).await {
        Ok(_) => info!(code = %promo.code, "Created promo"),
        Err(RepositoryError::Conflict(_)) => info!(code = %promo.code, "Promo exists, skipping"),
        Err(e) => return Err(e.into()),
    }

    info!(created, skipped, "Seeding complete");
    Ok(())
}
