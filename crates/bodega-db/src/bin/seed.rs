//! # Seed Data Generator
//!
//! Populates a database with catalog products for development.
//!
//! ## Usage
//! ```bash
//! # Generate 500 products (default)
//! cargo run -p bodega-db --bin seed
//!
//! # Generate custom amount into a specific file
//! cargo run -p bodega-db --bin seed -- --count 2000 --db ./data/bodega.db
//! ```
//!
//! ## Generated Products
//! Each product gets:
//! - Box code `CJ-{FAMILY}-{N}` and piece code `{FAMILY}-{N}`
//! - A box of 6 to 48 pieces
//! - A three-tier price ladder above cost (piece, half box, box and up)
//! - Opening stock at the store `L1` and the warehouse `BODEGA-1`

use bodega_core::catalog::NewProduct;
use bodega_db::{Database, DbConfig};
use chrono::Utc;
use std::env;
use tracing::{info, warn};
use uuid::Uuid;

/// Product families: (code, category, names)
const FAMILIES: &[(&str, &str, &[&str])] = &[
    (
        "BEB",
        "Bebidas",
        &[
            "Refresco cola 600ml",
            "Refresco naranja 600ml",
            "Agua natural 1L",
            "Agua mineral 355ml",
            "Jugo de mango 500ml",
            "Bebida isotónica 1L",
            "Té helado 500ml",
            "Leche entera 1L",
        ],
    ),
    (
        "BOT",
        "Botanas",
        &[
            "Papas sal 45g",
            "Cacahuate japonés 100g",
            "Chicharrón de harina 80g",
            "Palomitas 90g",
            "Totopos 200g",
            "Galletas de animalitos 250g",
            "Galletas saladas 137g",
            "Pan dulce empacado",
        ],
    ),
    (
        "ABA",
        "Abarrotes",
        &[
            "Arroz 1kg",
            "Frijol negro 1kg",
            "Azúcar estándar 1kg",
            "Aceite vegetal 900ml",
            "Atún en agua 140g",
            "Sopa de pasta 200g",
            "Café soluble 120g",
            "Sal de mesa 1kg",
        ],
    ),
    (
        "LIM",
        "Limpieza",
        &[
            "Detergente en polvo 1kg",
            "Jabón de barra 400g",
            "Cloro 1L",
            "Suavizante 850ml",
            "Papel higiénico 4 rollos",
            "Lavatrastes líquido 750ml",
        ],
    ),
];

/// Box sizes in pieces
const BOX_SIZES: &[i64] = &[6, 12, 20, 24, 48];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 500;
    let mut db_path = String::from("./bodega_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(500);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Bodega POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: 500)");
                println!("  -d, --db <PATH>    Database file path (default: ./bodega_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(db = %db_path, count, "Seeding catalog");

    let db = Database::new(DbConfig::new(&db_path)).await?;

    let existing = db.products().count().await?;
    if existing > 0 {
        warn!(existing, "Database already has products, skipping seed");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let mut generated = 0;
    let mut seed = 0usize;

    while generated < count {
        let (family, category, names) = FAMILIES[seed % FAMILIES.len()];
        let name = names[(seed / FAMILIES.len()) % names.len()];
        let entry = generate_product(family, category, name, seed);
        seed += 1;

        if let Err(e) = entry.validate() {
            warn!(error = %e, "Skipping invalid generated product");
            continue;
        }

        let product = entry.into_product(Uuid::new_v4().to_string(), Utc::now());
        if let Err(e) = db.products().insert(&product).await {
            warn!(code = %product.product_code, error = %e, "Failed to insert product");
            continue;
        }

        generated += 1;
        if generated % 100 == 0 {
            info!(generated, "Progress");
        }
    }

    let elapsed = start.elapsed();
    info!(
        generated,
        elapsed_ms = elapsed.as_millis() as u64,
        rate = generated as f64 / elapsed.as_secs_f64(),
        "Seed complete"
    );

    Ok(())
}

/// Builds one catalog entry deterministically from `seed`.
fn generate_product(family: &str, category: &str, name: &str, seed: usize) -> NewProduct {
    let pieces_per_box = BOX_SIZES[seed % BOX_SIZES.len()];

    // Cost $5.00 - $44.95 per piece
    let cost_cents = 500 + ((seed * 37) % 800) as i64 * 5;

    // Piece price 40% over cost, half box 30%, full box 20%
    let tier1 = cost_cents * 140 / 100;
    let tier2 = cost_cents * 130 / 100;
    let tier3 = cost_cents * 120 / 100;
    let half_box = (pieces_per_box / 2).max(2);

    let suffix = if seed >= 100 {
        format!(" #{}", seed / 100)
    } else {
        String::new()
    };

    NewProduct::new(
        format!("CJ-{}-{:05}", family, seed),
        format!("{}-{:05}", family, seed),
        format!("{}{}", name, suffix),
        pieces_per_box,
        cost_cents,
    )
    .with_tiers((tier1, 1), (tier2, half_box), (tier3, pieces_per_box))
    .with_category(category)
    .with_stock("L1", ((seed * 13) % 120) as i64)
    .with_stock("BODEGA-1", pieces_per_box * ((seed % 10) as i64 + 1))
}
