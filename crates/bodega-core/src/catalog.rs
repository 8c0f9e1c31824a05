//! # Catalog Entries
//!
//! Input types for creating and editing products. Stock is deliberately not
//! part of [`ProductUpdate`]: admin edits change catalog fields, and stock
//! only changes through the inventory ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::{Product, StockLocation};
use crate::validation::{
    validate_code, validate_location, validate_price_cents, validate_pieces_per_box,
    validate_product_name, validate_text, validate_tier_thresholds, ValidationResult,
};

/// A product as entered in the catalog form.
///
/// ## Example
/// ```rust
/// use bodega_core::catalog::NewProduct;
///
/// let entry = NewProduct::new("CJ-REF-600", "REF-600", "Refresco 600ml", 24, 900)
///     .with_tiers((1_400, 1), (1_250, 12), (1_100, 48))
///     .with_stock("L1", 240);
/// assert!(entry.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub box_code: String,
    pub product_code: String,
    pub name: String,
    pub pieces_per_box: i64,
    pub cost_cents: i64,
    pub price1_cents: i64,
    pub price1_min_qty: i64,
    pub price2_cents: i64,
    pub price2_min_qty: i64,
    pub price3_cents: i64,
    pub price3_min_qty: i64,
    pub price4_cents: Option<i64>,
    pub price5_cents: Option<i64>,
    pub category: String,
    pub image_url: Option<String>,
    /// Opening stock per location, in pieces.
    pub initial_stock: Vec<StockLocation>,
}

impl NewProduct {
    /// Starts an entry with a single flat price for every tier.
    pub fn new(
        box_code: impl Into<String>,
        product_code: impl Into<String>,
        name: impl Into<String>,
        pieces_per_box: i64,
        cost_cents: i64,
    ) -> Self {
        NewProduct {
            box_code: box_code.into(),
            product_code: product_code.into(),
            name: name.into(),
            pieces_per_box,
            cost_cents,
            price1_cents: cost_cents,
            price1_min_qty: 1,
            price2_cents: cost_cents,
            price2_min_qty: 1,
            price3_cents: cost_cents,
            price3_min_qty: 1,
            price4_cents: None,
            price5_cents: None,
            category: "General".to_string(),
            image_url: None,
            initial_stock: Vec::new(),
        }
    }

    /// Sets the three volume tiers as `(price_cents, min_qty)` pairs.
    pub fn with_tiers(mut self, t1: (i64, i64), t2: (i64, i64), t3: (i64, i64)) -> Self {
        self.price1_cents = t1.0;
        self.price1_min_qty = t1.1;
        self.price2_cents = t2.0;
        self.price2_min_qty = t2.1;
        self.price3_cents = t3.0;
        self.price3_min_qty = t3.1;
        self
    }

    /// Sets the special prices 4 and 5.
    pub fn with_special_prices(mut self, price4: Option<i64>, price5: Option<i64>) -> Self {
        self.price4_cents = price4;
        self.price5_cents = price5;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Adds opening stock at a location.
    pub fn with_stock(mut self, location: impl Into<String>, quantity: i64) -> Self {
        self.initial_stock.push(StockLocation::new(location, quantity));
        self
    }

    /// Validates every field of the entry.
    pub fn validate(&self) -> ValidationResult<()> {
        validate_code("box_code", &self.box_code)?;
        validate_code("product_code", &self.product_code)?;
        validate_product_name(&self.name)?;
        validate_pieces_per_box(self.pieces_per_box)?;
        validate_price_cents("cost", self.cost_cents)?;
        validate_price_cents("price1", self.price1_cents)?;
        validate_price_cents("price2", self.price2_cents)?;
        validate_price_cents("price3", self.price3_cents)?;
        if let Some(p) = self.price4_cents {
            validate_price_cents("price4", p)?;
        }
        if let Some(p) = self.price5_cents {
            validate_price_cents("price5", p)?;
        }
        validate_tier_thresholds(self.price1_min_qty, self.price2_min_qty, self.price3_min_qty)?;
        validate_text("category", &self.category, 100)?;

        for (i, entry) in self.initial_stock.iter().enumerate() {
            validate_location("location", &entry.location)?;
            if entry.quantity < 0 {
                return Err(ValidationError::OutOfRange {
                    field: "initial_stock quantity".to_string(),
                    min: 0,
                    max: i64::MAX,
                });
            }
            if self.initial_stock[..i]
                .iter()
                .any(|prev| prev.location == entry.location)
            {
                return Err(ValidationError::InvalidFormat {
                    field: "initial_stock".to_string(),
                    reason: format!("location {} listed twice", entry.location),
                });
            }
        }

        Ok(())
    }

    /// Builds the product document. Zero-quantity opening entries are dropped.
    pub fn into_product(self, id: String, now: DateTime<Utc>) -> Product {
        Product {
            id,
            box_code: self.box_code.trim().to_string(),
            product_code: self.product_code.trim().to_string(),
            name: self.name.trim().to_string(),
            pieces_per_box: self.pieces_per_box,
            cost_cents: self.cost_cents,
            price1_cents: self.price1_cents,
            price1_min_qty: self.price1_min_qty,
            price2_cents: self.price2_cents,
            price2_min_qty: self.price2_min_qty,
            price3_cents: self.price3_cents,
            price3_min_qty: self.price3_min_qty,
            price4_cents: self.price4_cents,
            price5_cents: self.price5_cents,
            category: self.category.trim().to_string(),
            is_available: true,
            image_url: self.image_url,
            stock_locations: self
                .initial_stock
                .into_iter()
                .filter(|s| s.quantity > 0)
                .collect(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }
}

/// Admin edit of catalog fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub pieces_per_box: Option<i64>,
    pub cost_cents: Option<i64>,
    pub price1: Option<(i64, i64)>,
    pub price2: Option<(i64, i64)>,
    pub price3: Option<(i64, i64)>,
    pub price4_cents: Option<Option<i64>>,
    pub price5_cents: Option<Option<i64>>,
    pub category: Option<String>,
    pub is_available: Option<bool>,
    pub image_url: Option<Option<String>>,
}

impl ProductUpdate {
    /// Applies the edit to a copy of `product` and validates the result.
    pub fn apply(&self, product: &Product) -> ValidationResult<Product> {
        let mut p = product.clone();

        if let Some(name) = &self.name {
            validate_product_name(name)?;
            p.name = name.trim().to_string();
        }
        if let Some(pieces) = self.pieces_per_box {
            validate_pieces_per_box(pieces)?;
            p.pieces_per_box = pieces;
        }
        if let Some(cost) = self.cost_cents {
            validate_price_cents("cost", cost)?;
            p.cost_cents = cost;
        }
        if let Some((price, min)) = self.price1 {
            validate_price_cents("price1", price)?;
            p.price1_cents = price;
            p.price1_min_qty = min;
        }
        if let Some((price, min)) = self.price2 {
            validate_price_cents("price2", price)?;
            p.price2_cents = price;
            p.price2_min_qty = min;
        }
        if let Some((price, min)) = self.price3 {
            validate_price_cents("price3", price)?;
            p.price3_cents = price;
            p.price3_min_qty = min;
        }
        if let Some(price4) = self.price4_cents {
            if let Some(v) = price4 {
                validate_price_cents("price4", v)?;
            }
            p.price4_cents = price4;
        }
        if let Some(price5) = self.price5_cents {
            if let Some(v) = price5 {
                validate_price_cents("price5", v)?;
            }
            p.price5_cents = price5;
        }
        validate_tier_thresholds(p.price1_min_qty, p.price2_min_qty, p.price3_min_qty)?;

        if let Some(category) = &self.category {
            validate_text("category", category, 100)?;
            p.category = category.trim().to_string();
        }
        if let Some(available) = self.is_available {
            p.is_available = available;
        }
        if let Some(url) = &self.image_url {
            p.image_url = url.clone();
        }

        Ok(p)
    }
}
