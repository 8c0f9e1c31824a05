//! # Cart
//!
//! The cart as a plain value: the register builds it, the sale processor
//! consumes it. Nothing here is shared or locked; whoever owns the cart
//! passes it by reference.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Operations                                      │
//! │                                                                         │
//! │  Scan box/piece ─────► add_item() ──────────► merge (product, unit)    │
//! │                                               reprice by total pieces   │
//! │                                                                         │
//! │  Change quantity ────► update_quantity() ───► 0 removes the line       │
//! │                                                                         │
//! │  Pick price 4/5 ─────► set_price_level() ───► pins the line price      │
//! │                                                                         │
//! │  Checkout ───────────► to_sale_lines() ─────► sale processor           │
//! │                                                                         │
//! │  Every change that adds pieces is bounded by the pooled stock the      │
//! │  caller read for that product.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::pricing::{price_for_level, tier_level, tier_price, PriceLevel};
use crate::ticket::SaleLine;
use crate::types::{Product, UnitType};
use crate::validation::validate_quantity;
use crate::MAX_CART_ITEMS;

/// A line in the cart.
///
/// The product is a snapshot taken when the line was added, so the register
/// keeps showing the same ladder even if the catalog changes mid-sale. The
/// processor re-reads cost and stock at checkout.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product: Product,
    /// Quantity in `unit_type`.
    pub quantity: i64,
    pub unit_type: UnitType,
    /// Price per piece currently applied.
    pub applied_price_cents: i64,
    pub price_level: PriceLevel,
    /// True when the cashier picked the level; volume repricing skips it.
    pub pinned: bool,
}

impl CartItem {
    pub fn pieces(&self) -> i64 {
        self.product.pieces_for(self.quantity, self.unit_type)
    }

    pub fn applied_price(&self) -> Money {
        Money::from_cents(self.applied_price_cents)
    }

    /// Applied price × pieces.
    pub fn line_total(&self) -> Money {
        self.applied_price().multiply_quantity(self.pieces())
    }

    fn matches(&self, product_id: &str, unit: UnitType) -> bool {
        self.product.id == product_id && self.unit_type == unit
    }
}

/// The register's cart.
///
/// ## Invariants
/// - Lines are unique by (product, unit type)
/// - Quantity is always > 0 (setting 0 removes the line)
/// - At most [`MAX_CART_ITEMS`] lines
/// - Pieces per product never exceed the stock the caller reported
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub items: Vec<CartItem>,
}

impl Cart {
    pub fn new() -> Self {
        Cart { items: Vec::new() }
    }

    /// Adds `quantity` of `product` in `unit`, merging with an existing line
    /// of the same unit.
    ///
    /// `available` is the pooled stock of the product at the register's
    /// location; the cart's pieces for the product may not exceed it.
    ///
    /// ```rust,ignore
    /// // tiers 8/1, 7/12, 6/50
    /// cart.add_item(&product, 15, UnitType::Pieces, 100)?;
    /// assert_eq!(cart.items[0].applied_price_cents, 700);
    /// ```
    pub fn add_item(
        &mut self,
        product: &Product,
        quantity: i64,
        unit: UnitType,
        available: i64,
    ) -> CoreResult<()> {
        validate_quantity(quantity)?;

        let existing = self.items.iter().position(|i| i.matches(&product.id, unit));
        let new_qty = existing.map_or(0, |idx| self.items[idx].quantity) + quantity;
        validate_quantity(new_qty)?;

        let requested = self.total_pieces_for(&product.id) + product.pieces_for(quantity, unit);
        check_available(product, requested, available)?;

        match existing {
            Some(idx) => self.items[idx].quantity = new_qty,
            None => {
                if self.items.len() >= MAX_CART_ITEMS {
                    return Err(CoreError::CartTooLarge { max: MAX_CART_ITEMS });
                }
                let pieces = product.pieces_for(quantity, unit);
                self.items.push(CartItem {
                    product: product.clone(),
                    quantity,
                    unit_type: unit,
                    applied_price_cents: tier_price(product, pieces).cents(),
                    price_level: tier_level(product, pieces),
                    pinned: false,
                });
            }
        }

        self.reprice(&product.id);
        Ok(())
    }

    /// Sets the quantity of a line. Zero removes it.
    pub fn update_quantity(
        &mut self,
        product_id: &str,
        unit: UnitType,
        quantity: i64,
        available: i64,
    ) -> CoreResult<()> {
        if quantity == 0 {
            return self.remove_item(product_id, unit);
        }
        validate_quantity(quantity)?;

        let idx = self.position(product_id, unit)?;
        let item = &self.items[idx];
        let requested = self.total_pieces_for(product_id) - item.pieces()
            + item.product.pieces_for(quantity, unit);
        check_available(&item.product, requested, available)?;

        self.items[idx].quantity = quantity;
        self.reprice(product_id);
        Ok(())
    }

    /// Removes a line.
    pub fn remove_item(&mut self, product_id: &str, unit: UnitType) -> CoreResult<()> {
        let idx = self.position(product_id, unit)?;
        self.items.remove(idx);
        self.reprice(product_id);
        Ok(())
    }

    /// Pins a line to an explicit price level, or returns it to volume
    /// pricing with `None`.
    pub fn set_price_level(
        &mut self,
        product_id: &str,
        unit: UnitType,
        level: Option<PriceLevel>,
    ) -> CoreResult<()> {
        let idx = self.position(product_id, unit)?;
        match level {
            Some(level) => {
                let item = &mut self.items[idx];
                let price = price_for_level(&item.product, level).ok_or_else(|| {
                    CoreError::PriceLevelUnavailable {
                        product: item.product.product_code.clone(),
                        level: level.to_string(),
                    }
                })?;
                item.applied_price_cents = price.cents();
                item.price_level = level;
                item.pinned = true;
            }
            None => {
                self.items[idx].pinned = false;
                self.reprice(product_id);
            }
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Pieces of `product_id` across all of its lines.
    pub fn total_pieces_for(&self, product_id: &str) -> i64 {
        self.items
            .iter()
            .filter(|i| i.product.id == product_id)
            .map(CartItem::pieces)
            .sum()
    }

    pub fn total(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Lines handed to the sale processor.
    pub fn to_sale_lines(&self) -> Vec<SaleLine> {
        self.items
            .iter()
            .map(|i| SaleLine {
                product_id: i.product.id.clone(),
                quantity: i.quantity,
                unit_type: i.unit_type,
                price_per_unit_cents: i.applied_price_cents,
            })
            .collect()
    }

    fn position(&self, product_id: &str, unit: UnitType) -> CoreResult<usize> {
        self.items
            .iter()
            .position(|i| i.matches(product_id, unit))
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))
    }

    /// Re-applies volume pricing to the unpinned lines of a product using the
    /// product's total pieces in the cart.
    fn reprice(&mut self, product_id: &str) {
        let pieces = self.total_pieces_for(product_id);
        for item in self
            .items
            .iter_mut()
            .filter(|i| i.product.id == product_id && !i.pinned)
        {
            item.applied_price_cents = tier_price(&item.product, pieces).cents();
            item.price_level = tier_level(&item.product, pieces);
        }
    }
}

fn check_available(product: &Product, requested: i64, available: i64) -> CoreResult<()> {
    if requested > available {
        return Err(CoreError::InsufficientStock {
            product: product.product_code.clone(),
            location: String::new(),
            available,
            requested,
        });
    }
    Ok(())
}

/// Cart totals summary for the register display.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub item_count: usize,
    pub total_pieces: i64,
    pub total_cents: i64,
}

impl From<&Cart> for CartTotals {
    fn from(cart: &Cart) -> Self {
        CartTotals {
            item_count: cart.item_count(),
            total_pieces: cart.items.iter().map(CartItem::pieces).sum(),
            total_cents: cart.total().cents(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NewProduct;
    use chrono::Utc;

    fn test_product(id: &str) -> Product {
        NewProduct::new(format!("CJ-{}", id), format!("PZ-{}", id), "Galletas", 10, 500)
            .with_tiers((800, 1), (700, 12), (600, 50))
            .with_special_prices(Some(550), None)
            .with_stock("L1", 100)
            .into_product(id.to_string(), Utc::now())
    }

    #[test]
    fn test_add_item_applies_volume_tier() {
        let mut cart = Cart::new();
        let product = test_product("1");

        cart.add_item(&product, 15, UnitType::Pieces, 100).unwrap();

        assert_eq!(cart.items[0].applied_price_cents, 700);
        assert_eq!(cart.items[0].price_level, PriceLevel::Tier2);
        assert_eq!(cart.total(), Money::from_cents(10_500));
    }

    #[test]
    fn test_add_same_product_merges_and_reprices() {
        let mut cart = Cart::new();
        let product = test_product("1");

        cart.add_item(&product, 5, UnitType::Pieces, 100).unwrap();
        assert_eq!(cart.items[0].applied_price_cents, 800);

        cart.add_item(&product, 7, UnitType::Pieces, 100).unwrap();
        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.items[0].quantity, 12);
        assert_eq!(cart.items[0].applied_price_cents, 700);
    }

    #[test]
    fn test_boxes_and_pieces_are_separate_lines_priced_together() {
        let mut cart = Cart::new();
        let product = test_product("1");

        cart.add_item(&product, 4, UnitType::Boxes, 100).unwrap();
        cart.add_item(&product, 10, UnitType::Pieces, 100).unwrap();

        assert_eq!(cart.item_count(), 2);
        assert_eq!(cart.total_pieces_for("1"), 50);
        assert!(cart.items.iter().all(|i| i.applied_price_cents == 600));
    }

    #[test]
    fn test_add_item_bounded_by_available() {
        let mut cart = Cart::new();
        let product = test_product("1");

        cart.add_item(&product, 8, UnitType::Boxes, 85).unwrap();
        let err = cart.add_item(&product, 1, UnitType::Boxes, 85).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { available: 85, requested: 90, .. }
        ));
        assert_eq!(cart.total_pieces_for("1"), 80);
    }

    #[test]
    fn test_update_quantity_and_remove() {
        let mut cart = Cart::new();
        let product = test_product("1");

        cart.add_item(&product, 60, UnitType::Pieces, 100).unwrap();
        assert_eq!(cart.items[0].applied_price_cents, 600);

        cart.update_quantity("1", UnitType::Pieces, 3, 100).unwrap();
        assert_eq!(cart.items[0].applied_price_cents, 800);

        assert!(cart.update_quantity("1", UnitType::Pieces, 101, 100).is_err());

        cart.update_quantity("1", UnitType::Pieces, 0, 100).unwrap();
        assert!(cart.is_empty());
        assert!(cart.remove_item("1", UnitType::Pieces).is_err());
    }

    #[test]
    fn test_set_price_level() {
        let mut cart = Cart::new();
        let product = test_product("1");
        cart.add_item(&product, 2, UnitType::Pieces, 100).unwrap();

        cart.set_price_level("1", UnitType::Pieces, Some(PriceLevel::Tier4))
            .unwrap();
        assert_eq!(cart.items[0].applied_price_cents, 550);

        // Pinned lines keep their price when quantity changes
        cart.update_quantity("1", UnitType::Pieces, 20, 100).unwrap();
        assert_eq!(cart.items[0].applied_price_cents, 550);

        let err = cart
            .set_price_level("1", UnitType::Pieces, Some(PriceLevel::Tier5))
            .unwrap_err();
        assert!(matches!(err, CoreError::PriceLevelUnavailable { .. }));

        cart.set_price_level("1", UnitType::Pieces, None).unwrap();
        assert_eq!(cart.items[0].applied_price_cents, 700);
    }

    #[test]
    fn test_to_sale_lines_and_totals() {
        let mut cart = Cart::new();
        cart.add_item(&test_product("1"), 15, UnitType::Pieces, 100)
            .unwrap();
        cart.add_item(&test_product("2"), 1, UnitType::Boxes, 100)
            .unwrap();

        let lines = cart.to_sale_lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].unit_type, UnitType::Boxes);
        assert_eq!(lines[1].price_per_unit_cents, 800);

        let totals = CartTotals::from(&cart);
        assert_eq!(totals.total_pieces, 25);
        assert_eq!(totals.total_cents, 10_500 + 8_000);

        cart.clear();
        assert!(cart.is_empty());
    }
}
