//! # Price Ladder
//!
//! Volume pricing: every product carries three tiers, each a per-piece price
//! with the minimum pieces needed to unlock it. Two further prices (4 and 5)
//! are special prices a cashier picks explicitly.
//!
//! ```text
//! pieces ordered:   1 ─────── 11 │ 12 ─────── 49 │ 50 ──────►
//! tier applied:       price1      │    price2     │  price3
//!                    (min 1)      │   (min 12)    │ (min 50)
//! ```
//!
//! The highest threshold that the ordered quantity meets wins. Quantities
//! below `price1_min_qty` still pay price1.

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::Money;
use crate::types::Product;

/// One rung of the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceTier {
    pub min_qty: i64,
    pub price: Money,
}

/// A price a cart line can be pinned to.
///
/// Replaces the free-text command tokens a cashier used to type into the
/// search box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PriceLevel {
    Tier1,
    Tier2,
    Tier3,
    Tier4,
    Tier5,
}

impl fmt::Display for PriceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = match self {
            PriceLevel::Tier1 => 1,
            PriceLevel::Tier2 => 2,
            PriceLevel::Tier3 => 3,
            PriceLevel::Tier4 => 4,
            PriceLevel::Tier5 => 5,
        };
        write!(f, "price{}", n)
    }
}

/// Picks the tier for `pieces` from a ladder ordered tier1, tier2, tier3.
///
/// ```rust
/// use bodega_core::money::Money;
/// use bodega_core::pricing::{select_tier, PriceTier};
///
/// let ladder = [
///     PriceTier { min_qty: 1, price: Money::from_units(8) },
///     PriceTier { min_qty: 12, price: Money::from_units(7) },
///     PriceTier { min_qty: 50, price: Money::from_units(6) },
/// ];
/// assert_eq!(select_tier(&ladder, 5), 0);
/// assert_eq!(select_tier(&ladder, 12), 1);
/// assert_eq!(select_tier(&ladder, 50), 2);
/// ```
pub fn select_tier(ladder: &[PriceTier; 3], pieces: i64) -> usize {
    (1..ladder.len())
        .rev()
        .find(|&i| pieces >= ladder[i].min_qty)
        .unwrap_or(0)
}

/// The three volume tiers of a product.
pub fn ladder(product: &Product) -> [PriceTier; 3] {
    [
        PriceTier {
            min_qty: product.price1_min_qty,
            price: Money::from_cents(product.price1_cents),
        },
        PriceTier {
            min_qty: product.price2_min_qty,
            price: Money::from_cents(product.price2_cents),
        },
        PriceTier {
            min_qty: product.price3_min_qty,
            price: Money::from_cents(product.price3_cents),
        },
    ]
}

/// Per-piece price for an order of `pieces` of `product`.
pub fn tier_price(product: &Product, pieces: i64) -> Money {
    let ladder = ladder(product);
    ladder[select_tier(&ladder, pieces)].price
}

/// Level that volume pricing selects for `pieces`.
pub fn tier_level(product: &Product, pieces: i64) -> PriceLevel {
    match select_tier(&ladder(product), pieces) {
        0 => PriceLevel::Tier1,
        1 => PriceLevel::Tier2,
        _ => PriceLevel::Tier3,
    }
}

/// Per-piece price of an explicit level, `None` when price4/5 is not set.
pub fn price_for_level(product: &Product, level: PriceLevel) -> Option<Money> {
    match level {
        PriceLevel::Tier1 => Some(Money::from_cents(product.price1_cents)),
        PriceLevel::Tier2 => Some(Money::from_cents(product.price2_cents)),
        PriceLevel::Tier3 => Some(Money::from_cents(product.price3_cents)),
        PriceLevel::Tier4 => product.price4_cents.map(Money::from_cents),
        PriceLevel::Tier5 => product.price5_cents.map(Money::from_cents),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder_of(t1: i64, t2: i64, t3: i64) -> [PriceTier; 3] {
        [
            PriceTier { min_qty: t1, price: Money::from_units(8) },
            PriceTier { min_qty: t2, price: Money::from_units(7) },
            PriceTier { min_qty: t3, price: Money::from_units(6) },
        ]
    }

    #[test]
    fn test_tier_examples() {
        let ladder = ladder_of(1, 12, 50);
        assert_eq!(ladder[select_tier(&ladder, 12)].price, Money::from_units(7));
        assert_eq!(ladder[select_tier(&ladder, 50)].price, Money::from_units(6));
        assert_eq!(ladder[select_tier(&ladder, 5)].price, Money::from_units(8));
    }

    #[test]
    fn test_tier_rule_over_quantity_range() {
        for (t1, t2, t3) in [(1, 12, 50), (1, 1, 1), (6, 6, 24), (1, 10, 10)] {
            let ladder = ladder_of(t1, t2, t3);
            for q in 0..80 {
                let expected = if q >= t3 {
                    2
                } else if q >= t2 {
                    1
                } else {
                    0
                };
                assert_eq!(select_tier(&ladder, q), expected, "q={} t=({},{},{})", q, t1, t2, t3);
            }
        }
    }

    #[test]
    fn test_below_first_threshold_pays_price1() {
        let ladder = ladder_of(6, 12, 50);
        assert_eq!(select_tier(&ladder, 2), 0);
    }

    #[test]
    fn test_price_level_display() {
        assert_eq!(PriceLevel::Tier4.to_string(), "price4");
    }
}
