//! # Stock Pooling and Planning
//!
//! Pure rules for reading and moving per-location stock. The database layer
//! executes the plans produced here with conditional updates; nothing in this
//! module writes anywhere.
//!
//! ## Pooling Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Product stock:   L1=10   L2=40   BODEGA-A=5   BODEGA-B=20              │
//! │                                                                         │
//! │  Exact("L1")                  → 10                                      │
//! │  Pooled(home "L1", "BODEGA")  → 10 + 5 + 20 = 35                        │
//! │                                                                         │
//! │  A sale of 18 at L1 draws in pool order:                                │
//! │     L1 (home first)      10                                             │
//! │     BODEGA-A (code order) 5                                             │
//! │     BODEGA-B              3                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Availability and sale deduction use the same pool, so a cashier can never
//! sell what the screen showed and then fail at commit for the same reason.
//!
//! ## Zero Entries
//! Sale draws keep zero-quantity entries (the home location stays listed for
//! the register); transfers prune them. Both call sites pass the policy
//! explicitly via [`ZeroStockPolicy`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{Product, StockLocation, TransferLine};

// =============================================================================
// Pool Policy
// =============================================================================

/// Which locations pool with a home location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolPolicy {
    /// Locations starting with this prefix are shared bulk storage.
    /// `None` disables pooling.
    pub bulk_prefix: Option<String>,
}

impl PoolPolicy {
    /// No pooling: every read and draw is exact.
    pub fn exact() -> Self {
        PoolPolicy { bulk_prefix: None }
    }

    /// Pools `home` with every location starting with `prefix`.
    pub fn with_bulk_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        PoolPolicy {
            bulk_prefix: if prefix.is_empty() { None } else { Some(prefix) },
        }
    }

    /// Whether `location` is a bulk storage location.
    pub fn is_bulk(&self, location: &str) -> bool {
        self.bulk_prefix
            .as_deref()
            .is_some_and(|prefix| location.starts_with(prefix))
    }

    /// Whether `location` belongs to the pool of `home`.
    pub fn includes(&self, home: &str, location: &str) -> bool {
        location == home || self.is_bulk(location)
    }

    /// Entries of the pool of `home`, home first, then bulk in code order.
    pub fn ordered<'a>(&self, home: &str, entries: &'a [StockLocation]) -> Vec<&'a StockLocation> {
        let mut pool: Vec<&StockLocation> = entries
            .iter()
            .filter(|s| self.includes(home, &s.location))
            .collect();
        pool.sort_by(|a, b| {
            let a_home = a.location != home;
            let b_home = b.location != home;
            a_home.cmp(&b_home).then_with(|| a.location.cmp(&b.location))
        });
        pool
    }
}

/// Location predicate for stock reads.
#[derive(Debug, Clone, Copy)]
pub enum LocationFilter<'a> {
    /// Only this location.
    Exact(&'a str),
    /// The home location plus its bulk pool.
    Pooled {
        home: &'a str,
        policy: &'a PoolPolicy,
    },
}

impl LocationFilter<'_> {
    pub fn matches(&self, location: &str) -> bool {
        match self {
            LocationFilter::Exact(target) => location == *target,
            LocationFilter::Pooled { home, policy } => policy.includes(home, location),
        }
    }
}

/// What happens to an entry whose quantity reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroStockPolicy {
    Retain,
    Prune,
}

// =============================================================================
// Reads
// =============================================================================

/// Sum of quantities of entries matching `filter`.
///
/// ```rust
/// use bodega_core::stock::{total_stock, LocationFilter, PoolPolicy};
/// use bodega_core::StockLocation;
///
/// let entries = vec![
///     StockLocation::new("L1", 10),
///     StockLocation::new("L2", 40),
///     StockLocation::new("BODEGA-A", 5),
/// ];
/// let policy = PoolPolicy::with_bulk_prefix("BODEGA");
/// assert_eq!(total_stock(&entries, LocationFilter::Exact("L1")), 10);
/// assert_eq!(
///     total_stock(&entries, LocationFilter::Pooled { home: "L1", policy: &policy }),
///     15
/// );
/// ```
pub fn total_stock(entries: &[StockLocation], filter: LocationFilter<'_>) -> i64 {
    entries
        .iter()
        .filter(|s| filter.matches(&s.location))
        .map(|s| s.quantity)
        .sum()
}

/// Pieces still addable to a cart: total minus what the cart already holds,
/// never below zero.
pub fn remaining_quantity(
    entries: &[StockLocation],
    filter: LocationFilter<'_>,
    reserved_in_cart: i64,
) -> i64 {
    (total_stock(entries, filter) - reserved_in_cart).max(0)
}

// =============================================================================
// Sale Deductions
// =============================================================================

/// Pieces taken from one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draw {
    pub location: String,
    pub quantity: i64,
}

/// Pieces taken from one location of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraw {
    pub product_id: String,
    pub location: String,
    pub quantity: i64,
}

/// Plans which locations cover a sale of `pieces` at `home`.
///
/// Fails with `InsufficientStock` (reporting the pooled availability) when
/// the pool cannot cover the request.
pub fn plan_sale_draws(
    product_label: &str,
    entries: &[StockLocation],
    home: &str,
    policy: &PoolPolicy,
    pieces: i64,
) -> CoreResult<Vec<Draw>> {
    let pool = policy.ordered(home, entries);
    let available: i64 = pool.iter().map(|s| s.quantity).sum();

    if available < pieces {
        return Err(CoreError::InsufficientStock {
            product: product_label.to_string(),
            location: home.to_string(),
            available,
            requested: pieces,
        });
    }

    let mut remaining = pieces;
    let mut draws = Vec::new();
    for entry in pool {
        if remaining == 0 {
            break;
        }
        let take = entry.quantity.min(remaining);
        if take > 0 {
            draws.push(Draw {
                location: entry.location.clone(),
                quantity: take,
            });
            remaining -= take;
        }
    }

    Ok(draws)
}

/// Applies draws to an in-memory stock list.
///
/// Fails without touching `entries` if any draw exceeds its location.
pub fn apply_draws(
    product_label: &str,
    entries: &mut Vec<StockLocation>,
    draws: &[Draw],
    zero_policy: ZeroStockPolicy,
) -> CoreResult<()> {
    let mut next = entries.clone();
    for draw in draws {
        let entry = next
            .iter_mut()
            .find(|s| s.location == draw.location)
            .filter(|s| s.quantity >= draw.quantity);
        match entry {
            Some(entry) => entry.quantity -= draw.quantity,
            None => {
                return Err(CoreError::InsufficientStock {
                    product: product_label.to_string(),
                    location: draw.location.clone(),
                    available: stock_of(&next, &draw.location),
                    requested: draw.quantity,
                })
            }
        }
    }
    if zero_policy == ZeroStockPolicy::Prune {
        next.retain(|s| s.quantity != 0);
    }
    *entries = next;
    Ok(())
}

/// Plans the draws for every line of a ticket.
///
/// Lines are `(product_id, pieces)`; several lines may hit the same product
/// (e.g. one line in boxes and one in pieces), so planning runs against a
/// running copy of each product's stock.
pub fn plan_ticket_draws(
    lines: &[(String, i64)],
    products: &HashMap<String, Product>,
    home: &str,
    policy: &PoolPolicy,
) -> CoreResult<Vec<ProductDraw>> {
    let mut working: HashMap<&str, Vec<StockLocation>> = HashMap::new();
    let mut plan = Vec::new();

    for (product_id, pieces) in lines {
        let product = products
            .get(product_id)
            .ok_or_else(|| CoreError::ProductNotFound(product_id.clone()))?;
        let entries = working
            .entry(product.id.as_str())
            .or_insert_with(|| product.stock_locations.clone());

        let draws = plan_sale_draws(&product.product_code, entries, home, policy, *pieces)?;
        apply_draws(&product.product_code, entries, &draws, ZeroStockPolicy::Retain)?;

        plan.extend(draws.into_iter().map(|d| ProductDraw {
            product_id: product.id.clone(),
            location: d.location,
            quantity: d.quantity,
        }));
    }

    Ok(plan)
}

// =============================================================================
// Transfers
// =============================================================================

/// Moves `quantity` pieces from `from` to `to` in an in-memory stock list.
///
/// Decrements the source, increments or creates the destination, then
/// prunes zero entries. On failure `entries` is untouched.
///
/// ```rust
/// use bodega_core::stock::apply_transfer;
/// use bodega_core::StockLocation;
///
/// let mut entries = vec![StockLocation::new("BODEGA-A", 30)];
/// apply_transfer("CJ-1", &mut entries, "BODEGA-A", "L1", 30).unwrap();
/// assert_eq!(entries, vec![StockLocation::new("L1", 30)]);
/// ```
pub fn apply_transfer(
    product_label: &str,
    entries: &mut Vec<StockLocation>,
    from: &str,
    to: &str,
    quantity: i64,
) -> CoreResult<()> {
    let available = stock_of(entries, from);
    if available < quantity {
        return Err(CoreError::InsufficientStock {
            product: product_label.to_string(),
            location: from.to_string(),
            available,
            requested: quantity,
        });
    }

    let mut next = entries.clone();
    if let Some(source) = next.iter_mut().find(|s| s.location == from) {
        source.quantity -= quantity;
    }
    match next.iter_mut().find(|s| s.location == to) {
        Some(dest) => dest.quantity += quantity,
        None => next.push(StockLocation::new(to, quantity)),
    }
    next.retain(|s| s.quantity != 0);

    *entries = next;
    Ok(())
}

/// Pre-validates a whole transfer batch before anything is written.
///
/// Lines are replayed in order against copies of each product's stock, so a
/// batch that drains one source twice, or moves goods A→B then B→C, is judged
/// exactly as the database would apply it.
pub fn check_transfer_batch(
    lines: &[TransferLine],
    products: &HashMap<String, Product>,
) -> CoreResult<HashMap<String, Vec<StockLocation>>> {
    let mut working: HashMap<String, Vec<StockLocation>> = HashMap::new();

    for line in lines {
        let product = products
            .get(&line.product_id)
            .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;
        let entries = working
            .entry(product.id.clone())
            .or_insert_with(|| product.stock_locations.clone());
        apply_transfer(
            &product.product_code,
            entries,
            &line.from_location,
            &line.to_location,
            line.quantity,
        )?;
    }

    Ok(working)
}

fn stock_of(entries: &[StockLocation], location: &str) -> i64 {
    entries
        .iter()
        .filter(|s| s.location == location)
        .map(|s| s.quantity)
        .sum()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entries() -> Vec<StockLocation> {
        vec![
            StockLocation::new("L1", 10),
            StockLocation::new("L2", 40),
            StockLocation::new("BODEGA-B", 20),
            StockLocation::new("BODEGA-A", 5),
        ]
    }

    fn product(id: &str, stock: Vec<StockLocation>) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            box_code: format!("CJ-{}", id),
            product_code: format!("PZ-{}", id),
            name: format!("Producto {}", id),
            pieces_per_box: 10,
            cost_cents: 500,
            price1_cents: 800,
            price1_min_qty: 1,
            price2_cents: 700,
            price2_min_qty: 12,
            price3_cents: 600,
            price3_min_qty: 50,
            price4_cents: None,
            price5_cents: None,
            category: "General".to_string(),
            is_available: true,
            image_url: None,
            stock_locations: stock,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    #[test]
    fn test_total_stock_filters() {
        let policy = PoolPolicy::with_bulk_prefix("BODEGA");
        let e = entries();
        assert_eq!(total_stock(&e, LocationFilter::Exact("L1")), 10);
        assert_eq!(total_stock(&e, LocationFilter::Exact("L9")), 0);
        assert_eq!(
            total_stock(&e, LocationFilter::Pooled { home: "L1", policy: &policy }),
            35
        );
        let exact = PoolPolicy::exact();
        assert_eq!(
            total_stock(&e, LocationFilter::Pooled { home: "L1", policy: &exact }),
            10
        );
    }

    #[test]
    fn test_reads_are_repeatable() {
        let policy = PoolPolicy::with_bulk_prefix("BODEGA");
        let e = entries();
        let filter = LocationFilter::Pooled { home: "L2", policy: &policy };
        let first = (total_stock(&e, filter), remaining_quantity(&e, filter, 7));
        let second = (total_stock(&e, filter), remaining_quantity(&e, filter, 7));
        assert_eq!(first, second);
        assert_eq!(first, (65, 58));
    }

    #[test]
    fn test_remaining_never_negative() {
        let e = entries();
        assert_eq!(remaining_quantity(&e, LocationFilter::Exact("L1"), 25), 0);
    }

    #[test]
    fn test_pool_order_home_first_then_code_order() {
        let policy = PoolPolicy::with_bulk_prefix("BODEGA");
        let e = entries();
        let order: Vec<&str> = policy
            .ordered("L1", &e)
            .iter()
            .map(|s| s.location.as_str())
            .collect();
        assert_eq!(order, vec!["L1", "BODEGA-A", "BODEGA-B"]);
    }

    #[test]
    fn test_plan_sale_draws_spills_into_bulk() {
        let policy = PoolPolicy::with_bulk_prefix("BODEGA");
        let draws = plan_sale_draws("PZ-1", &entries(), "L1", &policy, 18).unwrap();
        assert_eq!(
            draws,
            vec![
                Draw { location: "L1".to_string(), quantity: 10 },
                Draw { location: "BODEGA-A".to_string(), quantity: 5 },
                Draw { location: "BODEGA-B".to_string(), quantity: 3 },
            ]
        );
    }

    #[test]
    fn test_plan_sale_draws_insufficient_reports_pool() {
        let policy = PoolPolicy::with_bulk_prefix("BODEGA");
        let err = plan_sale_draws("PZ-1", &entries(), "L1", &policy, 36).unwrap_err();
        assert_eq!(
            err,
            CoreError::InsufficientStock {
                product: "PZ-1".to_string(),
                location: "L1".to_string(),
                available: 35,
                requested: 36,
            }
        );
    }

    #[test]
    fn test_sale_draws_retain_zero_entries() {
        let policy = PoolPolicy::exact();
        let mut e = entries();
        let draws = plan_sale_draws("PZ-1", &e, "L1", &policy, 10).unwrap();
        apply_draws("PZ-1", &mut e, &draws, ZeroStockPolicy::Retain).unwrap();
        assert_eq!(e[0], StockLocation::new("L1", 0));
    }

    #[test]
    fn test_plan_ticket_draws_accumulates_same_product() {
        let policy = PoolPolicy::exact();
        let mut products = HashMap::new();
        products.insert("p1".to_string(), product("p1", vec![StockLocation::new("L1", 25)]));

        let lines = vec![("p1".to_string(), 20), ("p1".to_string(), 5)];
        let plan = plan_ticket_draws(&lines, &products, "L1", &policy).unwrap();
        assert_eq!(plan.iter().map(|d| d.quantity).sum::<i64>(), 25);

        let lines = vec![("p1".to_string(), 20), ("p1".to_string(), 6)];
        let err = plan_ticket_draws(&lines, &products, "L1", &policy).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientStock { available: 5, requested: 6, .. }));
    }

    #[test]
    fn test_plan_ticket_draws_unknown_product() {
        let products = HashMap::new();
        let lines = vec![("ghost".to_string(), 1)];
        let err = plan_ticket_draws(&lines, &products, "L1", &PoolPolicy::exact()).unwrap_err();
        assert_eq!(err, CoreError::ProductNotFound("ghost".to_string()));
    }

    #[test]
    fn test_transfer_conserves_stock() {
        for k in [1, 7, 10] {
            let mut e = entries();
            let before_total: i64 = e.iter().map(|s| s.quantity).sum();
            let before_l1 = stock_of(&e, "L1");
            let before_l2 = stock_of(&e, "L2");

            apply_transfer("PZ-1", &mut e, "L1", "L2", k).unwrap();

            let after_total: i64 = e.iter().map(|s| s.quantity).sum();
            assert_eq!(before_total, after_total);
            assert_eq!(stock_of(&e, "L1"), before_l1 - k);
            assert_eq!(stock_of(&e, "L2"), before_l2 + k);
        }
    }

    #[test]
    fn test_transfer_creates_destination_and_prunes_source() {
        let mut e = vec![StockLocation::new("L1", 10)];
        apply_transfer("PZ-1", &mut e, "L1", "L3", 10).unwrap();
        assert_eq!(e, vec![StockLocation::new("L3", 10)]);
    }

    #[test]
    fn test_transfer_rejection_leaves_stock_unchanged() {
        let mut e = entries();
        let before = e.clone();
        let err = apply_transfer("PZ-1", &mut e, "L1", "L2", 11).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientStock { available: 10, requested: 11, .. }));
        assert_eq!(e, before);
    }

    #[test]
    fn test_check_transfer_batch_counts_cumulative_demand() {
        let mut products = HashMap::new();
        products.insert("p1".to_string(), product("p1", vec![StockLocation::new("A", 10)]));

        let line = |from: &str, to: &str, qty: i64| TransferLine {
            product_id: "p1".to_string(),
            product_name: "Producto p1".to_string(),
            box_code: "CJ-p1".to_string(),
            product_code: "PZ-p1".to_string(),
            from_location: from.to_string(),
            to_location: to.to_string(),
            quantity: qty,
        };

        // Two lines drain A by 12 in total
        let err = check_transfer_batch(&[line("A", "B", 6), line("A", "C", 6)], &products);
        assert!(err.is_err());

        // Chained moves are replayed in order
        let result = check_transfer_batch(&[line("A", "B", 10), line("B", "C", 4)], &products)
            .unwrap();
        assert_eq!(
            result["p1"],
            vec![StockLocation::new("B", 6), StockLocation::new("C", 4)]
        );
    }
}
