//! Pareto (80/20) revenue concentration across catalogue items.
//!
//! Items are ranked by conversion value descending with ties broken by
//! `item_id` ascending, so results are reproducible. The covering set stops at
//! the first item where cumulative revenue reaches 80% of the global total
//! (inclusive). Tier counts take `floor(items * threshold / 100)` items.
//! Cumulative sums saturate at `Decimal::MAX` like the running totals do.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    aggregate::{SkuRevenue, SkuRevenueTable},
    ratio::{decimal_to_f64, percentage, safe_ratio_decimal},
};

pub const COVERAGE_TARGET: Decimal = Decimal::from_parts(8, 0, 0, false, 1);
pub const TIER_THRESHOLDS: [u32; 4] = [5, 10, 20, 50];
/// Top-ranked items kept on the cumulative revenue curve.
pub const CURVE_POINT_LIMIT: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParetoTier {
    pub threshold: u32,
    pub sku_count: usize,
    pub revenue_percentage: f64,
    pub absolute_revenue: f64,
    pub tier_roas: f64,
}

/// One item on the ranked cumulative revenue curve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParetoPoint {
    pub rank: usize,
    pub item_id: String,
    pub revenue: f64,
    pub cumulative_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParetoResult {
    pub total_items: usize,
    pub covering_set_size: usize,
    pub covering_set_percentage: f64,
    /// False when item-attributed revenue never reaches the target, e.g. when
    /// some revenue sits on rows without an `item_id`.
    pub target_reached: bool,
    pub tiers: Vec<ParetoTier>,
    /// The top [`CURVE_POINT_LIMIT`] items in rank order.
    pub curve: Vec<ParetoPoint>,
}

/// Items ordered by revenue descending, `item_id` ascending on ties.
pub fn rank_items(table: &SkuRevenueTable) -> Vec<(&str, SkuRevenue)> {
    let mut ranked = table
        .iter()
        .map(|(id, revenue)| (id.as_str(), *revenue))
        .collect::<Vec<_>>();
    ranked.sort_by(|a, b| {
        b.1.conversion_value
            .cmp(&a.1.conversion_value)
            .then_with(|| a.0.cmp(b.0))
    });
    ranked
}

/// Number of top items whose cumulative revenue first reaches the target.
fn covering_set(ranked: &[(&str, SkuRevenue)], total: Decimal) -> (usize, bool) {
    if total <= Decimal::ZERO {
        return (0, false);
    }
    let target = total * COVERAGE_TARGET;
    let mut cumulative = Decimal::ZERO;
    for (idx, (_, revenue)) in ranked.iter().enumerate() {
        cumulative = cumulative.saturating_add(revenue.conversion_value);
        if cumulative >= target {
            return (idx + 1, true);
        }
    }
    (ranked.len(), false)
}

fn tier(ranked: &[(&str, SkuRevenue)], threshold: u32, total: Decimal) -> ParetoTier {
    let count = ranked.len() * threshold as usize / 100;
    let (revenue, cost) = ranked[..count]
        .iter()
        .fold((Decimal::ZERO, Decimal::ZERO), |(value, cost), (_, item)| {
            (
                value.saturating_add(item.conversion_value),
                cost.saturating_add(item.cost),
            )
        });
    ParetoTier {
        threshold,
        sku_count: count,
        revenue_percentage: percentage(decimal_to_f64(revenue), decimal_to_f64(total)),
        absolute_revenue: decimal_to_f64(revenue),
        tier_roas: safe_ratio_decimal(revenue, cost, 0.0),
    }
}

fn curve(ranked: &[(&str, SkuRevenue)], total: Decimal) -> Vec<ParetoPoint> {
    let whole = decimal_to_f64(total);
    let mut cumulative = Decimal::ZERO;
    ranked
        .iter()
        .take(CURVE_POINT_LIMIT)
        .enumerate()
        .map(|(idx, (item_id, item))| {
            cumulative = cumulative.saturating_add(item.conversion_value);
            ParetoPoint {
                rank: idx + 1,
                item_id: item_id.to_string(),
                revenue: decimal_to_f64(item.conversion_value),
                cumulative_percentage: percentage(decimal_to_f64(cumulative), whole),
            }
        })
        .collect()
}

pub fn analyze(table: &SkuRevenueTable, total_conversion_value: Decimal) -> ParetoResult {
    let ranked = rank_items(table);
    let (covering_set_size, target_reached) = covering_set(&ranked, total_conversion_value);
    let total = if total_conversion_value > Decimal::ZERO {
        total_conversion_value
    } else {
        Decimal::ZERO
    };
    ParetoResult {
        total_items: ranked.len(),
        covering_set_size,
        covering_set_percentage: percentage(covering_set_size as f64, ranked.len() as f64),
        target_reached,
        tiers: TIER_THRESHOLDS
            .iter()
            .map(|threshold| tier(&ranked, *threshold, total))
            .collect(),
        curve: curve(&ranked, total),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(items: &[(&str, i64, i64)]) -> SkuRevenueTable {
        let mut table = SkuRevenueTable::default();
        for (id, value, cost) in items {
            table.add(id, Decimal::from(*value), Decimal::from(*cost));
        }
        table
    }

    #[test]
    fn single_dominant_item_covers_eighty_percent() {
        let table = table(&[("A", 500, 100), ("B", 50, 50)]);
        let result = analyze(&table, Decimal::from(550));
        assert_eq!(result.covering_set_size, 1);
        assert_eq!(result.covering_set_percentage, 50.0);
        assert!(result.target_reached);
    }

    #[test]
    fn boundary_is_inclusive() {
        let table = table(&[("A", 40, 1), ("B", 40, 1), ("C", 20, 1)]);
        let result = analyze(&table, Decimal::from(100));
        assert_eq!(result.covering_set_size, 2);
    }

    #[test]
    fn ties_rank_by_item_id() {
        let table = table(&[("b", 10, 1), ("a", 10, 1), ("c", 30, 1)]);
        let ranked = rank_items(&table)
            .into_iter()
            .map(|(id, _)| id)
            .collect::<Vec<_>>();
        assert_eq!(ranked, vec!["c", "a", "b"]);
    }

    #[test]
    fn non_positive_total_is_guarded() {
        let table = table(&[("A", 0, 10)]);
        let result = analyze(&table, Decimal::ZERO);
        assert_eq!(result.covering_set_size, 0);
        assert_eq!(result.covering_set_percentage, 0.0);
        assert!(result.tiers.iter().all(|t| t.revenue_percentage == 0.0));
    }

    #[test]
    fn tiers_floor_item_counts() {
        let items = (0..30)
            .map(|i| (format!("sku-{i:02}"), 100 - i as i64, 10))
            .collect::<Vec<_>>();
        let mut table = SkuRevenueTable::default();
        for (id, value, cost) in &items {
            table.add(id, Decimal::from(*value), Decimal::from(*cost));
        }
        let total = items.iter().map(|(_, v, _)| Decimal::from(*v)).sum();
        let result = analyze(&table, total);
        let counts = result.tiers.iter().map(|t| t.sku_count).collect::<Vec<_>>();
        assert_eq!(counts, vec![1, 3, 6, 15]);
        assert_eq!(result.tiers[0].absolute_revenue, 100.0);
        assert_eq!(result.tiers[0].tier_roas, 10.0);
        for pair in result.tiers.windows(2) {
            assert!(pair[0].revenue_percentage <= pair[1].revenue_percentage);
        }
    }

    #[test]
    fn curve_follows_rank_order_with_cumulative_share() {
        let table = table(&[("b", 25, 1), ("a", 25, 1), ("c", 50, 1)]);
        let result = analyze(&table, Decimal::from(100));
        let ids = result
            .curve
            .iter()
            .map(|point| point.item_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(result.curve[0].rank, 1);
        assert_eq!(result.curve[0].revenue, 50.0);
        assert_eq!(result.curve[0].cumulative_percentage, 50.0);
        assert_eq!(result.curve[1].cumulative_percentage, 75.0);
        assert_eq!(result.curve[2].cumulative_percentage, 100.0);
    }

    #[test]
    fn curve_is_capped() {
        let mut table = SkuRevenueTable::default();
        for i in 0..CURVE_POINT_LIMIT + 5 {
            table.add(&format!("sku-{i:05}"), Decimal::ONE, Decimal::ONE);
        }
        let total = Decimal::from(CURVE_POINT_LIMIT + 5);
        let result = analyze(&table, total);
        assert_eq!(result.total_items, CURVE_POINT_LIMIT + 5);
        assert_eq!(result.curve.len(), CURVE_POINT_LIMIT);
        assert_eq!(result.curve.last().map(|p| p.rank), Some(CURVE_POINT_LIMIT));
    }

    #[test]
    fn near_maximum_revenue_saturates_instead_of_overflowing() {
        let huge = Decimal::from_str_exact("50000000000000000000000000000").unwrap();
        let mut table = SkuRevenueTable::default();
        let mut total = Decimal::ZERO;
        for id in ["A", "B", "C", "D"] {
            table.add(id, huge, huge);
            total = total.saturating_add(huge);
        }
        assert_eq!(total, Decimal::MAX);
        let result = analyze(&table, total);
        assert_eq!(result.total_items, 4);
        assert!(result.target_reached);
        assert_eq!(result.covering_set_size, 2);
        assert_eq!(result.tiers[3].sku_count, 2);
        assert!(result.curve.iter().all(|p| p.cumulative_percentage.is_finite()));
    }

    #[test]
    fn unattributed_revenue_may_leave_target_unreached() {
        let table = table(&[("A", 10, 1)]);
        let result = analyze(&table, Decimal::from(100));
        assert_eq!(result.covering_set_size, 1);
        assert!(!result.target_reached);
    }
}
