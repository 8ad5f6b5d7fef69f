//! Final report composition.

use serde::Serialize;

use crate::{
    aggregate::RunningTotals,
    funnel::{Band, FunnelResult, RatioBreakdown},
    pareto::ParetoResult,
    ratio::{decimal_to_f64, safe_ratio_decimal},
};

/// Immutable analytics for one ingested file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightsReport {
    pub row_count: u64,
    pub skipped_rows: u64,
    pub warning_count: usize,
    pub total_impressions: u64,
    pub total_clicks: u64,
    pub total_conversions: f64,
    pub total_conversion_value: f64,
    pub total_cost: f64,
    pub roas: f64,
    /// Mean of defined CTR values, as a fraction.
    pub average_ctr: f64,
    /// Mean of defined search impression share values, as a fraction.
    pub average_search_impression_share: f64,
    pub search_impression_share_samples: u64,
    pub pareto: Option<ParetoResult>,
    pub funnel: FunnelResult,
}

impl InsightsReport {
    pub fn assemble(
        totals: &RunningTotals,
        warning_count: usize,
        pareto: Option<ParetoResult>,
        funnel: FunnelResult,
    ) -> Self {
        Self {
            row_count: totals.rows,
            skipped_rows: totals.skipped_rows,
            warning_count,
            total_impressions: totals.impressions,
            total_clicks: totals.clicks,
            total_conversions: decimal_to_f64(totals.conversions),
            total_conversion_value: decimal_to_f64(totals.conversion_value),
            total_cost: decimal_to_f64(totals.cost),
            roas: safe_ratio_decimal(totals.conversion_value, totals.cost, 0.0),
            average_ctr: safe_ratio_decimal(totals.ctr_sum, totals.ctr_count.into(), 0.0),
            average_search_impression_share: safe_ratio_decimal(
                totals.search_impression_share_sum,
                totals.search_impression_share_count.into(),
                0.0,
            ),
            search_impression_share_samples: totals.search_impression_share_count,
            pareto,
            funnel,
        }
    }

    /// Flat `(metric, value)` view for tables and simple exports.
    pub fn key_values(&self) -> Vec<(String, String)> {
        let mut rows = vec![
            kv("rows", self.row_count),
            kv("skipped_rows", self.skipped_rows),
            kv("warnings", self.warning_count),
            kv("total_impressions", self.total_impressions),
            kv("total_clicks", self.total_clicks),
            kv("total_conversions", format_number(self.total_conversions)),
            kv(
                "total_conversion_value",
                format!("{:.2}", self.total_conversion_value),
            ),
            kv("total_cost", format!("{:.2}", self.total_cost)),
            kv("roas", format!("{:.2}", self.roas)),
            kv("average_ctr", format!("{:.2}%", self.average_ctr * 100.0)),
            kv(
                "average_search_impression_share",
                format!("{:.2}%", self.average_search_impression_share * 100.0),
            ),
        ];
        if let Some(pareto) = &self.pareto {
            rows.push(kv("items", pareto.total_items));
            rows.push(kv(
                "pareto_80_items",
                format!(
                    "{} ({:.2}% of items){}",
                    pareto.covering_set_size,
                    pareto.covering_set_percentage,
                    if pareto.target_reached {
                        ""
                    } else {
                        ", target not reached"
                    }
                ),
            ));
            for tier in &pareto.tiers {
                rows.push(kv(
                    &format!("top_{}pct_items", tier.threshold),
                    format!(
                        "{} items, {:.2}% of revenue ({:.2}), roas {:.2}",
                        tier.sku_count,
                        tier.revenue_percentage,
                        tier.absolute_revenue,
                        tier.tier_roas
                    ),
                ));
            }
        }
        push_funnel(
            &mut rows,
            "impressions_per_click",
            &self.funnel.impressions_per_click,
        );
        push_funnel(
            &mut rows,
            "clicks_per_conversion",
            &self.funnel.clicks_per_conversion,
        );
        rows
    }
}

fn push_funnel(rows: &mut Vec<(String, String)>, name: &str, breakdown: &RatioBreakdown) {
    rows.push(kv(
        &format!("{name}_mean"),
        format!("{:.2} (std {:.2})", breakdown.mean, breakdown.std_dev),
    ));
    for (label, band) in [
        ("high", Band::High),
        ("moderate", Band::Moderate),
        ("low", Band::Low),
    ] {
        let stat = breakdown.band(band);
        rows.push(kv(
            &format!("{name}_{label}"),
            format!("{} ({:.2}%)", stat.count, stat.percentage),
        ));
    }
}

fn kv(key: &str, value: impl ToString) -> (String, String) {
    (key.to_string(), value.to_string())
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.4}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::{self, FunnelAccumulator};
    use rust_decimal::Decimal;

    fn totals(value: i64, cost: i64) -> RunningTotals {
        RunningTotals {
            rows: 2,
            conversion_value: Decimal::from(value),
            cost: Decimal::from(cost),
            ..RunningTotals::default()
        }
    }

    #[test]
    fn roas_is_guarded_on_either_side() {
        let empty_funnel = funnel::analyze(&FunnelAccumulator::default());
        let zero_value = InsightsReport::assemble(&totals(0, 50), 0, None, empty_funnel.clone());
        assert_eq!(zero_value.roas, 0.0);
        let zero_cost = InsightsReport::assemble(&totals(50, 0), 0, None, empty_funnel);
        assert_eq!(zero_cost.roas, 0.0);
        assert!(zero_cost.average_ctr.is_finite());
        assert_eq!(zero_cost.average_search_impression_share, 0.0);
    }

    #[test]
    fn key_values_include_pareto_only_when_present() {
        let report = InsightsReport::assemble(
            &totals(550, 150),
            1,
            None,
            funnel::analyze(&FunnelAccumulator::default()),
        );
        let keys = report
            .key_values()
            .into_iter()
            .map(|(k, _)| k)
            .collect::<Vec<_>>();
        assert!(keys.contains(&"roas".to_string()));
        assert!(!keys.iter().any(|k| k.starts_with("pareto")));
        assert!(keys.contains(&"clicks_per_conversion_low".to_string()));
        let roas = report
            .key_values()
            .into_iter()
            .find(|(k, _)| k == "roas")
            .unwrap()
            .1;
        assert_eq!(roas, "3.67");
    }
}
