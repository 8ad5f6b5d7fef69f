//! Funnel efficiency: impressions per click and clicks per conversion.
//!
//! Each row is banded against the dataset mean of its ratio, so what counts as
//! efficient adapts to the vertical instead of a fixed cutoff:
//!
//! | band     | ratio                                   |
//! |----------|-----------------------------------------|
//! | High     | `<= 0.9 * mean`                         |
//! | Moderate | `(0.9 * mean, 1.1 * mean]`              |
//! | Low      | `> 1.1 * mean`, or undefined ratio      |
//!
//! Lower ratios are better: fewer impressions per click, fewer clicks per
//! conversion. A zero denominator is treated as the worst case.

use serde::Serialize;

use crate::{
    ratio::{mean_and_population_std, percentage},
    record::CanonicalRecord,
};

const HIGH_CEILING: f64 = 0.9;
const MODERATE_CEILING: f64 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Band {
    High,
    Moderate,
    Low,
}

impl Band {
    pub fn classify(ratio: Option<f64>, mean: f64) -> Band {
        match ratio {
            Some(value) if value <= HIGH_CEILING * mean => Band::High,
            Some(value) if value <= MODERATE_CEILING * mean => Band::Moderate,
            _ => Band::Low,
        }
    }
}

/// Per-row ratio values gathered during streaming.
///
/// Only defined ratios are stored; undefined rows are implied by the row
/// count. Merging is concatenation, so band counts do not depend on order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunnelAccumulator {
    rows: u64,
    impressions_per_click: Vec<f64>,
    clicks_per_conversion: Vec<f64>,
}

impl FunnelAccumulator {
    pub fn push(&mut self, record: &CanonicalRecord) {
        self.rows += 1;
        if let Some(ratio) = record.impressions_per_click() {
            self.impressions_per_click.push(ratio);
        }
        if let Some(ratio) = record.clicks_per_conversion() {
            self.clicks_per_conversion.push(ratio);
        }
    }

    pub fn merge(&mut self, other: FunnelAccumulator) {
        self.rows += other.rows;
        self.impressions_per_click.extend(other.impressions_per_click);
        self.clicks_per_conversion.extend(other.clicks_per_conversion);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandStat {
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatioBreakdown {
    pub mean: f64,
    pub std_dev: f64,
    pub defined_rows: u64,
    pub high: BandStat,
    pub moderate: BandStat,
    pub low: BandStat,
}

impl RatioBreakdown {
    fn from_values(values: &[f64], total_rows: u64) -> Self {
        let (mean, std_dev) = mean_and_population_std(values);
        let (mut high, mut moderate) = (0u64, 0u64);
        for value in values {
            match Band::classify(Some(*value), mean) {
                Band::High => high += 1,
                Band::Moderate => moderate += 1,
                Band::Low => {}
            }
        }
        let low = total_rows.saturating_sub(high + moderate);
        let stat = |count: u64| BandStat {
            count,
            percentage: percentage(count as f64, total_rows as f64),
        };
        Self {
            mean,
            std_dev,
            defined_rows: values.len() as u64,
            high: stat(high),
            moderate: stat(moderate),
            low: stat(low),
        }
    }

    pub fn band(&self, band: Band) -> BandStat {
        match band {
            Band::High => self.high,
            Band::Moderate => self.moderate,
            Band::Low => self.low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunnelResult {
    pub total_rows: u64,
    pub impressions_per_click: RatioBreakdown,
    pub clicks_per_conversion: RatioBreakdown,
}

pub fn analyze(accumulator: &FunnelAccumulator) -> FunnelResult {
    FunnelResult {
        total_rows: accumulator.rows,
        impressions_per_click: RatioBreakdown::from_values(
            &accumulator.impressions_per_click,
            accumulator.rows,
        ),
        clicks_per_conversion: RatioBreakdown::from_values(
            &accumulator.clicks_per_conversion,
            accumulator.rows,
        ),
    }
}
