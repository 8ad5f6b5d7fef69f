//! Guarded division shared by every derived metric.
//!
//! ROAS, CTR, funnel ratios and percentages all go through [`safe_ratio`] so a
//! zero denominator yields the caller's default instead of NaN or Infinity.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

pub fn safe_ratio(numerator: f64, denominator: f64, default: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return default;
    }
    let value = numerator / denominator;
    if value.is_finite() { value } else { default }
}

pub fn safe_ratio_decimal(numerator: Decimal, denominator: Decimal, default: f64) -> f64 {
    if denominator.is_zero() {
        return default;
    }
    match (numerator.to_f64(), denominator.to_f64()) {
        (Some(n), Some(d)) => safe_ratio(n, d, default),
        _ => default,
    }
}

/// Percentage of `part` in `whole`, zero when `whole` is zero.
pub fn percentage(part: f64, whole: f64) -> f64 {
    safe_ratio(part, whole, 0.0) * 100.0
}

pub fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Mean and population standard deviation; `(0, 0)` for an empty slice.
pub fn mean_and_population_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let count = values.len() as f64;
    let mean = safe_ratio(values.iter().sum::<f64>(), count, 0.0);
    let variance = safe_ratio(
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>(),
        count,
        0.0,
    );
    (mean, variance.max(0.0).sqrt())
}
