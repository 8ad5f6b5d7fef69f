//! Cell coercion for campaign exports.
//!
//! Exports mix `$1,234.50`, `12.5%`, `--` and `< 10%` in what should be plain
//! numeric columns. Amount and count cells keep only digits and the decimal
//! point; ratio cells understand the placeholder tokens. Coercion never fails:
//! unparsable amounts become zero with a warning, unparsable ratios become
//! missing with a warning.

use std::{str::FromStr, sync::OnceLock};

use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Midpoint used for the `< 10%` search impression share bucket.
pub const BELOW_TEN_PERCENT_MIDPOINT: Decimal = Decimal::from_parts(5, 0, 0, false, 2);
/// Midpoint used for the `> 90%` search impression share bucket.
pub const ABOVE_NINETY_PERCENT_MIDPOINT: Decimal = Decimal::from_parts(95, 0, 0, false, 2);

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoercionOptions {
    /// Clamp search impression share into [0, 1] after coercion.
    pub clip_search_impression_share: bool,
}

/// A coerced cell: the value, whether it was missing, and any warning raised.
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced<T> {
    pub value: T,
    pub is_missing: bool,
    pub warning: Option<String>,
}

impl<T> Coerced<T> {
    fn present(value: T) -> Self {
        Self {
            value,
            is_missing: false,
            warning: None,
        }
    }

    fn defaulted(value: T, warning: String) -> Self {
        Self {
            value,
            is_missing: false,
            warning: Some(warning),
        }
    }

    pub fn into_option(self) -> Option<T> {
        if self.is_missing {
            None
        } else {
            Some(self.value)
        }
    }
}

impl Coerced<Decimal> {
    fn missing(warning: Option<String>) -> Self {
        Self {
            value: Decimal::ZERO,
            is_missing: true,
            warning,
        }
    }
}

fn below_ten_token() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"^<\s*10(\.0+)?\s*%?$").expect("valid placeholder regex"))
}

fn above_ninety_token() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"^>\s*90(\.0+)?\s*%?$").expect("valid placeholder regex"))
}

fn is_dash_placeholder(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| matches!(c, '-' | '\u{2013}' | '\u{2014}'))
}

/// Keeps digits and the decimal point, dropping currency symbols, signs,
/// thousands separators and stray text.
fn numeric_residue(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect()
}

pub fn coerce_amount(raw: &str) -> Coerced<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Coerced::present(Decimal::ZERO);
    }
    let residue = numeric_residue(trimmed);
    match Decimal::from_str(&residue) {
        Ok(value) => Coerced::present(value),
        Err(_) => Coerced::defaulted(
            Decimal::ZERO,
            format!("Unparsable numeric value '{trimmed}' treated as 0"),
        ),
    }
}

pub fn coerce_count(raw: &str) -> Coerced<u64> {
    let amount = coerce_amount(raw);
    let rounded = amount
        .value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64();
    match (rounded, amount.warning) {
        (Some(value), None) => Coerced::present(value),
        (Some(value), Some(warning)) => Coerced::defaulted(value, warning),
        (None, _) => Coerced::defaulted(
            0,
            format!("Count '{}' out of range treated as 0", raw.trim()),
        ),
    }
}

/// Parses a percentage-style cell into a fraction (`45%` -> `0.45`).
pub fn coerce_ratio(raw: &str) -> Coerced<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_dash_placeholder(trimmed) {
        return Coerced::missing(None);
    }
    if below_ten_token().is_match(trimmed) {
        return Coerced::present(BELOW_TEN_PERCENT_MIDPOINT);
    }
    if above_ninety_token().is_match(trimmed) {
        return Coerced::present(ABOVE_NINETY_PERCENT_MIDPOINT);
    }
    let body = trimmed
        .trim_end_matches('%')
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect::<String>();
    match Decimal::from_str(&body) {
        Ok(value) => Coerced::present(value / HUNDRED),
        Err(_) => Coerced::missing(Some(format!(
            "Unparsable ratio '{trimmed}' treated as missing"
        ))),
    }
}

pub fn coerce_search_impression_share(raw: &str, options: &CoercionOptions) -> Coerced<Decimal> {
    let mut coerced = coerce_ratio(raw);
    if options.clip_search_impression_share && !coerced.is_missing {
        coerced.value = coerced.value.clamp(Decimal::ZERO, Decimal::ONE);
    }
    coerced
}
