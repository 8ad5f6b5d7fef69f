//! Month-by-month account summary.
//!
//! Account exports carry one row per month with conversion value, cost and a
//! currency code. Rows are mapped through the same alias table as campaign
//! exports, sorted chronologically and totalled. More than one currency code
//! flags the report as mixed, since totals across currencies are meaningless.

use std::{collections::BTreeSet, io::Read, path::Path};

use chrono::{Datelike, NaiveDate};
use encoding_rs::{Encoding, UTF_8};
use log::{info, warn};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    coerce::coerce_amount,
    error::IngestError,
    io_utils,
    pipeline::read_header,
    ratio::{decimal_to_f64, safe_ratio_decimal},
    schema::{AliasTable, CanonicalField, DEFAULT_SIMILARITY_THRESHOLD, SchemaMap},
    warnings::{DEFAULT_WARNING_CAPACITY, WarningLog},
};

pub const REQUIRED_SUMMARY_FIELDS: &[CanonicalField] = &[
    CanonicalField::Month,
    CanonicalField::ConversionValue,
    CanonicalField::Cost,
    CanonicalField::CurrencyCode,
];

#[derive(Debug, Clone)]
pub struct SummaryOptions {
    pub delimiter: u8,
    pub encoding: &'static Encoding,
    pub similarity_threshold: f64,
    pub warning_capacity: usize,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            delimiter: io_utils::DEFAULT_CSV_DELIMITER,
            encoding: UTF_8,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            warning_capacity: DEFAULT_WARNING_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRow {
    pub month: NaiveDate,
    pub currency_code: String,
    pub conversion_value: f64,
    pub cost: f64,
    pub conversion_value_per_cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub months: Vec<MonthlyRow>,
    pub dropped_rows: u64,
    pub currencies: Vec<String>,
    pub mixed_currency: bool,
    pub total_conversion_value: f64,
    pub total_cost: f64,
    pub overall_conversion_value_per_cost: f64,
    #[serde(skip)]
    pub warnings: WarningLog,
}

impl AccountSummary {
    /// Currency label for totals, `None` when the codes disagree or are absent.
    pub fn currency(&self) -> Option<&str> {
        match self.currencies.as_slice() {
            [single] => Some(single.as_str()),
            _ => None,
        }
    }

    pub fn key_values(&self) -> Vec<(String, String)> {
        let label = self.currency().unwrap_or("mixed");
        vec![
            ("months".to_string(), self.months.len().to_string()),
            ("dropped_rows".to_string(), self.dropped_rows.to_string()),
            ("currencies".to_string(), self.currencies.join(", ")),
            (
                "total_conversion_value".to_string(),
                format!("{label} {:.2}", self.total_conversion_value),
            ),
            (
                "total_cost".to_string(),
                format!("{label} {:.2}", self.total_cost),
            ),
            (
                "overall_conversion_value_per_cost".to_string(),
                format!("{:.2}", self.overall_conversion_value_per_cost),
            ),
        ]
    }

    pub fn trend_rows(&self) -> (Vec<String>, Vec<Vec<String>>) {
        let headers = [
            "month",
            "currency_code",
            "conversion_value",
            "cost",
            "conversion_value_per_cost",
        ]
        .iter()
        .map(|h| h.to_string())
        .collect();
        let rows = self
            .months
            .iter()
            .map(|row| {
                vec![
                    row.month.format("%Y-%m").to_string(),
                    row.currency_code.clone(),
                    format!("{:.2}", row.conversion_value),
                    format!("{:.2}", row.cost),
                    format!("{:.2}", row.conversion_value_per_cost),
                ]
            })
            .collect();
        (headers, rows)
    }
}

/// Parses the month formats account exports use into the first day of that
/// month.
pub fn parse_month(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    let first_of_month = |date: NaiveDate| date.with_day0(0);
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return first_of_month(date);
    }
    let candidates = [
        (format!("{value}-01"), "%Y-%m-%d"),
        (format!("{value}/01"), "%Y/%m/%d"),
        (format!("01/{value}"), "%d/%m/%Y"),
        (format!("1 {value}"), "%d %B %Y"),
        (format!("1 {}", value.replace(',', "")), "%d %b %Y"),
    ];
    candidates
        .iter()
        .find_map(|(text, format)| NaiveDate::parse_from_str(text, format).ok())
        .and_then(first_of_month)
}

pub fn summarize_path(
    path: &Path,
    aliases: &AliasTable,
    options: &SummaryOptions,
) -> Result<AccountSummary, IngestError> {
    info!(
        "Summarizing account export '{}' ({})",
        path.display(),
        options.encoding.name()
    );
    let input = io_utils::open_input(path)?;
    summarize_reader(input, aliases, options)
}

pub fn summarize_reader<R: Read>(
    input: R,
    aliases: &AliasTable,
    options: &SummaryOptions,
) -> Result<AccountSummary, IngestError> {
    let mut reader = io_utils::open_csv_reader(input, options.delimiter);
    let headers = read_header(&mut reader, options.encoding)?;
    let schema = SchemaMap::build(&headers, aliases, options.similarity_threshold);
    schema.require(REQUIRED_SUMMARY_FIELDS)?;
    let column = |field| schema.position(field).unwrap_or_default();
    let (month_idx, value_idx, cost_idx, currency_idx) = (
        column(CanonicalField::Month),
        column(CanonicalField::ConversionValue),
        column(CanonicalField::Cost),
        column(CanonicalField::CurrencyCode),
    );
    let ratio_idx = schema.position(CanonicalField::ConversionValuePerCost);

    let mut warnings = WarningLog::with_capacity(options.warning_capacity);
    let mut entries = Vec::new();
    let mut dropped_rows = 0u64;
    let mut record = csv::ByteRecord::new();
    while reader.read_byte_record(&mut record)? {
        let line = record
            .position()
            .map(|pos| pos.line() as usize)
            .unwrap_or_default();
        let row = io_utils::decode_record(&record, options.encoding, line)?;
        let cell = |idx: usize| row.get(idx).map(String::as_str).unwrap_or("");

        let Some(month) = parse_month(cell(month_idx)) else {
            warnings.record(
                line,
                format!("Unrecognized month '{}'; row dropped", cell(month_idx)),
            );
            dropped_rows += 1;
            continue;
        };
        let (Some(value), Some(cost)) = (
            required_amount(cell(value_idx)),
            required_amount(cell(cost_idx)),
        ) else {
            warnings.record(line, "Missing or unparsable amount; row dropped");
            dropped_rows += 1;
            continue;
        };
        let ratio = ratio_idx
            .and_then(|idx| required_amount(cell(idx)))
            .map(decimal_to_f64)
            .unwrap_or_else(|| safe_ratio_decimal(value, cost, 0.0));
        entries.push((
            month,
            cell(currency_idx).trim().to_string(),
            value,
            cost,
            ratio,
        ));
    }

    entries.sort_by_key(|entry| entry.0);
    let currencies = entries
        .iter()
        .map(|entry| entry.1.clone())
        .filter(|code| !code.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();
    let mixed_currency = currencies.len() > 1;
    if mixed_currency {
        warn!(
            "Multiple currencies detected ({}); totals mix units",
            currencies.join(", ")
        );
    }
    let (total_value, total_cost) = entries
        .iter()
        .fold((Decimal::ZERO, Decimal::ZERO), |(value, cost), entry| {
            (value.saturating_add(entry.2), cost.saturating_add(entry.3))
        });
    info!(
        "Summarized {} month(s); {} row(s) dropped",
        entries.len(),
        dropped_rows
    );

    Ok(AccountSummary {
        months: entries
            .into_iter()
            .map(|(month, currency_code, value, cost, ratio)| MonthlyRow {
                month,
                currency_code,
                conversion_value: decimal_to_f64(value),
                cost: decimal_to_f64(cost),
                conversion_value_per_cost: ratio,
            })
            .collect(),
        dropped_rows,
        currencies,
        mixed_currency,
        total_conversion_value: decimal_to_f64(total_value),
        total_cost: decimal_to_f64(total_cost),
        overall_conversion_value_per_cost: safe_ratio_decimal(total_value, total_cost, 0.0),
        warnings,
    })
}

/// Blank or unparsable amounts disqualify a summary row.
fn required_amount(raw: &str) -> Option<Decimal> {
    if raw.trim().is_empty() {
        return None;
    }
    let coerced = coerce_amount(raw);
    coerced.warning.is_none().then_some(coerced.value)
}
