//! Canonical campaign records and the row builder that produces them.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    coerce::{
        Coerced, CoercionOptions, coerce_amount, coerce_count, coerce_ratio,
        coerce_search_impression_share,
    },
    error::IngestError,
    ratio::{decimal_to_f64, safe_ratio},
    schema::{CanonicalField, REQUIRED_CAMPAIGN_FIELDS, SchemaMap},
    warnings::WarningLog,
};

/// Column order of the re-exported dataset.
pub const EXPORT_FIELDS: [CanonicalField; 9] = [
    CanonicalField::ItemId,
    CanonicalField::Impressions,
    CanonicalField::Clicks,
    CanonicalField::Ctr,
    CanonicalField::Conversions,
    CanonicalField::ConversionValue,
    CanonicalField::Cost,
    CanonicalField::ConversionValuePerCost,
    CanonicalField::SearchImpressionShare,
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub item_id: Option<String>,
    pub impressions: u64,
    pub clicks: u64,
    pub ctr: Option<Decimal>,
    pub conversions: Decimal,
    pub conversion_value: Decimal,
    pub cost: Decimal,
    pub conversion_value_per_cost: Option<Decimal>,
    pub search_impression_share: Option<Decimal>,
}

impl CanonicalRecord {
    /// Impressions per click, undefined when there were no clicks.
    pub fn impressions_per_click(&self) -> Option<f64> {
        (self.clicks > 0).then(|| safe_ratio(self.impressions as f64, self.clicks as f64, 0.0))
    }

    /// Clicks per conversion, undefined when there were no conversions.
    pub fn clicks_per_conversion(&self) -> Option<f64> {
        (!self.conversions.is_zero())
            .then(|| safe_ratio(self.clicks as f64, decimal_to_f64(self.conversions), 0.0))
    }

    pub fn export_cells(&self) -> Vec<String> {
        vec![
            self.item_id.clone().unwrap_or_default(),
            self.impressions.to_string(),
            self.clicks.to_string(),
            format_optional(self.ctr),
            format_decimal(self.conversions),
            format_decimal(self.conversion_value),
            format_decimal(self.cost),
            format_optional(self.conversion_value_per_cost),
            format_optional(self.search_impression_share),
        ]
    }
}

fn format_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

fn format_optional(value: Option<Decimal>) -> String {
    value.map(format_decimal).unwrap_or_default()
}

#[derive(Debug, Clone, Copy)]
struct Positions {
    item_id: Option<usize>,
    impressions: usize,
    clicks: usize,
    ctr: Option<usize>,
    conversions: usize,
    conversion_value: usize,
    cost: usize,
    conversion_value_per_cost: Option<usize>,
    search_impression_share: Option<usize>,
}

/// Turns decoded rows into [`CanonicalRecord`]s using positions resolved once
/// from the [`SchemaMap`].
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    positions: Positions,
    width: usize,
    options: CoercionOptions,
}

impl RecordBuilder {
    pub fn new(schema: &SchemaMap, options: CoercionOptions) -> Result<Self, IngestError> {
        schema.require(REQUIRED_CAMPAIGN_FIELDS)?;
        let required = |field| {
            schema
                .position(field)
                .ok_or(IngestError::MissingColumns(vec![field]))
        };
        let positions = Positions {
            item_id: schema.position(CanonicalField::ItemId),
            impressions: required(CanonicalField::Impressions)?,
            clicks: required(CanonicalField::Clicks)?,
            ctr: schema.position(CanonicalField::Ctr),
            conversions: required(CanonicalField::Conversions)?,
            conversion_value: required(CanonicalField::ConversionValue)?,
            cost: required(CanonicalField::Cost)?,
            conversion_value_per_cost: schema.position(CanonicalField::ConversionValuePerCost),
            search_impression_share: schema.position(CanonicalField::SearchImpressionShare),
        };
        Ok(Self {
            positions,
            width: schema.field_count(),
            options,
        })
    }

    pub fn has_item_ids(&self) -> bool {
        self.positions.item_id.is_some()
    }

    /// Builds one record, or `None` when the row has the wrong field count.
    pub fn build(
        &self,
        row: &[String],
        line: usize,
        warnings: &mut WarningLog,
    ) -> Option<CanonicalRecord> {
        if row.len() != self.width {
            warnings.record(
                line,
                format!(
                    "Skipped row with {} field(s); expected {}",
                    row.len(),
                    self.width
                ),
            );
            return None;
        }
        let cell = |idx: usize| row[idx].as_str();
        let p = self.positions;
        let impressions = take(warnings, line, coerce_count(cell(p.impressions))).value;
        let clicks = take(warnings, line, coerce_count(cell(p.clicks))).value;
        let conversions = take(warnings, line, coerce_amount(cell(p.conversions))).value;
        let conversion_value =
            take(warnings, line, coerce_amount(cell(p.conversion_value))).value;
        let cost = take(warnings, line, coerce_amount(cell(p.cost))).value;
        let conversion_value_per_cost = p
            .conversion_value_per_cost
            .map(|idx| take(warnings, line, coerce_amount(cell(idx))).value);
        let ctr = match p.ctr {
            Some(idx) => take(warnings, line, coerce_ratio(cell(idx))).into_option(),
            None => derived_ctr(clicks, impressions),
        };
        let search_impression_share = p.search_impression_share.and_then(|idx| {
            take(
                warnings,
                line,
                coerce_search_impression_share(cell(idx), &self.options),
            )
            .into_option()
        });
        let item_id = p
            .item_id
            .map(|idx| cell(idx).trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        Some(CanonicalRecord {
            item_id,
            impressions,
            clicks,
            ctr,
            conversions,
            conversion_value,
            cost,
            conversion_value_per_cost,
            search_impression_share,
        })
    }
}

fn take<T>(warnings: &mut WarningLog, line: usize, coerced: Coerced<T>) -> Coerced<T> {
    if let Some(message) = &coerced.warning {
        warnings.record(line, message.clone());
    }
    coerced
}

fn derived_ctr(clicks: u64, impressions: u64) -> Option<Decimal> {
    (impressions > 0).then(|| Decimal::from(clicks) / Decimal::from(impressions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AliasTable, DEFAULT_SIMILARITY_THRESHOLD};
    use std::str::FromStr;

    fn builder(headers: &[&str]) -> RecordBuilder {
        let headers = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
        let table = AliasTable::embedded().unwrap();
        let map = SchemaMap::build(&headers, &table, DEFAULT_SIMILARITY_THRESHOLD);
        RecordBuilder::new(&map, CoercionOptions::default()).unwrap()
    }

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn builds_record_from_messy_cells() {
        let builder = builder(&[
            "Item ID",
            "Impr.",
            "Clicks",
            "CTR",
            "Conversions",
            "Conv. value",
            "Cost",
            "Search impr. share",
        ]);
        let mut warnings = WarningLog::default();
        let record = builder
            .build(
                &row(&["SKU-1", "1,000", "100", "10%", "2.5", "$500.00", "$100", "< 10"]),
                2,
                &mut warnings,
            )
            .unwrap();
        assert_eq!(record.item_id.as_deref(), Some("SKU-1"));
        assert_eq!(record.impressions, 1000);
        assert_eq!(record.ctr, Some(Decimal::from_str("0.1").unwrap()));
        assert_eq!(record.conversions, Decimal::from_str("2.5").unwrap());
        assert_eq!(
            record.search_impression_share,
            Some(Decimal::from_str("0.05").unwrap())
        );
        assert_eq!(record.impressions_per_click(), Some(10.0));
        assert_eq!(record.clicks_per_conversion(), Some(40.0));
        assert!(warnings.is_empty());
    }

    #[test]
    fn ctr_is_derived_when_column_absent() {
        let builder = builder(&["Impressions", "Clicks", "Conversions", "Conv. value", "Cost"]);
        let mut warnings = WarningLog::default();
        let record = builder
            .build(&row(&["200", "10", "0", "0", "5"]), 2, &mut warnings)
            .unwrap();
        assert_eq!(record.ctr, Some(Decimal::from_str("0.05").unwrap()));
        assert_eq!(record.clicks_per_conversion(), None);
        let zero = builder
            .build(&row(&["0", "0", "0", "0", "0"]), 3, &mut warnings)
            .unwrap();
        assert_eq!(zero.ctr, None);
        assert_eq!(zero.impressions_per_click(), None);
    }

    #[test]
    fn wrong_width_rows_are_skipped_with_warning() {
        let builder = builder(&["Impressions", "Clicks", "Conversions", "Conv. value", "Cost"]);
        let mut warnings = WarningLog::default();
        assert!(builder.build(&row(&["1", "2"]), 7, &mut warnings).is_none());
        assert_eq!(warnings.entries()[0].line, 7);
    }

    #[test]
    fn export_cells_follow_export_field_order() {
        let builder = builder(&["Impressions", "Clicks", "Conversions", "Conv. value", "Cost"]);
        let mut warnings = WarningLog::default();
        let record = builder
            .build(&row(&["10", "1", "1", "12.50", "2.00"]), 2, &mut warnings)
            .unwrap();
        assert_eq!(
            record.export_cells(),
            vec!["", "10", "1", "0.1", "1", "12.5", "2", "", ""]
        );
    }
}
