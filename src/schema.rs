//! Header normalization and canonical field mapping.
//!
//! Campaign exports spell the same column a dozen ways (`Impr.`, `Impressions`,
//! `impr_`). This module owns the canonical field set, the versioned alias
//! table that lists known spellings, and [`SchemaMap`], which maps one file's
//! header row onto canonical fields once per ingestion.
//!
//! ## Matching
//!
//! - Headers are normalized with [`normalize_header`] (snake case, punctuation
//!   collapsed to `_`).
//! - An exact alias hit always wins and claims its field first.
//! - Otherwise the best [`similarity`] score at or above the threshold is
//!   accepted; contested fields go to the higher score.
//! - Anything else passes through under its normalized name.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    fs,
    path::Path,
    str::FromStr,
};

use heck::ToSnakeCase;
use log::debug;
use serde::{Deserialize, Serialize};
use similar::TextDiff;

use crate::error::IngestError;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 75.0;

const EMBEDDED_ALIASES: &str = include_str!("aliases.yml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    ItemId,
    Impressions,
    Clicks,
    Ctr,
    Conversions,
    ConversionValue,
    Cost,
    ConversionValuePerCost,
    SearchImpressionShare,
    Month,
    CurrencyCode,
}

/// Fields a campaign export must provide before aggregation can start.
pub const REQUIRED_CAMPAIGN_FIELDS: &[CanonicalField] = &[
    CanonicalField::Impressions,
    CanonicalField::Clicks,
    CanonicalField::Conversions,
    CanonicalField::ConversionValue,
    CanonicalField::Cost,
];

impl CanonicalField {
    pub const ALL: [CanonicalField; 11] = [
        CanonicalField::ItemId,
        CanonicalField::Impressions,
        CanonicalField::Clicks,
        CanonicalField::Ctr,
        CanonicalField::Conversions,
        CanonicalField::ConversionValue,
        CanonicalField::Cost,
        CanonicalField::ConversionValuePerCost,
        CanonicalField::SearchImpressionShare,
        CanonicalField::Month,
        CanonicalField::CurrencyCode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::ItemId => "item_id",
            CanonicalField::Impressions => "impressions",
            CanonicalField::Clicks => "clicks",
            CanonicalField::Ctr => "ctr",
            CanonicalField::Conversions => "conversions",
            CanonicalField::ConversionValue => "conversion_value",
            CanonicalField::Cost => "cost",
            CanonicalField::ConversionValuePerCost => "conversion_value_per_cost",
            CanonicalField::SearchImpressionShare => "search_impression_share",
            CanonicalField::Month => "month",
            CanonicalField::CurrencyCode => "currency_code",
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_header(value);
        CanonicalField::ALL
            .into_iter()
            .find(|field| field.as_str() == normalized)
            .ok_or_else(|| format!("Unknown canonical field '{value}'"))
    }
}

/// Trim, lowercase and collapse whitespace/punctuation runs to a single `_`.
pub fn normalize_header(raw: &str) -> String {
    raw.trim().to_snake_case()
}

/// Similarity of two normalized strings on a 0–100 scale.
pub fn similarity(left: &str, right: &str) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    f64::from(TextDiff::from_chars(left, right).ratio()) * 100.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasTable {
    pub version: String,
    pub fields: BTreeMap<CanonicalField, Vec<String>>,
}

impl AliasTable {
    pub fn embedded() -> Result<Self, IngestError> {
        Self::from_yaml_str(EMBEDDED_ALIASES)
    }

    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let text = fs::read_to_string(path).map_err(|err| {
            IngestError::processing(format!("Reading alias table {path:?}: {err}"))
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, IngestError> {
        let raw: AliasTable = serde_yaml::from_str(text)
            .map_err(|err| IngestError::processing(format!("Parsing alias table: {err}")))?;
        raw.normalized()
    }

    /// Normalizes every alias, guarantees each field lists its own name and
    /// rejects an alias claimed by two fields.
    fn normalized(self) -> Result<Self, IngestError> {
        let mut seen: BTreeMap<String, CanonicalField> = BTreeMap::new();
        let mut fields = BTreeMap::new();
        for field in CanonicalField::ALL {
            let mut aliases = vec![field.as_str().to_string()];
            for alias in self.fields.get(&field).into_iter().flatten() {
                let normalized = normalize_header(alias);
                if !normalized.is_empty() && !aliases.contains(&normalized) {
                    aliases.push(normalized);
                }
            }
            for alias in &aliases {
                if let Some(previous) = seen.insert(alias.clone(), field)
                    && previous != field
                {
                    return Err(IngestError::processing(format!(
                        "Alias '{alias}' is listed under both '{previous}' and '{field}'"
                    )));
                }
            }
            fields.insert(field, aliases);
        }
        Ok(Self {
            version: self.version,
            fields,
        })
    }

    pub fn aliases(&self, field: CanonicalField) -> &[String] {
        self.fields.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeaderMatch {
    pub field: CanonicalField,
    pub score: f64,
    pub exact: bool,
}

/// Best canonical field for one normalized header, or `None` below `threshold`.
pub fn match_header(normalized: &str, table: &AliasTable, threshold: f64) -> Option<HeaderMatch> {
    if normalized.is_empty() {
        return None;
    }
    let mut best: Option<HeaderMatch> = None;
    for (field, aliases) in &table.fields {
        for alias in aliases {
            if alias == normalized {
                return Some(HeaderMatch {
                    field: *field,
                    score: 100.0,
                    exact: true,
                });
            }
            let score = similarity(normalized, alias);
            if score >= threshold && best.is_none_or(|current| score > current.score) {
                best = Some(HeaderMatch {
                    field: *field,
                    score,
                    exact: false,
                });
            }
        }
    }
    best
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MappingOutcome {
    Exact { field: CanonicalField },
    Fuzzy { field: CanonicalField, score: f64 },
    /// Matched a field another header had already claimed.
    Duplicate { field: CanonicalField, score: f64 },
    PassThrough,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingDecision {
    pub position: usize,
    pub raw: String,
    pub normalized: String,
    #[serde(flatten)]
    pub outcome: MappingOutcome,
}

impl MappingDecision {
    pub fn field(&self) -> Option<CanonicalField> {
        match self.outcome {
            MappingOutcome::Exact { field } | MappingOutcome::Fuzzy { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Name the column carries after normalization.
    pub fn output_name(&self) -> &str {
        match self.field() {
            Some(field) => field.as_str(),
            None => &self.normalized,
        }
    }

    pub fn describe(&self) -> String {
        match &self.outcome {
            MappingOutcome::Exact { .. } => "exact".to_string(),
            MappingOutcome::Fuzzy { score, .. } => format!("fuzzy ({score:.1})"),
            MappingOutcome::Duplicate { field, score } => {
                format!("duplicate of {field} ({score:.1})")
            }
            MappingOutcome::PassThrough => "pass-through".to_string(),
        }
    }
}

/// Mapping from one file's header row to canonical fields. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaMap {
    alias_version: String,
    decisions: Vec<MappingDecision>,
    #[serde(skip)]
    positions: BTreeMap<CanonicalField, usize>,
}

impl SchemaMap {
    pub fn build(headers: &[String], table: &AliasTable, threshold: f64) -> Self {
        let normalized = headers
            .iter()
            .map(|header| normalize_header(header))
            .collect::<Vec<_>>();
        let matches = normalized
            .iter()
            .map(|header| match_header(header, table, threshold))
            .collect::<Vec<_>>();

        // Exact hits claim first, then fuzzy hits strongest first.
        let mut order = (0..headers.len())
            .filter(|idx| matches[*idx].is_some())
            .collect::<Vec<_>>();
        order.sort_by(|a, b| {
            let (left, right) = (matches[*a], matches[*b]);
            let left_key = left.map(|m| (m.exact, m.score)).unwrap_or((false, 0.0));
            let right_key = right.map(|m| (m.exact, m.score)).unwrap_or((false, 0.0));
            right_key
                .0
                .cmp(&left_key.0)
                .then_with(|| right_key.1.total_cmp(&left_key.1))
                .then_with(|| a.cmp(b))
        });

        let mut claimed = HashSet::new();
        let mut outcomes = vec![MappingOutcome::PassThrough; headers.len()];
        let mut positions = BTreeMap::new();
        for idx in order {
            let Some(found) = matches[idx] else {
                continue;
            };
            outcomes[idx] = if !claimed.insert(found.field) {
                MappingOutcome::Duplicate {
                    field: found.field,
                    score: found.score,
                }
            } else {
                positions.insert(found.field, idx);
                if found.exact {
                    MappingOutcome::Exact { field: found.field }
                } else {
                    MappingOutcome::Fuzzy {
                        field: found.field,
                        score: found.score,
                    }
                }
            };
        }

        let decisions = headers
            .iter()
            .zip(normalized)
            .zip(outcomes)
            .enumerate()
            .map(|(position, ((raw, normalized), outcome))| MappingDecision {
                position,
                raw: raw.clone(),
                normalized,
                outcome,
            })
            .collect::<Vec<_>>();
        for decision in &decisions {
            debug!(
                "Header '{}' -> '{}' [{}]",
                decision.raw,
                decision.output_name(),
                decision.describe()
            );
        }

        Self {
            alias_version: table.version.clone(),
            decisions,
            positions,
        }
    }

    pub fn require(&self, required: &[CanonicalField]) -> Result<(), IngestError> {
        let missing = required
            .iter()
            .copied()
            .filter(|field| !self.positions.contains_key(field))
            .collect::<Vec<_>>();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(IngestError::MissingColumns(missing))
        }
    }

    pub fn position(&self, field: CanonicalField) -> Option<usize> {
        self.positions.get(&field).copied()
    }

    pub fn contains(&self, field: CanonicalField) -> bool {
        self.positions.contains_key(&field)
    }

    pub fn field_count(&self) -> usize {
        self.decisions.len()
    }

    pub fn decisions(&self) -> &[MappingDecision] {
        &self.decisions
    }

    pub fn alias_version(&self) -> &str {
        &self.alias_version
    }
}
