//! Typed failures surfaced by the ingestion engine.
//!
//! Only file-level problems are errors. Row-level trouble (unparsable cells,
//! short rows) is recorded in the [`WarningLog`](crate::warnings::WarningLog)
//! and never aborts a run.

use itertools::Itertools;
use thiserror::Error;

use crate::schema::CanonicalField;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Missing required column(s): {}", format_fields(.0))]
    MissingColumns(Vec<CanonicalField>),
    #[error("Input has no header row")]
    MissingHeader,
    #[error("Input file is empty")]
    EmptyFile,
    #[error("Failed to decode row {row} as {encoding}; retry with a fallback encoding")]
    Encoding { encoding: &'static str, row: usize },
    #[error("Ingestion cancelled after {rows} row(s)")]
    Cancelled { rows: u64 },
    #[error("{0}")]
    Processing(String),
}

impl IngestError {
    pub fn processing(message: impl Into<String>) -> Self {
        IngestError::Processing(message.into())
    }

    /// Encoding failures are the only ones worth retrying with another decoder.
    pub fn is_encoding(&self) -> bool {
        matches!(self, IngestError::Encoding { .. })
    }
}

impl From<csv::Error> for IngestError {
    fn from(err: csv::Error) -> Self {
        IngestError::Processing(format!("Reading delimited input: {err}"))
    }
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::Processing(format!("I/O failure: {err}"))
    }
}

fn format_fields(fields: &[CanonicalField]) -> String {
    fields.iter().map(|field| field.as_str()).join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_columns_lists_canonical_names() {
        let err = IngestError::MissingColumns(vec![CanonicalField::Clicks, CanonicalField::Cost]);
        assert_eq!(err.to_string(), "Missing required column(s): clicks, cost");
    }

    #[test]
    fn only_encoding_errors_are_retryable() {
        let encoding = IngestError::Encoding {
            encoding: "UTF-8",
            row: 4,
        };
        assert!(encoding.is_encoding());
        assert!(!IngestError::EmptyFile.is_encoding());
        assert!(encoding.to_string().contains("row 4"));
    }
}
