use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{io_utils::FALLBACK_ENCODING_LABEL, pipeline::DEFAULT_CHUNK_SIZE};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Ingest advertising campaign exports and report ROAS, Pareto and funnel insights",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ingest a campaign export and report totals, ROAS, Pareto tiers and funnel bands
    Analyze(AnalyzeArgs),
    /// Show how each header of a file maps onto canonical fields
    Headers(HeadersArgs),
    /// List the effective header alias table
    Aliases(AliasesArgs),
    /// Summarize a month-by-month account export
    Summary(SummaryArgs),
}

/// Options shared by every command that reads an export.
#[derive(Debug, Args)]
pub struct InputArgs {
    /// Input export file (`-` reads stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Delimiter character (supports ',', 'tab', ';', '|'); defaults from the extension
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Encoding retried once when the input does not decode
    #[arg(long = "fallback-encoding", default_value = FALLBACK_ENCODING_LABEL)]
    pub fallback_encoding: String,
    /// Alias table YAML replacing the embedded one
    #[arg(long = "aliases")]
    pub aliases: Option<PathBuf>,
    /// Minimum similarity score (0-100) for a fuzzy header match
    #[arg(
        long = "threshold",
        value_parser = parse_threshold,
        default_value_t = crate::schema::DEFAULT_SIMILARITY_THRESHOLD
    )]
    pub threshold: f64,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub source: InputArgs,
    /// Rows per chunk
    #[arg(
        long = "chunk-size",
        default_value_t = DEFAULT_CHUNK_SIZE,
        value_parser = parse_positive
    )]
    pub chunk_size: usize,
    /// Chunks summarized in parallel
    #[arg(long, default_value_t = 1, value_parser = parse_positive)]
    pub workers: usize,
    /// Clamp search impression share into [0, 1]
    #[arg(long = "clip-search-share")]
    pub clip_search_share: bool,
    /// Report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Table)]
    pub format: ReportFormat,
    /// Write the report here instead of stdout
    #[arg(long = "report")]
    pub report: Option<PathBuf>,
    /// Re-export the coerced dataset to this file (`-` for stdout)
    #[arg(long = "export")]
    pub export: Option<PathBuf>,
    /// Delimiter for the export (defaults from its extension)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
    /// Character encoding for the export (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
    /// Print the first N coerced rows
    #[arg(long, default_value_t = 0)]
    pub preview: usize,
    /// Print retained row warnings after the report
    #[arg(long = "show-warnings")]
    pub show_warnings: bool,
    /// Maximum number of row warnings retained
    #[arg(
        long = "max-warnings",
        default_value_t = crate::warnings::DEFAULT_WARNING_CAPACITY
    )]
    pub max_warnings: usize,
}

#[derive(Debug, Args)]
pub struct HeadersArgs {
    #[command(flatten)]
    pub source: InputArgs,
    /// Output format
    #[arg(long, value_enum, default_value_t = ReportFormat::Table)]
    pub format: ReportFormat,
}

#[derive(Debug, Args)]
pub struct AliasesArgs {
    /// Alias table YAML replacing the embedded one
    #[arg(long = "aliases")]
    pub aliases: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = ReportFormat::Table)]
    pub format: ReportFormat,
}

#[derive(Debug, Args)]
pub struct SummaryArgs {
    #[command(flatten)]
    pub source: InputArgs,
    /// Report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Table)]
    pub format: ReportFormat,
    /// Print retained row warnings after the report
    #[arg(long = "show-warnings")]
    pub show_warnings: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
#[value(rename_all = "kebab-case")]
pub enum ReportFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_threshold(value: &str) -> Result<f64, String> {
    let parsed = value
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Threshold '{value}' is not a number"))?;
    if !(0.0..=100.0).contains(&parsed) {
        return Err("Threshold must be between 0 and 100".to_string());
    }
    Ok(parsed)
}

fn parse_positive(value: &str) -> Result<usize, String> {
    match value.trim().parse::<usize>() {
        Ok(0) => Err("Value must be at least 1".to_string()),
        Ok(parsed) => Ok(parsed),
        Err(_) => Err(format!("'{value}' is not a positive integer")),
    }
}
