pub mod aggregate;
pub mod analyze;
pub mod cli;
pub mod coerce;
pub mod error;
pub mod export;
pub mod funnel;
pub mod headers;
pub mod insights;
pub mod io_utils;
pub mod pareto;
pub mod pipeline;
pub mod ratio;
pub mod record;
pub mod schema;
pub mod summary;
pub mod table;
pub mod warnings;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};
use serde::Serialize;

use crate::cli::{Cli, Commands, ReportFormat, SummaryArgs};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("pmax_insights", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze(args) => analyze::execute(&args),
        Commands::Headers(args) => headers::execute(&args),
        Commands::Aliases(args) => headers::list_aliases(&args),
        Commands::Summary(args) => handle_summary(&args),
    }
}

fn handle_summary(args: &SummaryArgs) -> Result<()> {
    let source = &args.source;
    let aliases = analyze::load_aliases(source.aliases.as_deref())?;
    let options = pipeline::IngestOptions {
        delimiter: io_utils::resolve_input_delimiter(&source.input, source.delimiter),
        encoding: io_utils::resolve_encoding(source.input_encoding.as_deref())?,
        similarity_threshold: source.threshold,
        ..pipeline::IngestOptions::default()
    };
    info!(
        "Summarizing '{}' with delimiter '{}'",
        source.input.display(),
        printable_delimiter(options.delimiter)
    );
    let report = analyze::with_encoding_fallback(source, &options, |options| {
        let summary_options = summary::SummaryOptions {
            delimiter: options.delimiter,
            encoding: options.encoding,
            similarity_threshold: options.similarity_threshold,
            warning_capacity: options.warning_capacity,
        };
        summary::summarize_path(&source.input, &aliases, &summary_options)
    })
    .with_context(|| format!("Summarizing {:?}", source.input))?;
    report.warnings.emit();

    let rendered = match args.format {
        ReportFormat::Table => {
            let (headers, rows) = report.trend_rows();
            format!(
                "{}\n{}",
                table::render_key_values(&report.key_values()),
                table::render_table(&headers, &rows)
            )
        }
        format => render_structured(format, &report)?,
    };
    analyze::write_report(None, &rendered)?;
    if args.show_warnings {
        analyze::print_warnings(&report.warnings);
    }
    Ok(())
}

/// Serializes a report as JSON, or YAML when asked for.
pub(crate) fn render_structured<T: Serialize>(format: ReportFormat, value: &T) -> Result<String> {
    match format {
        ReportFormat::Yaml => serde_yaml::to_string(value).context("Serializing report as YAML"),
        _ => serde_json::to_string_pretty(value).context("Serializing report as JSON"),
    }
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
