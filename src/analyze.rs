use std::{io::Write, path::Path};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::{
    cli::{AnalyzeArgs, InputArgs, ReportFormat},
    coerce::CoercionOptions,
    error::IngestError,
    export::{self, CsvExporter},
    io_utils::{self, StagedOutput},
    pipeline::{self, IngestOptions, Ingestion, RecordSink},
    printable_delimiter, render_structured,
    schema::AliasTable,
    table,
    warnings::WarningLog,
};

pub fn execute(args: &AnalyzeArgs) -> Result<()> {
    let source = &args.source;
    let aliases = load_aliases(source.aliases.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(&source.input, source.delimiter);
    let encoding = io_utils::resolve_encoding(source.input_encoding.as_deref())?;
    info!(
        "Analyzing '{}' with delimiter '{}' (alias table v{})",
        source.input.display(),
        printable_delimiter(delimiter),
        aliases.version
    );

    let options = IngestOptions {
        chunk_size: args.chunk_size,
        workers: args.workers,
        delimiter,
        encoding,
        similarity_threshold: source.threshold,
        coercion: CoercionOptions {
            clip_search_impression_share: args.clip_search_share,
        },
        preview_rows: args.preview,
        warning_capacity: args.max_warnings,
        cancel: None,
    };
    let ingestion = with_encoding_fallback(source, &options, |options| {
        ingest_once(args, &aliases, options)
    })
    .with_context(|| format!("Analyzing {:?}", source.input))?;
    ingestion.warnings.emit();

    if args.preview > 0 {
        let (headers, rows) = export::preview_rows(&ingestion.preview);
        table::print_table(&headers, &rows);
        println!();
    }

    let report = &ingestion.report;
    let rendered = match args.format {
        ReportFormat::Table => table::render_key_values(&report.key_values()),
        format => render_structured(format, report)?,
    };
    write_report(args.report.as_deref(), &rendered)?;

    if args.show_warnings {
        print_warnings(&ingestion.warnings);
    }
    Ok(())
}

/// One ingestion attempt. The export is staged and only committed once the
/// whole input has been processed, so a failed or retried attempt leaves no
/// partial dataset behind.
fn ingest_once(
    args: &AnalyzeArgs,
    aliases: &AliasTable,
    options: &IngestOptions,
) -> Result<Ingestion, IngestError> {
    let Some(path) = &args.export else {
        return pipeline::ingest_path(&args.source.input, aliases, options, None);
    };
    let delimiter = io_utils::resolve_output_delimiter(
        Some(path.as_path()),
        args.output_delimiter,
        options.delimiter,
    );
    let encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())?;
    info!(
        "Exporting coerced rows to '{}' with delimiter '{}'",
        path.display(),
        printable_delimiter(delimiter)
    );
    let mut exporter = CsvExporter::new(StagedOutput::create(path)?, delimiter, encoding)?;
    let sink: &mut dyn RecordSink = &mut exporter;
    let ingestion = pipeline::ingest_path(&args.source.input, aliases, options, Some(sink))?;
    exporter.into_inner()?.commit()?;
    Ok(ingestion)
}

/// Runs `attempt` and, when the input fails to decode, retries once with the
/// fallback encoding. Standard input cannot be replayed and is never retried.
pub(crate) fn with_encoding_fallback<T>(
    source: &InputArgs,
    options: &IngestOptions,
    mut attempt: impl FnMut(&IngestOptions) -> Result<T, IngestError>,
) -> Result<T, IngestError> {
    match attempt(options) {
        Err(err) if err.is_encoding() && !io_utils::is_dash(&source.input) => {
            let fallback = io_utils::resolve_encoding(Some(&source.fallback_encoding))?;
            if fallback == options.encoding {
                return Err(err);
            }
            warn!("{err}; retrying with {}", fallback.name());
            let retry = IngestOptions {
                encoding: fallback,
                ..options.clone()
            };
            attempt(&retry)
        }
        other => other,
    }
}

pub(crate) fn load_aliases(path: Option<&Path>) -> Result<AliasTable> {
    match path {
        Some(path) => {
            AliasTable::load(path).with_context(|| format!("Loading alias table from {path:?}"))
        }
        None => AliasTable::embedded().context("Loading embedded alias table"),
    }
}

pub(crate) fn write_report(path: Option<&Path>, rendered: &str) -> Result<()> {
    let mut output = io_utils::open_output(path)?;
    output
        .write_all(rendered.as_bytes())
        .context("Writing report")?;
    if !rendered.ends_with('\n') {
        output.write_all(b"\n").context("Writing report")?;
    }
    output.flush().context("Writing report")?;
    if let Some(path) = path.filter(|p| !io_utils::is_dash(p)) {
        info!("Report written to {path:?}");
    }
    Ok(())
}

pub(crate) fn print_warnings(warnings: &WarningLog) {
    if warnings.is_empty() {
        println!("No row warnings.");
        return;
    }
    let headers = vec!["line".to_string(), "warning".to_string()];
    let rows = warnings
        .entries()
        .iter()
        .map(|entry| vec![entry.line.to_string(), entry.message.clone()])
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    if warnings.suppressed() > 0 {
        println!("... {} more warning(s) not shown", warnings.suppressed());
    }
}
