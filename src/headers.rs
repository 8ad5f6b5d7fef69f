use anyhow::{Context, Result};
use log::{info, warn};

use crate::{
    analyze::{load_aliases, with_encoding_fallback, write_report},
    cli::{AliasesArgs, HeadersArgs, ReportFormat},
    io_utils,
    pipeline::{self, IngestOptions},
    render_structured,
    schema::{REQUIRED_CAMPAIGN_FIELDS, SchemaMap},
    table,
};

pub fn execute(args: &HeadersArgs) -> Result<()> {
    let source = &args.source;
    let aliases = load_aliases(source.aliases.as_deref())?;
    let options = IngestOptions {
        delimiter: io_utils::resolve_input_delimiter(&source.input, source.delimiter),
        encoding: io_utils::resolve_encoding(source.input_encoding.as_deref())?,
        similarity_threshold: source.threshold,
        ..IngestOptions::default()
    };
    let headers = with_encoding_fallback(source, &options, |options| {
        let input = io_utils::open_input(&source.input)?;
        let mut reader = io_utils::open_csv_reader(input, options.delimiter);
        pipeline::read_header(&mut reader, options.encoding)
    })
    .with_context(|| format!("Reading header row of {:?}", source.input))?;

    let schema = SchemaMap::build(&headers, &aliases, options.similarity_threshold);
    info!(
        "Mapped {} header(s) with alias table v{}",
        schema.field_count(),
        schema.alias_version()
    );
    if let Err(err) = schema.require(REQUIRED_CAMPAIGN_FIELDS) {
        warn!("Not analyzable as a campaign export: {err}");
    }

    let rendered = match args.format {
        ReportFormat::Table => {
            let headers = ["#", "header", "normalized", "canonical", "match"]
                .iter()
                .map(|h| h.to_string())
                .collect::<Vec<_>>();
            let rows = schema
                .decisions()
                .iter()
                .map(|decision| {
                    vec![
                        (decision.position + 1).to_string(),
                        decision.raw.clone(),
                        decision.normalized.clone(),
                        decision.output_name().to_string(),
                        decision.describe(),
                    ]
                })
                .collect::<Vec<_>>();
            table::render_table(&headers, &rows)
        }
        format => render_structured(format, &schema)?,
    };
    write_report(None, &rendered)
}

pub fn list_aliases(args: &AliasesArgs) -> Result<()> {
    let aliases = load_aliases(args.aliases.as_deref())?;
    let rendered = match args.format {
        ReportFormat::Table => {
            let headers = vec!["field".to_string(), "aliases".to_string()];
            let rows = aliases
                .fields
                .iter()
                .map(|(field, names)| vec![field.to_string(), names.join(", ")])
                .collect::<Vec<_>>();
            format!(
                "alias table v{}\n{}",
                aliases.version,
                table::render_table(&headers, &rows)
            )
        }
        format => render_structured(format, &aliases)?,
    };
    write_report(None, &rendered)
}
