//! End-to-end ingestion: header mapping, chunked reading, aggregation and
//! report assembly.
//!
//! Rows are read into chunks of `chunk_size` whole rows. With `workers > 1`,
//! up to `workers` chunks are summarized in parallel on a dedicated rayon pool
//! and then folded in input order by the session, which stays the single
//! writer. Cancellation is checked between batches of chunks.

use std::{
    io::Read,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use encoding_rs::{Encoding, UTF_8};
use log::{debug, info};
use rayon::prelude::*;

use crate::{
    aggregate::{AggregationSession, ChunkSummary, RawChunk},
    coerce::CoercionOptions,
    error::IngestError,
    funnel,
    insights::InsightsReport,
    io_utils, pareto,
    record::{CanonicalRecord, RecordBuilder},
    schema::{AliasTable, DEFAULT_SIMILARITY_THRESHOLD, SchemaMap},
    warnings::{DEFAULT_WARNING_CAPACITY, WarningLog},
};

pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub chunk_size: usize,
    pub workers: usize,
    pub delimiter: u8,
    pub encoding: &'static Encoding,
    pub similarity_threshold: f64,
    pub coercion: CoercionOptions,
    pub preview_rows: usize,
    pub warning_capacity: usize,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: 1,
            delimiter: io_utils::DEFAULT_CSV_DELIMITER,
            encoding: UTF_8,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            coercion: CoercionOptions::default(),
            preview_rows: 0,
            warning_capacity: DEFAULT_WARNING_CAPACITY,
            cancel: None,
        }
    }
}

impl IngestOptions {
    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Receives every coerced record in input order.
pub trait RecordSink {
    fn accept(&mut self, record: &CanonicalRecord) -> Result<(), IngestError>;

    fn finish(&mut self) -> Result<(), IngestError> {
        Ok(())
    }
}

/// Everything one ingestion run produces.
#[derive(Debug, Clone)]
pub struct Ingestion {
    pub schema: SchemaMap,
    pub report: InsightsReport,
    pub preview: Vec<CanonicalRecord>,
    pub warnings: WarningLog,
}

pub fn ingest_path(
    path: &Path,
    aliases: &AliasTable,
    options: &IngestOptions,
    sink: Option<&mut dyn RecordSink>,
) -> Result<Ingestion, IngestError> {
    info!(
        "Ingesting '{}' (encoding {}, chunk size {}, {} worker(s))",
        path.display(),
        options.encoding.name(),
        options.chunk_size,
        options.workers.max(1)
    );
    let input = io_utils::open_input(path)?;
    ingest_reader(input, aliases, options, sink)
}

pub fn ingest_reader<R: Read>(
    input: R,
    aliases: &AliasTable,
    options: &IngestOptions,
    mut sink: Option<&mut dyn RecordSink>,
) -> Result<Ingestion, IngestError> {
    let mut reader = io_utils::open_csv_reader(input, options.delimiter);
    let headers = read_header(&mut reader, options.encoding)?;
    let schema = SchemaMap::build(&headers, aliases, options.similarity_threshold);
    let builder = RecordBuilder::new(&schema, options.coercion)?;

    let chunk_size = options.chunk_size.max(1);
    let batch_len = options.workers.max(1);
    let pool = if batch_len > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(batch_len)
            .build()
            .map_err(|err| IngestError::processing(format!("Starting worker pool: {err}")))?;
        Some(pool)
    } else {
        None
    };
    let mut session = AggregationSession::new(builder.has_item_ids(), options.warning_capacity);
    let mut preview = Vec::with_capacity(options.preview_rows);
    let mut next_index = 0usize;

    loop {
        if options.cancelled() {
            return Err(IngestError::Cancelled {
                rows: session.rows(),
            });
        }
        let batch = read_batch(
            &mut reader,
            options.encoding,
            chunk_size,
            batch_len,
            next_index,
        )?;
        if batch.is_empty() {
            break;
        }
        next_index += batch.len();

        let keep_records = sink.is_some() || preview.len() < options.preview_rows;
        let summarize = |chunk: &RawChunk| {
            ChunkSummary::summarize(chunk, &builder, options.warning_capacity, keep_records)
        };
        let outcomes = match &pool {
            Some(pool) if batch.len() > 1 => {
                pool.install(|| batch.par_iter().map(summarize).collect::<Vec<_>>())
            }
            _ => batch.iter().map(summarize).collect::<Vec<_>>(),
        };

        for (summary, records) in outcomes {
            for record in records {
                if let Some(sink) = sink.as_deref_mut() {
                    sink.accept(&record)?;
                }
                if preview.len() < options.preview_rows {
                    preview.push(record);
                }
            }
            session.fold(summary);
        }
    }
    if let Some(sink) = sink.as_deref_mut() {
        sink.finish()?;
    }

    let chunks = session.chunks();
    let aggregates = session.finish();
    let pareto = aggregates
        .skus
        .as_ref()
        .map(|skus| pareto::analyze(skus, aggregates.totals.conversion_value));
    let funnel = funnel::analyze(&aggregates.funnel);
    let report = InsightsReport::assemble(
        &aggregates.totals,
        aggregates.warnings.total(),
        pareto,
        funnel,
    );
    info!(
        "Aggregated {} row(s) in {} chunk(s); {} skipped, {} warning(s)",
        report.row_count,
        chunks,
        report.skipped_rows,
        aggregates.warnings.total()
    );
    Ok(Ingestion {
        schema,
        report,
        preview,
        warnings: aggregates.warnings,
    })
}

/// Reads and decodes the header row of a delimited input.
pub fn read_header<R: Read>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>, IngestError> {
    let mut record = csv::ByteRecord::new();
    if !reader.read_byte_record(&mut record)? {
        return Err(IngestError::EmptyFile);
    }
    let headers = io_utils::decode_headers(&record, encoding)?;
    if !looks_like_header(&headers) {
        return Err(IngestError::MissingHeader);
    }
    debug!("Header row: {:?}", headers);
    Ok(headers)
}

/// A header needs at least one cell that is neither blank nor numeric.
fn looks_like_header(headers: &[String]) -> bool {
    headers.iter().any(|cell| {
        let trimmed = cell.trim();
        !trimmed.is_empty()
            && !trimmed
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '$' | '%' | ' '))
    })
}

/// Reads up to `batch_len` chunks of up to `chunk_size` rows each.
fn read_batch<R: Read>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
    chunk_size: usize,
    batch_len: usize,
    first_index: usize,
) -> Result<Vec<RawChunk>, IngestError> {
    let mut batch = Vec::with_capacity(batch_len);
    let mut record = csv::ByteRecord::new();
    for offset in 0..batch_len {
        let mut chunk = RawChunk {
            index: first_index + offset,
            lines: Vec::with_capacity(chunk_size.min(4096)),
            rows: Vec::with_capacity(chunk_size.min(4096)),
        };
        while chunk.len() < chunk_size {
            if !reader.read_byte_record(&mut record)? {
                break;
            }
            let line = record
                .position()
                .map(|pos| pos.line() as usize)
                .unwrap_or_default();
            chunk.rows.push(io_utils::decode_record(&record, encoding, line)?);
            chunk.lines.push(line);
        }
        if chunk.is_empty() {
            break;
        }
        let full = chunk.len() == chunk_size;
        batch.push(chunk);
        if !full {
            break;
        }
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Item ID,Impr.,Clicks,Conversions,Conv. value,Cost,Search impr. share
A,1000,100,10,500,100,< 10
B,500,10,1,50,50,--
";

    fn ingest(text: &str, options: &IngestOptions) -> Result<Ingestion, IngestError> {
        let aliases = AliasTable::embedded().unwrap();
        ingest_reader(text.as_bytes(), &aliases, options, None)
    }

    #[test]
    fn sample_scenario_matches_expected_totals() {
        let result = ingest(SAMPLE, &IngestOptions::default()).unwrap();
        let report = result.report;
        assert_eq!(report.total_impressions, 1500);
        assert_eq!(report.total_clicks, 110);
        assert_eq!(report.total_conversion_value, 550.0);
        assert_eq!(report.total_cost, 150.0);
        assert!((report.roas - 3.6667).abs() < 1e-4);
        assert_eq!(report.search_impression_share_samples, 1);
        assert_eq!(report.average_search_impression_share, 0.05);
        let pareto = report.pareto.unwrap();
        assert_eq!(pareto.covering_set_size, 1);
    }

    #[test]
    fn near_maximum_revenue_does_not_panic() {
        let mut text = String::from("Item ID,Impr.,Clicks,Conversions,Conv. value,Cost\n");
        for id in ["A", "B", "C", "D"] {
            text.push_str(&format!("{id},10,1,1,50000000000000000000000000000,1\n"));
        }
        let result = ingest(&text, &IngestOptions::default()).unwrap();
        let pareto = result.report.pareto.unwrap();
        assert_eq!(pareto.total_items, 4);
        assert!(pareto.target_reached);
        assert_eq!(pareto.curve.len(), 4);
        assert!(result.report.total_conversion_value.is_finite());
    }

    #[test]
    fn empty_input_is_fatal() {
        assert!(matches!(
            ingest("", &IngestOptions::default()),
            Err(IngestError::EmptyFile)
        ));
    }

    #[test]
    fn numeric_first_row_is_not_a_header() {
        assert!(matches!(
            ingest("1,2,3\n4,5,6\n", &IngestOptions::default()),
            Err(IngestError::MissingHeader)
        ));
    }

    #[test]
    fn missing_required_columns_abort() {
        let err = ingest("Item,Clicks\nA,1\n", &IngestOptions::default()).unwrap_err();
        assert!(matches!(err, IngestError::MissingColumns(ref f) if f.len() == 4));
    }

    #[test]
    fn cancellation_stops_at_chunk_boundary() {
        let flag = Arc::new(AtomicBool::new(true));
        let options = IngestOptions {
            cancel: Some(flag),
            ..IngestOptions::default()
        };
        assert!(matches!(
            ingest(SAMPLE, &options),
            Err(IngestError::Cancelled { rows: 0 })
        ));
    }

    #[test]
    fn preview_keeps_first_rows_only() {
        let options = IngestOptions {
            preview_rows: 1,
            chunk_size: 1,
            ..IngestOptions::default()
        };
        let result = ingest(SAMPLE, &options).unwrap();
        assert_eq!(result.preview.len(), 1);
        assert_eq!(result.preview[0].item_id.as_deref(), Some("A"));
    }

    #[test]
    fn parallel_workers_match_sequential() {
        let mut text = String::from("sku,impressions,clicks,conversions,revenue,spend\n");
        for i in 0..250 {
            text.push_str(&format!(
                "item-{},{},{},{}.5,{}.25,{}.10\n",
                i % 37,
                i * 7,
                i,
                i % 5,
                i,
                i % 11
            ));
        }
        let sequential = ingest(&text, &IngestOptions::default()).unwrap();
        let parallel = ingest(
            &text,
            &IngestOptions {
                chunk_size: 16,
                workers: 4,
                ..IngestOptions::default()
            },
        )
        .unwrap();
        assert_eq!(sequential.report.total_cost, parallel.report.total_cost);
        assert_eq!(
            sequential.report.total_conversion_value,
            parallel.report.total_conversion_value
        );
        assert_eq!(sequential.report.pareto, parallel.report.pareto);
        assert_eq!(
            sequential.report.funnel.clicks_per_conversion.high,
            parallel.report.funnel.clicks_per_conversion.high
        );
    }
}
