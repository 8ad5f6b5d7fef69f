//! Re-export of the coerced dataset and the preview table.

use std::io::Write;

use encoding_rs::Encoding;
use itertools::Itertools;
use log::info;

use crate::{
    error::IngestError,
    io_utils::{self, TranscodingWriter},
    pipeline::RecordSink,
    record::{CanonicalRecord, EXPORT_FIELDS},
};

/// Streams canonical records as delimited text in the requested encoding.
pub struct CsvExporter<W: Write> {
    writer: csv::Writer<TranscodingWriter<W>>,
    encoding: &'static Encoding,
    rows: u64,
}

impl<W: Write> CsvExporter<W> {
    pub fn new(output: W, delimiter: u8, encoding: &'static Encoding) -> Result<Self, IngestError> {
        let mut writer = io_utils::open_csv_writer(output, delimiter, encoding);
        writer.write_record(export_headers())?;
        Ok(Self {
            writer,
            encoding,
            rows: 0,
        })
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Flushes buffered rows and hands back the underlying output.
    pub fn into_inner(self) -> Result<W, IngestError> {
        let transcoder = self.writer.into_inner().map_err(|err| {
            IngestError::processing(format!("Flushing exported rows: {}", err.error()))
        })?;
        Ok(transcoder.into_inner()?)
    }
}

impl<W: Write> RecordSink for CsvExporter<W> {
    fn accept(&mut self, record: &CanonicalRecord) -> Result<(), IngestError> {
        self.writer.write_record(record.export_cells())?;
        self.rows += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), IngestError> {
        self.writer.flush()?;
        info!("Exported {} row(s) as {}", self.rows, self.encoding.name());
        Ok(())
    }
}

pub fn export_headers() -> Vec<String> {
    EXPORT_FIELDS
        .iter()
        .map(|field| field.as_str().to_string())
        .collect()
}

/// Header and rows for rendering preview records as a table.
pub fn preview_rows(records: &[CanonicalRecord]) -> (Vec<String>, Vec<Vec<String>>) {
    let rows = records.iter().map(CanonicalRecord::export_cells).collect_vec();
    (export_headers(), rows)
}
