//! I/O plumbing: delimiters, encodings, readers and writers.
//!
//! - **Delimiter resolution**: `.tsv` reads as tab, everything else as comma,
//!   unless overridden.
//! - **Encoding**: input cells are decoded with `encoding_rs` (UTF-8 by
//!   default, `windows-1252` as the documented fallback); undecodable bytes are
//!   an [`IngestError::Encoding`], never silently replaced.
//! - **stdin/stdout**: the `-` path convention routes through standard streams.
//! - **Staged output**: dataset exports land in a temporary file (or memory for
//!   stdout) and only reach their destination once the run has succeeded.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use encoding_rs::{Encoding, UTF_8};
use tempfile::NamedTempFile;

use crate::error::IngestError;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';
pub const FALLBACK_ENCODING_LABEL: &str = "windows-1252";

const BYTE_ORDER_MARK: char = '\u{feff}';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding, IngestError> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| IngestError::processing(format!("Unknown encoding '{value}'"))),
        None => Ok(UTF_8),
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn resolve_output_delimiter(path: Option<&Path>, provided: Option<u8>, fallback: u8) -> u8 {
    if let Some(delim) = provided {
        return delim;
    }
    match path.and_then(|p| p.extension()).and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        Some(ext) if ext.eq_ignore_ascii_case("csv") => DEFAULT_CSV_DELIMITER,
        _ => fallback,
    }
}

pub fn open_input(path: &Path) -> Result<Box<dyn Read>, IngestError> {
    if is_dash(path) {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path)
        .map_err(|err| IngestError::processing(format!("Opening input file {path:?}: {err}")))?;
    Ok(Box::new(BufReader::new(file)))
}

pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>, IngestError> {
    match path {
        Some(p) if !is_dash(p) => {
            let file = File::create(p).map_err(|err| {
                IngestError::processing(format!("Creating output file {p:?}: {err}"))
            })?;
            Ok(Box::new(BufWriter::new(file)))
        }
        _ => Ok(Box::new(io::stdout())),
    }
}

/// Output that is discarded on drop unless [`StagedOutput::commit`] is called.
pub enum StagedOutput {
    File {
        temp: BufWriter<NamedTempFile>,
        target: PathBuf,
    },
    Stdout(Vec<u8>),
}

impl StagedOutput {
    pub fn create(path: &Path) -> Result<Self, IngestError> {
        if is_dash(path) {
            return Ok(Self::Stdout(Vec::new()));
        }
        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let temp = NamedTempFile::new_in(dir).map_err(|err| {
            IngestError::processing(format!("Creating temporary output in {dir:?}: {err}"))
        })?;
        Ok(Self::File {
            temp: BufWriter::new(temp),
            target: path.to_path_buf(),
        })
    }

    /// Moves the staged bytes to their destination.
    pub fn commit(self) -> Result<(), IngestError> {
        match self {
            Self::File { temp, target } => {
                let temp = temp.into_inner().map_err(|err| {
                    IngestError::processing(format!("Flushing {target:?}: {}", err.error()))
                })?;
                temp.persist(&target).map_err(|err| {
                    IngestError::processing(format!(
                        "Writing output file {target:?}: {}",
                        err.error
                    ))
                })?;
                Ok(())
            }
            Self::Stdout(buffer) => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(&buffer)?;
                stdout.flush()?;
                Ok(())
            }
        }
    }
}

impl Write for StagedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::File { temp, .. } => temp.write(buf),
            Self::Stdout(buffer) => buffer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::File { temp, .. } => temp.flush(),
            Self::Stdout(_) => Ok(()),
        }
    }
}

/// CSV writer that transcodes its UTF-8 output into `encoding`.
pub fn open_csv_writer<W: Write>(
    inner: W,
    delimiter: u8,
    encoding: &'static Encoding,
) -> csv::Writer<TranscodingWriter<W>> {
    csv::WriterBuilder::new()
        .delimiter(delimiter)
        .double_quote(true)
        .from_writer(TranscodingWriter::new(inner, encoding))
}

/// Re-encodes a UTF-8 byte stream, holding back incomplete trailing sequences
/// until the next write.
pub struct TranscodingWriter<W: Write> {
    inner: W,
    encoding: &'static Encoding,
    pending: Vec<u8>,
}

impl<W: Write> TranscodingWriter<W> {
    pub fn new(inner: W, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            encoding,
            pending: Vec::new(),
        }
    }

    pub fn into_inner(mut self) -> io::Result<W> {
        self.flush()?;
        Ok(self.inner)
    }

    fn drain_pending(&mut self, at_end: bool) -> io::Result<()> {
        let valid_up_to = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(err) if err.error_len().is_some() || at_end => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "Invalid UTF-8 sequence in output stream",
                ));
            }
            Err(err) => err.valid_up_to(),
        };
        if valid_up_to == 0 {
            return Ok(());
        }
        let text = std::str::from_utf8(&self.pending[..valid_up_to])
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let encoded = encode_text(text, self.encoding)?;
        self.inner.write_all(&encoded)?;
        self.pending.drain(..valid_up_to);
        Ok(())
    }
}

impl<W: Write> Write for TranscodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.encoding == UTF_8 && self.pending.is_empty() {
            return self.inner.write(buf);
        }
        self.pending.extend_from_slice(buf);
        self.drain_pending(false)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain_pending(true)?;
        self.inner.flush()
    }
}

/// Reader that yields the header as an ordinary record and tolerates rows of
/// the wrong width, so callers decide what a malformed row means.
pub fn open_csv_reader<R: Read>(reader: R, delimiter: u8) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .from_reader(reader)
}

pub fn decode_field(
    bytes: &[u8],
    encoding: &'static Encoding,
    line: usize,
) -> Result<String, IngestError> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
        .ok_or(IngestError::Encoding {
            encoding: encoding.name(),
            row: line,
        })
}

pub fn decode_record(
    record: &csv::ByteRecord,
    encoding: &'static Encoding,
    line: usize,
) -> Result<Vec<String>, IngestError> {
    record
        .iter()
        .map(|field| decode_field(field, encoding, line))
        .collect()
}

/// Decodes the header row, dropping a leading byte-order mark.
pub fn decode_headers(
    record: &csv::ByteRecord,
    encoding: &'static Encoding,
) -> Result<Vec<String>, IngestError> {
    let mut headers = decode_record(record, encoding, 1)?;
    if let Some(first) = headers.first_mut()
        && first.starts_with(BYTE_ORDER_MARK)
    {
        *first = first.trim_start_matches(BYTE_ORDER_MARK).to_string();
    }
    Ok(headers)
}

/// Encodes UTF-8 text for output, failing on unmappable characters.
pub fn encode_text(text: &str, encoding: &'static Encoding) -> io::Result<Vec<u8>> {
    if encoding == UTF_8 {
        return Ok(text.as_bytes().to_vec());
    }
    let (encoded, _, had_errors) = encoding.encode(text);
    if had_errors {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to encode text using {}", encoding.name()),
        ));
    }
    Ok(encoded.into_owned())
}
