//! The data engine consumed by the validation driver.
//!
//! The pipeline only sees the [`DataEngine`] trait: parse a CSV source with
//! schema inference, write conforming rows to one file and rejected rows
//! (with reasons) to another, and report row/column counts. Failures arrive
//! as a single [`EngineError`] carrying a message string.
//!
//! [`CsvEngine`] is the built-in implementation. It reads local files, gzip
//! archives, and HTTP(S) URLs, sniffs the input delimiter, infers column
//! types from a bounded sample, and routes each row to the output or the
//! reject sink.

use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, BufWriter, Cursor, Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use csv::ByteRecord;
use flate2::read::GzDecoder;
use itertools::Itertools;
use log::{debug, info, warn};
use thiserror::Error;

use crate::{io_utils, schema::InferredSchema};

pub const DEFAULT_SAMPLE_ROWS: usize = 2000;
pub const HTTP_TIMEOUT_SECS: u64 = 30;
const SNIFF_BYTES: usize = 64 * 1024;
const SNIFF_LINES: usize = 10;
const DELIMITER_CANDIDATES: &[u8] = &[b',', b';', b'\t', b'|'];

pub const REJECT_HEADERS: &[&str] = &[
    "line",
    "column_idx",
    "column_name",
    "error_type",
    "csv_line",
    "error_message",
];
pub const ERROR_TYPE_COLUMN: &str = "error_type";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        EngineError::new(format!("IO Error: {err}"))
    }
}

impl From<csv::Error> for EngineError {
    fn from(err: csv::Error) -> Self {
        EngineError::new(format!("CSV Error: {err}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    Gzip,
    Zip,
}

impl CompressionKind {
    pub fn from_path(path: &str) -> Option<Self> {
        let lowered = path.to_ascii_lowercase();
        if lowered.ends_with(".gz") || lowered.ends_with(".gzip") {
            Some(CompressionKind::Gzip)
        } else if lowered.ends_with(".zip") {
            Some(CompressionKind::Zip)
        } else {
            None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CompressionKind::Gzip => "gzip",
            CompressionKind::Zip => "zip",
        }
    }
}

/// What the engine is asked to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkingSource {
    Local(PathBuf),
    Remote(String),
    Compressed { path: PathBuf, kind: CompressionKind },
}

impl WorkingSource {
    pub fn is_remote(&self) -> bool {
        matches!(self, WorkingSource::Remote(_))
    }

    pub fn describe(&self) -> String {
        match self {
            WorkingSource::Local(path) | WorkingSource::Compressed { path, .. } => {
                path.display().to_string()
            }
            WorkingSource::Remote(url) => url.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Raw lines skipped before the header row.
    pub skip_rows: usize,
    pub sample_rows: usize,
    /// Input delimiter; sniffed from the first lines when `None`.
    pub delimiter: Option<u8>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            skip_rows: 0,
            sample_rows: DEFAULT_SAMPLE_ROWS,
            delimiter: None,
        }
    }
}

/// Set when the engine abandoned its strict parse on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackConfig {
    pub strict_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineReport {
    pub conforming_rows: usize,
    pub rejected_rows: usize,
    pub columns: usize,
    pub fallback: Option<FallbackConfig>,
}

pub trait DataEngine {
    /// Parses `source`, writing conforming rows as comma-separated UTF-8 to
    /// `output` and one annotated row per rejected input row to `reject`.
    fn validate(
        &self,
        source: &WorkingSource,
        options: &ReadOptions,
        output: &Path,
        reject: &Path,
    ) -> Result<EngineReport, EngineError>;

    /// Data rows (header excluded) in a comma-separated file.
    fn row_count(&self, path: &Path) -> Result<usize, EngineError>;

    fn column_count(&self, path: &Path) -> Result<usize, EngineError>;
}

#[derive(Debug, Clone)]
pub struct CsvEngine {
    http_timeout: Duration,
}

impl Default for CsvEngine {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
        }
    }
}

enum SourceBytes {
    File(PathBuf),
    Memory(Vec<u8>),
}

impl SourceBytes {
    fn reader(&self) -> Result<Box<dyn Read + '_>, EngineError> {
        Ok(match self {
            SourceBytes::File(path) => Box::new(File::open(path)?),
            SourceBytes::Memory(bytes) => Box::new(Cursor::new(bytes.as_slice())),
        })
    }

    fn prefix(&self) -> Result<Vec<u8>, EngineError> {
        let mut prefix = Vec::new();
        self.reader()?
            .take(SNIFF_BYTES as u64)
            .read_to_end(&mut prefix)?;
        Ok(prefix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PassSummary {
    conforming: usize,
    rejected: usize,
    columns: usize,
}

struct PendingRow {
    line: u64,
    fields: Option<Vec<String>>,
    raw: String,
}

impl CsvEngine {
    pub fn new(http_timeout: Duration) -> Self {
        Self { http_timeout }
    }

    fn load(&self, source: &WorkingSource) -> Result<SourceBytes, EngineError> {
        match source {
            WorkingSource::Local(path) => {
                if !path.is_file() {
                    return Err(EngineError::new(format!(
                        "IO Error: No files found that match the pattern \"{}\"",
                        path.display()
                    )));
                }
                Ok(SourceBytes::File(path.clone()))
            }
            WorkingSource::Compressed {
                path,
                kind: CompressionKind::Gzip,
            } => {
                let file = File::open(path)?;
                Ok(SourceBytes::Memory(gunzip(file)?))
            }
            WorkingSource::Compressed {
                kind: CompressionKind::Zip,
                path,
            } => Err(EngineError::new(format!(
                "Extension \"zipfs\" not found: cannot open zip archive \"{}\"",
                path.display()
            ))),
            WorkingSource::Remote(url) => {
                let bytes = self.fetch(url)?;
                let path_part = url.split(['?', '#']).next().unwrap_or(url);
                if CompressionKind::from_path(path_part) == Some(CompressionKind::Gzip) {
                    Ok(SourceBytes::Memory(gunzip(Cursor::new(bytes))?))
                } else {
                    Ok(SourceBytes::Memory(bytes))
                }
            }
        }
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, EngineError> {
        info!("Fetching remote CSV from {url}");
        let client = reqwest::blocking::Client::builder()
            .timeout(self.http_timeout)
            .build()
            .map_err(|err| EngineError::new(format!("HTTP client error: {err}")))?;
        let response = client.get(url).send().map_err(|err| {
            if err.is_timeout() {
                EngineError::new(format!("HTTP timeout: request to {url} timed out"))
            } else {
                EngineError::new(format!("HTTP Error: {err}"))
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::new(format!(
                "HTTP Error {} {}: {url}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }
        let bytes = response.bytes().map_err(|err| {
            if err.is_timeout() {
                EngineError::new(format!("HTTP timeout: reading {url} timed out"))
            } else {
                EngineError::new(format!("HTTP Error: {err}"))
            }
        })?;
        debug!("Fetched {} byte(s) from {url}", bytes.len());
        Ok(bytes.to_vec())
    }

    fn run_pass<W: Write>(
        &self,
        bytes: &SourceBytes,
        options: &ReadOptions,
        delimiter: u8,
        quoting: bool,
        output: W,
        reject: W,
    ) -> Result<PassSummary, EngineError> {
        let mut input = BufReader::new(bytes.reader()?);
        let mut discarded = Vec::new();
        for _ in 0..options.skip_rows {
            discarded.clear();
            if input.read_until(b'\n', &mut discarded)? == 0 {
                break;
            }
        }

        let mut reader = io_utils::open_csv_reader(input, delimiter, quoting);
        let mut output = io_utils::open_csv_writer(output, b',');
        let mut reject = io_utils::open_csv_writer(reject, b',');
        reject.write_record(REJECT_HEADERS)?;

        let mut record = ByteRecord::new();
        if !reader.read_byte_record(&mut record)? {
            return Err(EngineError::new(
                "Invalid Input Error: CSV file is empty or has no header row",
            ));
        }
        let headers = decode_headers(&record)?;
        output.write_record(&headers)?;

        let line_offset = options.skip_rows as u64;
        let mut sample = Vec::new();
        let mut exhausted = false;
        while sample.len() < options.sample_rows.max(1) {
            if !reader.read_byte_record(&mut record)? {
                exhausted = true;
                break;
            }
            sample.push(pending_row(&record, delimiter, line_offset));
        }

        let decoded_sample: Vec<Vec<String>> =
            sample.iter().filter_map(|row| row.fields.clone()).collect();
        let schema = InferredSchema::infer(&headers, &decoded_sample);
        debug!(
            "Inferred column types: {}",
            schema
                .columns
                .iter()
                .map(|c| format!("{}={}", c.name, c.datatype))
                .join(", ")
        );

        let mut summary = PassSummary {
            conforming: 0,
            rejected: 0,
            columns: schema.width(),
        };
        for row in sample {
            route_row(&schema, row, &mut output, &mut reject, &mut summary)?;
        }
        if !exhausted {
            while reader.read_byte_record(&mut record)? {
                let row = pending_row(&record, delimiter, line_offset);
                route_row(&schema, row, &mut output, &mut reject, &mut summary)?;
            }
        }

        output.flush()?;
        reject.flush()?;
        Ok(summary)
    }
}

impl DataEngine for CsvEngine {
    fn validate(
        &self,
        source: &WorkingSource,
        options: &ReadOptions,
        output: &Path,
        reject: &Path,
    ) -> Result<EngineReport, EngineError> {
        let bytes = self.load(source)?;
        let delimiter = match options.delimiter {
            Some(delimiter) => delimiter,
            None => sniff_delimiter(&bytes.prefix()?, options.skip_rows),
        };
        debug!(
            "Reading {} with delimiter '{}'",
            source.describe(),
            io_utils::printable_delimiter(delimiter)
        );

        let strict = self.run_pass(
            &bytes,
            options,
            delimiter,
            true,
            BufWriter::new(File::create(output)?),
            BufWriter::new(File::create(reject)?),
        )?;
        let mut summary = strict;
        let mut fallback = None;

        if strict.rejected > strict.conforming {
            let mut relaxed_output = Vec::new();
            let mut relaxed_reject = Vec::new();
            let relaxed = self.run_pass(
                &bytes,
                options,
                delimiter,
                false,
                &mut relaxed_output,
                &mut relaxed_reject,
            )?;
            if relaxed.rejected < strict.rejected {
                warn!(
                    "Strict parse rejected {} of {} row(s); retried without quote handling",
                    strict.rejected,
                    strict.rejected + strict.conforming
                );
                fs::write(output, &relaxed_output)?;
                fs::write(reject, &relaxed_reject)?;
                summary = relaxed;
                fallback = Some(FallbackConfig { strict_mode: false });
            }
        }

        Ok(EngineReport {
            conforming_rows: summary.conforming,
            rejected_rows: summary.rejected,
            columns: summary.columns,
            fallback,
        })
    }

    fn row_count(&self, path: &Path) -> Result<usize, EngineError> {
        let mut reader = io_utils::open_csv_reader(BufReader::new(File::open(path)?), b',', true);
        let mut record = ByteRecord::new();
        let mut rows = 0usize;
        while reader.read_byte_record(&mut record)? {
            rows += 1;
        }
        Ok(rows.saturating_sub(1))
    }

    fn column_count(&self, path: &Path) -> Result<usize, EngineError> {
        let mut reader = io_utils::open_csv_reader(BufReader::new(File::open(path)?), b',', true);
        let mut record = ByteRecord::new();
        if reader.read_byte_record(&mut record)? {
            Ok(record.len())
        } else {
            Ok(0)
        }
    }
}

fn gunzip<R: Read>(reader: R) -> Result<Vec<u8>, EngineError> {
    let mut decoded = Vec::new();
    GzDecoder::new(reader)
        .read_to_end(&mut decoded)
        .map_err(|err| EngineError::new(format!("IO Error: gzip decompression failed: {err}")))?;
    Ok(decoded)
}

fn decode_headers(record: &ByteRecord) -> Result<Vec<String>, EngineError> {
    record
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            let name = std::str::from_utf8(field).map_err(|_| {
                EngineError::new(
                    "Invalid unicode (byte sequence mismatch) detected in CSV header",
                )
            })?;
            let name = name.trim();
            Ok(if name.is_empty() {
                format!("column{idx}")
            } else {
                name.to_string()
            })
        })
        .collect()
}

fn pending_row(record: &ByteRecord, delimiter: u8, line_offset: u64) -> PendingRow {
    let line = record.position().map(|pos| pos.line()).unwrap_or(0) + line_offset;
    let raw = record
        .iter()
        .map(String::from_utf8_lossy)
        .join(&(delimiter as char).to_string());
    let fields = record
        .iter()
        .map(|field| std::str::from_utf8(field).map(str::to_string))
        .collect::<Result<Vec<_>, _>>()
        .ok();
    PendingRow { line, fields, raw }
}

fn route_row<W: Write>(
    schema: &InferredSchema,
    row: PendingRow,
    output: &mut csv::Writer<W>,
    reject: &mut csv::Writer<W>,
    summary: &mut PassSummary,
) -> Result<(), EngineError> {
    let width = schema.width();
    let rejection = match &row.fields {
        None => Some((
            String::new(),
            String::new(),
            "INVALID_UNICODE",
            "Invalid unicode (byte sequence mismatch) detected".to_string(),
        )),
        Some(fields) if fields.len() < width => Some((
            (fields.len() + 1).to_string(),
            schema.columns[fields.len()].name.clone(),
            "MISSING_COLUMNS",
            format!(
                "Expected Number of Columns: {width} Found: {}",
                fields.len()
            ),
        )),
        Some(fields) if fields.len() > width => Some((
            (width + 1).to_string(),
            String::new(),
            "TOO_MANY_COLUMNS",
            format!(
                "Expected Number of Columns: {width} Found: {}",
                fields.len()
            ),
        )),
        Some(fields) => schema.first_cast_failure(fields).map(|idx| {
            let column = &schema.columns[idx];
            (
                (idx + 1).to_string(),
                column.name.clone(),
                "CAST",
                format!(
                    "Error when converting column \"{}\". Could not convert string \"{}\" to '{}'",
                    column.name, fields[idx], column.datatype
                ),
            )
        }),
    };

    match (rejection, row.fields) {
        (Some((column_idx, column_name, error_type, message)), _) => {
            reject.write_record([
                row.line.to_string(),
                column_idx,
                column_name,
                error_type.to_string(),
                row.raw,
                message,
            ])?;
            summary.rejected += 1;
        }
        (None, Some(fields)) => {
            output.write_record(&fields)?;
            summary.conforming += 1;
        }
        (None, None) => unreachable!("undecodable rows are always rejected"),
    }
    Ok(())
}

/// Picks the candidate that splits the first lines into a constant, largest
/// number of fields. Falls back to a comma.
pub fn sniff_delimiter(prefix: &[u8], skip_rows: usize) -> u8 {
    let text = String::from_utf8_lossy(prefix);
    let mut lines: Vec<&str> = text
        .lines()
        .skip(skip_rows)
        .filter(|line| !line.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();
    // The last line of a truncated prefix may be partial.
    if prefix.len() >= SNIFF_BYTES && lines.len() > 1 {
        lines.pop();
    }

    let mut best = (b',', 0usize);
    for &candidate in DELIMITER_CANDIDATES {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| count_unquoted(line, candidate))
            .collect();
        let Some(&first) = counts.first() else {
            continue;
        };
        if first > best.1 && counts.iter().all(|&count| count == first) {
            best = (candidate, first);
        }
    }
    best.0
}

fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0usize;
    for byte in line.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
        } else if byte == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn validate_text(text: &str, options: &ReadOptions) -> (EngineReport, String, String) {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.csv");
        let reject = dir.path().join("reject.csv");
        fs::write(&input, text).unwrap();
        let report = CsvEngine::default()
            .validate(&WorkingSource::Local(input), options, &output, &reject)
            .unwrap();
        (
            report,
            fs::read_to_string(output).unwrap(),
            fs::read_to_string(reject).unwrap(),
        )
    }

    #[test]
    fn conforming_rows_pass_through() {
        let (report, output, reject) =
            validate_text("name,age\nAlice,30\nBob,25\n", &ReadOptions::default());
        assert_eq!(report.conforming_rows, 2);
        assert_eq!(report.rejected_rows, 0);
        assert_eq!(report.columns, 2);
        assert_eq!(report.fallback, None);
        assert_eq!(output, "name,age\nAlice,30\nBob,25\n");
        assert_eq!(reject.lines().count(), 1);
    }

    #[test]
    fn wrong_width_rows_are_rejected_with_reasons() {
        let (report, output, reject) = validate_text(
            "a,b,c\n1,2,3\n4,5\n6,7,8,9\n10,11,12\n",
            &ReadOptions::default(),
        );
        assert_eq!(report.conforming_rows, 2);
        assert_eq!(report.rejected_rows, 2);
        assert_eq!(output, "a,b,c\n1,2,3\n10,11,12\n");
        let lines: Vec<_> = reject.lines().collect();
        assert_eq!(lines[0], REJECT_HEADERS.join(","));
        assert!(lines[1].starts_with("3,3,c,MISSING_COLUMNS,"), "{}", lines[1]);
        assert!(lines[2].starts_with("4,4,,TOO_MANY_COLUMNS,"), "{}", lines[2]);
    }

    #[test]
    fn cast_failures_are_rejected() {
        let mut text = String::from("id,score\n");
        for idx in 1..=10 {
            text.push_str(&format!("{idx},{}\n", idx * 10));
        }
        text.push_str("11,lots\n");
        let (report, _, reject) = validate_text(
            &text,
            &ReadOptions {
                sample_rows: 10,
                ..ReadOptions::default()
            },
        );
        assert_eq!(report.rejected_rows, 1);
        assert!(reject.contains("CAST"));
        assert!(reject.contains("BIGINT"));
    }

    #[test]
    fn skip_rows_and_semicolons_are_honoured() {
        let (report, output, _) = validate_text(
            "exported by tool\nname;city\nAlice;Paris\n",
            &ReadOptions {
                skip_rows: 1,
                ..ReadOptions::default()
            },
        );
        assert_eq!(report.conforming_rows, 1);
        assert_eq!(output, "name,city\nAlice,Paris\n");
    }

    #[test]
    fn unbalanced_quote_falls_back_to_relaxed_parse() {
        let (report, output, reject) = validate_text(
            "a,b,c\n1,\"oops,2\n3,4,5\n6,7,8\n",
            &ReadOptions::default(),
        );
        assert_eq!(report.fallback, Some(FallbackConfig { strict_mode: false }));
        assert_eq!(report.conforming_rows, 3);
        assert_eq!(report.rejected_rows, 0);
        assert!(output.contains("6,7,8"));
        assert_eq!(reject.lines().count(), 1);
    }

    #[test]
    fn empty_input_is_an_engine_error() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("empty.csv");
        fs::write(&input, "").unwrap();
        let err = CsvEngine::default()
            .validate(
                &WorkingSource::Local(input),
                &ReadOptions::default(),
                &dir.path().join("o.csv"),
                &dir.path().join("r.csv"),
            )
            .unwrap_err();
        assert!(err.message.contains("empty"));
    }

    #[test]
    fn zip_archives_report_missing_zipfs() {
        let dir = tempdir().unwrap();
        let err = CsvEngine::default()
            .validate(
                &WorkingSource::Compressed {
                    path: dir.path().join("data.csv.zip"),
                    kind: CompressionKind::Zip,
                },
                &ReadOptions::default(),
                &dir.path().join("o.csv"),
                &dir.path().join("r.csv"),
            )
            .unwrap_err();
        assert!(err.message.contains("zipfs"));
    }

    #[test]
    fn gzip_sources_are_decompressed() {
        use flate2::{Compression, write::GzEncoder};

        let dir = tempdir().unwrap();
        let input = dir.path().join("data.csv.gz");
        let mut encoder = GzEncoder::new(File::create(&input).unwrap(), Compression::default());
        encoder.write_all(b"x,y\n1,2\n").unwrap();
        encoder.finish().unwrap();

        let output = dir.path().join("o.csv");
        let report = CsvEngine::default()
            .validate(
                &WorkingSource::Compressed {
                    path: input,
                    kind: CompressionKind::Gzip,
                },
                &ReadOptions::default(),
                &output,
                &dir.path().join("r.csv"),
            )
            .unwrap();
        assert_eq!(report.conforming_rows, 1);
        let engine = CsvEngine::default();
        assert_eq!(engine.row_count(&output).unwrap(), 1);
        assert_eq!(engine.column_count(&output).unwrap(), 2);
    }

    #[test]
    fn sniff_delimiter_prefers_consistent_candidates() {
        assert_eq!(sniff_delimiter(b"a;b;c\n1;2;3\n", 0), b';');
        assert_eq!(sniff_delimiter(b"a\tb\n1\t2\n", 0), b'\t');
        assert_eq!(sniff_delimiter(b"\"x,y\";z\n\"1,2\";3\n", 0), b';');
        assert_eq!(sniff_delimiter(b"single\nvalue\n", 0), b',');
    }

    #[test]
    fn compression_kind_from_suffix() {
        assert_eq!(
            CompressionKind::from_path("data.CSV.GZ"),
            Some(CompressionKind::Gzip)
        );
        assert_eq!(
            CompressionKind::from_path("data.zip"),
            Some(CompressionKind::Zip)
        );
        assert_eq!(CompressionKind::from_path("data.csv"), None);
    }
}
