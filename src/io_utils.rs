//! Shared I/O helpers for CSV reading, writing, and file bookkeeping.
//!
//! - **stdin/stdout**: the `-` path convention routes through standard streams.
//! - **Reader/writer construction**: `open_csv_reader` and `open_csv_writer`
//!   centralise the `csv` builder settings used by the engine and normalizer.
//! - **Record counting**: reject sinks are judged by their record count.

use std::{
    fs::{self, File},
    io::{self, BufReader, Read, Write},
    path::Path,
};

use csv::QuoteStyle;

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

/// Header-agnostic, flexible reader: field-count checks belong to the caller.
pub fn open_csv_reader<R>(reader: R, delimiter: u8, quoting: bool) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .delimiter(delimiter)
        .quoting(quoting)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_writer<W>(writer: W, delimiter: u8) -> csv::Writer<W>
where
    W: Write,
{
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    builder.from_writer(writer)
}

/// Counts CSV records in a comma-separated file, header included. Quoted
/// fields may span lines, so this is not a line count.
pub fn count_records(path: &Path) -> io::Result<usize> {
    let mut reader = open_csv_reader(BufReader::new(File::open(path)?), b',', true);
    let mut record = csv::ByteRecord::new();
    let mut count = 0usize;
    while reader
        .read_byte_record(&mut record)
        .map_err(io::Error::other)?
    {
        count += 1;
    }
    Ok(count)
}

pub fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|meta| meta.len())
}

/// Removes `path`, treating an already-missing file as success.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

pub fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

pub fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn count_records_follows_quoted_newlines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.csv");
        fs::write(&path, "a,b\n\"x\ny\",3\n5,6").unwrap();
        assert_eq!(count_records(&path).unwrap(), 3);
        fs::write(&path, "header\n").unwrap();
        assert_eq!(count_records(&path).unwrap(), 1);
        fs::write(&path, "").unwrap();
        assert_eq!(count_records(&path).unwrap(), 0);
    }

    #[test]
    fn remove_if_exists_ignores_missing_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.csv");
        assert!(!remove_if_exists(&path).unwrap());
        fs::write(&path, "x").unwrap();
        assert!(remove_if_exists(&path).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn human_size_scales_units() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
    }

    #[test]
    fn writer_quotes_only_when_needed() {
        let mut writer = open_csv_writer(Vec::new(), b';');
        writer.write_record(["plain", "has;delim"]).unwrap();
        let bytes = writer.into_inner().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "plain;\"has;delim\"\n");
    }
}
