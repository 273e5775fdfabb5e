//! Final rewrite of validated rows: output delimiter and column names.

use std::{
    collections::HashSet,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use csv::ByteRecord;
use heck::ToSnakeCase;
use log::{debug, info};

use crate::{config::OutputTarget, error::NormalizeError, io_utils};

const FALLBACK_COLUMN_NAME: &str = "column";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub rows: usize,
    pub columns: usize,
    pub renamed: usize,
}

/// Canonical snake_case identifier for a header cell.
///
/// Accented Latin letters are transliterated first so `Café` becomes `cafe`
/// rather than losing the letter. The result is never empty and is a fixed
/// point: normalizing it again returns it unchanged.
pub fn normalize_column_name(name: &str) -> String {
    let mut ascii_folded = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            'ß' => ascii_folded.push_str("ss"),
            'æ' => ascii_folded.push_str("ae"),
            'Æ' => ascii_folded.push_str("AE"),
            other => ascii_folded.push(transliterate(other)),
        }
    }
    let snake = ascii_folded.to_snake_case();

    let mut normalized = String::with_capacity(snake.len());
    for ch in snake.chars() {
        if ch.is_alphanumeric() {
            normalized.extend(ch.to_lowercase());
        } else if !normalized.is_empty() && !normalized.ends_with('_') {
            normalized.push('_');
        }
    }
    let trimmed = normalized.trim_end_matches('_');
    if trimmed.is_empty() {
        FALLBACK_COLUMN_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Normalizes every header and suffixes repeats with `_2`, `_3`, ...
pub fn normalize_headers<S: AsRef<str>>(headers: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    headers
        .iter()
        .map(|header| {
            let base = normalize_column_name(header.as_ref());
            let mut candidate = base.clone();
            let mut suffix = 2usize;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{base}_{suffix}");
                suffix += 1;
            }
            candidate
        })
        .collect()
}

/// Rewrites the engine's comma-separated staging file to `writer` using
/// `delimiter`, renaming headers when `normalize_names` is set.
pub fn normalize_csv<W: Write>(
    staged: &Path,
    writer: W,
    delimiter: u8,
    normalize_names: bool,
) -> Result<NormalizeStats, NormalizeError> {
    let mut reader =
        io_utils::open_csv_reader(BufReader::new(File::open(staged)?), b',', true);
    let mut writer = io_utils::open_csv_writer(writer, delimiter);
    let mut stats = NormalizeStats::default();

    let mut record = ByteRecord::new();
    if !reader.read_byte_record(&mut record).map_err(csv_error)? {
        writer.flush()?;
        return Ok(stats);
    }

    let headers: Vec<String> = record
        .iter()
        .map(|field| String::from_utf8_lossy(field).into_owned())
        .collect();
    stats.columns = headers.len();
    if normalize_names {
        let renamed = normalize_headers(&headers);
        stats.renamed = headers
            .iter()
            .zip(&renamed)
            .filter(|(before, after)| before != after)
            .count();
        debug!("Renamed {} of {} column(s)", stats.renamed, stats.columns);
        writer.write_record(&renamed).map_err(csv_error)?;
    } else {
        writer.write_record(&headers).map_err(csv_error)?;
    }

    while reader.read_byte_record(&mut record).map_err(csv_error)? {
        writer.write_byte_record(&record).map_err(csv_error)?;
        stats.rows += 1;
    }
    writer.flush()?;
    info!(
        "Wrote {} row(s) with delimiter '{}'",
        stats.rows,
        io_utils::printable_delimiter(delimiter)
    );
    Ok(stats)
}

/// Fails with `OutputExists` when a file target is present and `force` is off.
pub fn ensure_output_available(target: &OutputTarget, force: bool) -> Result<(), NormalizeError> {
    match target {
        OutputTarget::File(path) if path.exists() && !force => {
            Err(NormalizeError::OutputExists(path.clone()))
        }
        _ => Ok(()),
    }
}

/// Opens the output sink. Stdout targets write through `stdout`.
pub fn open_output<'a>(
    target: &OutputTarget,
    force: bool,
    stdout: &'a mut dyn Write,
) -> Result<Box<dyn Write + 'a>, NormalizeError> {
    ensure_output_available(target, force)?;
    match target {
        OutputTarget::File(path) => Ok(Box::new(BufWriter::new(File::create(path)?))),
        OutputTarget::Stdout => Ok(Box::new(stdout)),
    }
}

fn csv_error(err: csv::Error) -> NormalizeError {
    match err.into_kind() {
        csv::ErrorKind::Io(err) => NormalizeError::Io(err),
        other => NormalizeError::Io(std::io::Error::other(format!("{other:?}"))),
    }
}

fn transliterate(ch: char) -> char {
    match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ą' => 'a',
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ą' => 'A',
        'ç' | 'ć' | 'č' => 'c',
        'Ç' | 'Ć' | 'Č' => 'C',
        'ď' | 'đ' => 'd',
        'Ď' | 'Đ' => 'D',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => 'e',
        'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ę' | 'Ě' => 'E',
        'ì' | 'í' | 'î' | 'ï' | 'ī' => 'i',
        'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' => 'I',
        'ł' => 'l',
        'Ł' => 'L',
        'ñ' | 'ń' | 'ň' => 'n',
        'Ñ' | 'Ń' | 'Ň' => 'N',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => 'o',
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ő' => 'O',
        'ř' => 'r',
        'Ř' => 'R',
        'ś' | 'š' | 'ş' => 's',
        'Ś' | 'Š' | 'Ş' => 'S',
        'ť' | 'ţ' => 't',
        'Ť' | 'Ţ' => 'T',
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => 'u',
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' | 'Ű' => 'U',
        'ý' | 'ÿ' => 'y',
        'Ý' | 'Ÿ' => 'Y',
        'ź' | 'ż' | 'ž' => 'z',
        'Ź' | 'Ż' | 'Ž' => 'Z',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn column_names_become_snake_case() {
        assert_eq!(normalize_column_name("Column Name"), "column_name");
        assert_eq!(normalize_column_name("  multi   space "), "multi_space");
        assert_eq!(normalize_column_name("customerID"), "customer_id");
        assert_eq!(normalize_column_name("Prénom"), "prenom");
        assert_eq!(normalize_column_name("Straße"), "strasse");
        assert_eq!(normalize_column_name("unit-price ($)"), "unit_price");
        assert_eq!(normalize_column_name("???"), "column");
        assert_eq!(normalize_column_name(""), "column");
    }

    #[test]
    fn duplicate_headers_get_suffixes() {
        let headers = normalize_headers(&["Name", "name", "NAME", "name_2"]);
        assert_eq!(headers, vec!["name", "name_2", "name_3", "name_2_2"]);
    }

    #[test]
    fn normalize_csv_rewrites_delimiter_and_names() {
        let dir = tempdir().unwrap();
        let staged = dir.path().join("staged.csv");
        fs::write(&staged, "First Name,Total Amount\nAlice,\"1,5\"\nBob,2\n").unwrap();

        let mut out = Vec::new();
        let stats = normalize_csv(&staged, &mut out, b';', true).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "first_name;total_amount\nAlice;1,5\nBob;2\n"
        );
        assert_eq!(
            stats,
            NormalizeStats {
                rows: 2,
                columns: 2,
                renamed: 2
            }
        );
    }

    #[test]
    fn keep_names_preserves_headers() {
        let dir = tempdir().unwrap();
        let staged = dir.path().join("staged.csv");
        fs::write(&staged, "First Name,x\n1,2\n").unwrap();
        let mut out = Vec::new();
        normalize_csv(&staged, &mut out, b',', false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "First Name,x\n1,2\n");
    }

    #[test]
    fn existing_output_requires_force() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "old").unwrap();
        let target = OutputTarget::File(path.clone());
        let mut sink = Vec::new();
        assert!(matches!(
            open_output(&target, false, &mut sink),
            Err(NormalizeError::OutputExists(_))
        ));
        assert!(ensure_output_available(&OutputTarget::Stdout, false).is_ok());
        drop(open_output(&target, true, &mut sink).unwrap());
        assert_eq!(fs::read_to_string(path).unwrap(), "");
    }
}
