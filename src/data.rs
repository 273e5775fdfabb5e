use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use crate::schema::ColumnType;

const BOOLEAN_TOKENS: &[&str] = &["true", "false", "t", "f", "yes", "no", "y", "n"];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m/%d/%Y", "%d-%m-%Y", "%d.%m.%Y"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// First format in `formats` that `parse` accepts.
fn parse_first<T>(
    value: &str,
    formats: &[&str],
    kind: &str,
    parse: impl Fn(&str, &str) -> chrono::ParseResult<T>,
) -> Result<T> {
    formats
        .iter()
        .find_map(|fmt| parse(value, fmt).ok())
        .ok_or_else(|| anyhow!("'{value}' is not a recognised {kind}"))
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    parse_first(value, DATE_FORMATS, "date", NaiveDate::parse_from_str)
}

/// Datetimes with optional fractional seconds; `T` or space separated.
pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    parse_first(value, DATETIME_FORMATS, "datetime", NaiveDateTime::parse_from_str)
}

pub fn is_boolean(value: &str) -> bool {
    let lowered = value.to_ascii_lowercase();
    BOOLEAN_TOKENS.contains(&lowered.as_str())
}

/// Integers with a leading zero (`007`) are identifiers, not numbers.
pub fn is_integer(value: &str) -> bool {
    let digits = value.strip_prefix(['-', '+']).unwrap_or(value);
    if digits.len() > 1 && digits.starts_with('0') {
        return false;
    }
    value.parse::<i64>().is_ok()
}

pub fn is_float(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_digit())
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        && value.parse::<f64>().is_ok()
}

pub fn is_guid(value: &str) -> bool {
    let trimmed = value.trim_matches(|c| matches!(c, '{' | '}'));
    trimmed.len() >= 32 && Uuid::parse_str(trimmed).is_ok()
}

/// Whether a non-empty `value` casts to `ty`. Empty values are nulls and
/// always conform.
pub fn value_conforms(value: &str, ty: ColumnType) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return true;
    }
    match ty {
        ColumnType::String => true,
        ColumnType::Boolean => is_boolean(trimmed),
        ColumnType::Integer => is_integer(trimmed),
        ColumnType::Float => is_float(trimmed),
        ColumnType::Date => parse_naive_date(trimmed).is_ok(),
        ColumnType::DateTime => parse_naive_datetime(trimmed).is_ok(),
        ColumnType::Guid => is_guid(trimmed),
    }
}
