//! Column type inference for the built-in engine.
//!
//! Each column accumulates per-type match counts over a bounded sample. A
//! type wins only when every non-empty sampled value parses as that type,
//! checked from most to least specific. Everything else is `String`, which
//! accepts any value, so a sampled row never fails its own column's cast.

use std::fmt;

use crate::data::{
    is_boolean, is_float, is_guid, is_integer, parse_naive_date, parse_naive_datetime,
    value_conforms,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Guid,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "VARCHAR",
            ColumnType::Integer => "BIGINT",
            ColumnType::Float => "DOUBLE",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::DateTime => "TIMESTAMP",
            ColumnType::Guid => "UUID",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
struct TypeCandidate {
    non_empty: usize,
    boolean_matches: usize,
    integer_matches: usize,
    float_matches: usize,
    date_matches: usize,
    datetime_matches: usize,
    guid_matches: usize,
}

impl TypeCandidate {
    fn update(&mut self, value: &str) {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return;
        }
        self.non_empty += 1;
        if is_boolean(trimmed) {
            self.boolean_matches += 1;
        }
        if is_integer(trimmed) {
            self.integer_matches += 1;
        }
        if is_float(trimmed) {
            self.float_matches += 1;
        }
        if parse_naive_date(trimmed).is_ok() {
            self.date_matches += 1;
        }
        if parse_naive_datetime(trimmed).is_ok() {
            self.datetime_matches += 1;
        }
        if is_guid(trimmed) {
            self.guid_matches += 1;
        }
    }

    fn confident(&self, count: usize) -> bool {
        count > 0 && count == self.non_empty
    }

    fn decide(&self) -> ColumnType {
        if self.non_empty == 0 {
            ColumnType::String
        } else if self.confident(self.boolean_matches) {
            ColumnType::Boolean
        } else if self.confident(self.integer_matches) {
            ColumnType::Integer
        } else if self.confident(self.float_matches) {
            ColumnType::Float
        } else if self.confident(self.date_matches) {
            ColumnType::Date
        } else if self.confident(self.datetime_matches) {
            ColumnType::DateTime
        } else if self.confident(self.guid_matches) {
            ColumnType::Guid
        } else {
            ColumnType::String
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferredColumn {
    pub name: String,
    pub datatype: ColumnType,
}

#[derive(Debug, Clone)]
pub struct InferredSchema {
    pub columns: Vec<InferredColumn>,
}

impl InferredSchema {
    /// Infers one type per header from sampled rows. Rows with the wrong
    /// width are ignored; they are rejected later regardless of types.
    pub fn infer(headers: &[String], sample: &[Vec<String>]) -> Self {
        let mut candidates = vec![TypeCandidate::default(); headers.len()];
        for row in sample.iter().filter(|row| row.len() == headers.len()) {
            for (candidate, value) in candidates.iter_mut().zip(row) {
                candidate.update(value);
            }
        }
        let columns = headers
            .iter()
            .zip(&candidates)
            .map(|(name, candidate)| InferredColumn {
                name: name.clone(),
                datatype: candidate.decide(),
            })
            .collect();
        Self { columns }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Index of the first value in `row` that does not cast to its column type.
    pub fn first_cast_failure(&self, row: &[String]) -> Option<usize> {
        self.columns
            .iter()
            .zip(row)
            .position(|(column, value)| !value_conforms(value, column.datatype))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect()
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn infer_detects_basic_types() {
        let schema = InferredSchema::infer(
            &headers(&["id", "price", "active", "day", "name"]),
            &rows(&[
                &["1", "9.99", "yes", "2024-01-01", "Alice"],
                &["2", "10", "no", "2024-01-02", "Bob"],
                &["3", "", "y", "2024-01-03", "Carol"],
            ]),
        );
        let types: Vec<_> = schema.columns.iter().map(|c| c.datatype).collect();
        assert_eq!(
            types,
            vec![
                ColumnType::Integer,
                ColumnType::Float,
                ColumnType::Boolean,
                ColumnType::Date,
                ColumnType::String
            ]
        );
    }

    #[test]
    fn a_single_sampled_outlier_keeps_the_column_textual() {
        let mut sample = Vec::new();
        for zip in 10001..10020 {
            sample.push(vec![zip.to_string()]);
        }
        sample.push(vec!["N/A".to_string()]);
        let schema = InferredSchema::infer(&headers(&["zip"]), &sample);
        assert_eq!(schema.columns[0].datatype, ColumnType::String);
        assert_eq!(schema.first_cast_failure(&["N/A".to_string()]), None);
    }

    #[test]
    fn values_past_the_sample_can_still_fail_the_cast() {
        let sample = rows(&[&["20"], &["21"], &["22"]]);
        let schema = InferredSchema::infer(&headers(&["age"]), &sample);
        assert_eq!(schema.columns[0].datatype, ColumnType::Integer);
        assert_eq!(schema.first_cast_failure(&["unknown".to_string()]), Some(0));
        assert_eq!(schema.first_cast_failure(&["42".to_string()]), None);
    }

    #[test]
    fn infer_falls_back_to_string_for_mixed_columns() {
        let schema = InferredSchema::infer(
            &headers(&["code"]),
            &rows(&[&["12"], &["AB"], &["34"]]),
        );
        assert_eq!(schema.columns[0].datatype, ColumnType::String);
    }

    #[test]
    fn infer_ignores_rows_with_wrong_width() {
        let schema = InferredSchema::infer(
            &headers(&["a", "b"]),
            &rows(&[&["1", "2"], &["x"], &["3", "4", "5"]]),
        );
        assert_eq!(schema.columns[0].datatype, ColumnType::Integer);
        assert_eq!(schema.width(), 2);
    }
}
