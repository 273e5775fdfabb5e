//! Validation driver.
//!
//! Runs the engine once, classifies engine failures into user-facing
//! categories, and summarizes the reject sink the engine produced.

use std::{collections::BTreeSet, fs::File, io::BufReader, path::Path, sync::OnceLock};

use log::{debug, info};
use regex::Regex;

use crate::{
    engine::{DataEngine, ERROR_TYPE_COLUMN, FallbackConfig, ReadOptions, WorkingSource},
    error::NormalizeError,
    io_utils,
    report::{Reporter, Severity},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    ZipfsExtensionMissing,
    HttpNotFound,
    HttpAuth,
    HttpTimeout,
    HttpRangeUnsatisfiable,
    HttpEtagChanged,
    GenericValidationFailure,
}

impl FailureCategory {
    pub fn title(&self) -> &'static str {
        match self {
            FailureCategory::ZipfsExtensionMissing => "Compressed input needs zipfs support",
            FailureCategory::HttpNotFound => "HTTP 404: remote file not found",
            FailureCategory::HttpAuth => "Authentication required",
            FailureCategory::HttpTimeout => "HTTP timeout",
            FailureCategory::HttpRangeUnsatisfiable => "HTTP range request not supported",
            FailureCategory::HttpEtagChanged => "Remote file changed (ETag mismatch)",
            FailureCategory::GenericValidationFailure => "Validation failed",
        }
    }

    pub fn guidance(&self) -> String {
        match self {
            FailureCategory::ZipfsExtensionMissing => {
                "Zip archives cannot be read directly. Extract the CSV (or recompress it with gzip) and run again."
            }
            FailureCategory::HttpNotFound => "Check that the URL is correct and publicly reachable.",
            FailureCategory::HttpAuth => {
                "The server refused access. Download the file with valid credentials and pass the local path."
            }
            FailureCategory::HttpTimeout => {
                "The server did not answer in time. Retry later or download the file first."
            }
            FailureCategory::HttpRangeUnsatisfiable => {
                "The server does not support partial downloads. Download the file and pass the local path."
            }
            FailureCategory::HttpEtagChanged => {
                "The remote file changed while it was being read. Retry the command."
            }
            FailureCategory::GenericValidationFailure => {
                "The data engine could not read the input. Check the delimiter, --skip-rows and the file contents."
            }
        }
        .to_string()
    }
}

/// Maps an engine failure message to a category. The only place engine
/// messages are pattern-matched; HTTP categories apply to remote inputs only.
///
/// Messages carry the URL, so status codes are read from the `HTTP Error <code>`
/// token only and never from digits elsewhere in the text.
pub fn classify_engine_error(message: &str, is_remote: bool) -> FailureCategory {
    let lowered = message.to_lowercase();
    if lowered.contains("zipfs") {
        return FailureCategory::ZipfsExtensionMissing;
    }
    if !is_remote {
        return FailureCategory::GenericValidationFailure;
    }
    if lowered.contains("http timeout") || lowered.contains("timed out") {
        return FailureCategory::HttpTimeout;
    }
    if lowered.contains("etag") {
        return FailureCategory::HttpEtagChanged;
    }
    match http_status(message) {
        Some(404) => FailureCategory::HttpNotFound,
        Some(401 | 403) => FailureCategory::HttpAuth,
        Some(416) => FailureCategory::HttpRangeUnsatisfiable,
        Some(_) => FailureCategory::GenericValidationFailure,
        None if lowered.contains("range not satisfiable") => {
            FailureCategory::HttpRangeUnsatisfiable
        }
        None => FailureCategory::GenericValidationFailure,
    }
}

fn http_status(message: &str) -> Option<u16> {
    static STATUS: OnceLock<Regex> = OnceLock::new();
    STATUS
        .get_or_init(|| {
            Regex::new(r"(?i)\bhttp error:?\s+(\d{3})\b").expect("status pattern is valid")
        })
        .captures(message)
        .and_then(|caps| caps[1].parse().ok())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub has_errors: bool,
    /// Records in the reject sink, header included.
    pub reject_count: usize,
    pub error_types: BTreeSet<String>,
    pub conforming_rows: usize,
    pub fallback: Option<FallbackConfig>,
}

impl ValidationOutcome {
    pub fn rejected_rows(&self) -> usize {
        self.reject_count.saturating_sub(1)
    }
}

#[allow(clippy::too_many_arguments)]
pub fn validate_with_classification(
    engine: &dyn DataEngine,
    source: &WorkingSource,
    reject: &Path,
    staged: &Path,
    options: &ReadOptions,
    is_remote: bool,
    display_name: &str,
    reporter: &mut dyn Reporter,
) -> Result<ValidationOutcome, NormalizeError> {
    info!("Validating {display_name}");
    let report = match engine.validate(source, options, staged, reject) {
        Ok(report) => report,
        Err(err) => {
            let category = classify_engine_error(&err.message, is_remote);
            debug!("Engine failure classified as {:?}: {}", category, err.message);
            let body = format!("{}\n\n{}\n{}", display_name, err.message, category.guidance());
            reporter.panel(Severity::Error, category.title(), &body);
            return Err(NormalizeError::TransportError {
                category,
                message: err.message,
            });
        }
    };

    let reject_count = if reject.exists() {
        io_utils::count_records(reject)?
    } else {
        0
    };
    let error_types = if reject_count > 1 {
        read_error_types(reject)?
    } else {
        BTreeSet::new()
    };
    debug!(
        "Engine accepted {} row(s); reject sink has {} record(s)",
        report.conforming_rows, reject_count
    );

    Ok(ValidationOutcome {
        has_errors: reject_count > 1,
        reject_count,
        error_types,
        conforming_rows: report.conforming_rows,
        fallback: report.fallback,
    })
}

/// Distinct values of the reject sink's `error_type` column.
fn read_error_types(reject: &Path) -> Result<BTreeSet<String>, NormalizeError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(BufReader::new(File::open(reject)?));
    let headers = reader.headers().map_err(csv_to_io)?.clone();
    let Some(column) = headers.iter().position(|h| h == ERROR_TYPE_COLUMN) else {
        return Ok(BTreeSet::new());
    };
    let mut types = BTreeSet::new();
    for record in reader.records() {
        let record = record.map_err(csv_to_io)?;
        if let Some(value) = record.get(column).filter(|v| !v.is_empty()) {
            types.insert(value.to_string());
        }
    }
    Ok(types)
}

fn csv_to_io(err: csv::Error) -> NormalizeError {
    NormalizeError::Io(std::io::Error::other(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::{CsvEngine, EngineError, EngineReport},
        report::MemoryReporter,
    };
    use std::fs;
    use tempfile::tempdir;

    struct FailingEngine(&'static str);

    impl DataEngine for FailingEngine {
        fn validate(
            &self,
            _source: &WorkingSource,
            _options: &ReadOptions,
            _output: &Path,
            _reject: &Path,
        ) -> Result<EngineReport, EngineError> {
            Err(EngineError::new(self.0))
        }

        fn row_count(&self, _path: &Path) -> Result<usize, EngineError> {
            Ok(0)
        }

        fn column_count(&self, _path: &Path) -> Result<usize, EngineError> {
            Ok(0)
        }
    }

    #[test]
    fn classify_is_case_insensitive_and_remote_aware() {
        assert_eq!(
            classify_engine_error("Extension \"ZIPFS\" not found", false),
            FailureCategory::ZipfsExtensionMissing
        );
        assert_eq!(
            classify_engine_error("HTTP Error 404 Not Found", true),
            FailureCategory::HttpNotFound
        );
        assert_eq!(
            classify_engine_error("HTTP Error 404 Not Found", false),
            FailureCategory::GenericValidationFailure
        );
        assert_eq!(
            classify_engine_error("HTTP Error 403 Forbidden", true),
            FailureCategory::HttpAuth
        );
        assert_eq!(
            classify_engine_error("request Timed Out", true),
            FailureCategory::HttpTimeout
        );
        assert_eq!(
            classify_engine_error("HTTP Error 416 Range Not Satisfiable", true),
            FailureCategory::HttpRangeUnsatisfiable
        );
        assert_eq!(
            classify_engine_error("HTTP Error: ETag on reading file changed", true),
            FailureCategory::HttpEtagChanged
        );
    }

    #[test]
    fn digits_in_the_url_do_not_pick_the_category() {
        assert_eq!(
            classify_engine_error(
                "HTTP Error 500 Internal Server Error: https://example.com/exports/20240403.csv",
                true
            ),
            FailureCategory::GenericValidationFailure
        );
        assert_eq!(
            classify_engine_error(
                "HTTP timeout: request to https://example.com/404-report.csv timed out",
                true
            ),
            FailureCategory::HttpTimeout
        );
        assert_eq!(
            classify_engine_error("HTTP Error 404 Not Found: https://example.com/orange.csv", true),
            FailureCategory::HttpNotFound
        );
        assert_eq!(
            classify_engine_error("HTTP Error 502 Bad Gateway: https://example.com/403.csv", true),
            FailureCategory::GenericValidationFailure
        );
    }

    #[test]
    fn titles_name_their_category() {
        assert!(FailureCategory::ZipfsExtensionMissing.title().contains("zipfs"));
        assert!(FailureCategory::HttpNotFound.title().contains("404"));
        assert!(FailureCategory::HttpAuth.title().contains("Authentication"));
        assert!(FailureCategory::HttpTimeout.title().contains("timeout"));
        assert!(FailureCategory::HttpRangeUnsatisfiable.title().contains("range"));
        assert!(FailureCategory::HttpEtagChanged.title().contains("ETag"));
        assert!(
            FailureCategory::GenericValidationFailure
                .title()
                .contains("Validation failed")
        );
    }

    #[test]
    fn engine_failure_is_reported_once_and_fatal() {
        let dir = tempdir().unwrap();
        let mut reporter = MemoryReporter::new();
        let err = validate_with_classification(
            &FailingEngine("HTTP Error 404 Not Found: https://example.com/data.csv"),
            &WorkingSource::Remote("https://example.com/data.csv".to_string()),
            &dir.path().join("reject.csv"),
            &dir.path().join("staged.csv"),
            &ReadOptions::default(),
            true,
            "https://example.com/data.csv",
            &mut reporter,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::TransportError {
                category: FailureCategory::HttpNotFound,
                ..
            }
        ));
        let panels = reporter.panels();
        assert_eq!(panels.len(), 1);
        assert!(panels[0].1.contains("404"));
    }

    #[test]
    fn outcome_collects_error_types() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.csv");
        fs::write(&input, "a,b\n1,2\n3\n4,5,6\n7,8\n").unwrap();
        let reject = dir.path().join("reject.csv");
        let mut reporter = MemoryReporter::new();
        let outcome = validate_with_classification(
            &CsvEngine::default(),
            &WorkingSource::Local(input),
            &reject,
            &dir.path().join("staged.csv"),
            &ReadOptions::default(),
            false,
            "in.csv",
            &mut reporter,
        )
        .unwrap();
        assert!(outcome.has_errors);
        assert_eq!(outcome.reject_count, 3);
        assert_eq!(outcome.rejected_rows(), 2);
        assert_eq!(outcome.conforming_rows, 2);
        let types: Vec<_> = outcome.error_types.iter().map(String::as_str).collect();
        assert_eq!(types, vec!["MISSING_COLUMNS", "TOO_MANY_COLUMNS"]);
        assert!(reporter.panels().is_empty());
    }

    #[test]
    fn clean_input_has_header_only_reject_sink() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.csv");
        fs::write(&input, "a,b\n1,2\n").unwrap();
        let outcome = validate_with_classification(
            &CsvEngine::default(),
            &WorkingSource::Local(input),
            &dir.path().join("reject.csv"),
            &dir.path().join("staged.csv"),
            &ReadOptions::default(),
            false,
            "in.csv",
            &mut MemoryReporter::new(),
        )
        .unwrap();
        assert!(!outcome.has_errors);
        assert_eq!(outcome.reject_count, 1);
        assert!(outcome.error_types.is_empty());
    }
}
