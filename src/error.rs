//! Error taxonomy for the normalization pipeline.
//!
//! Every failure the orchestrator can hit maps to one [`NormalizeError`]
//! variant. The orchestrator reports the error once through the injected
//! reporter (message plus [`NormalizeError::hint`]) and exits with status 1.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::validation::FailureCategory;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("input file not found: {0}")]
    InputNotFound(String),

    #[error("not a file: {0}")]
    NotAFile(PathBuf),

    #[error("invalid delimiter '{value}': {reason}")]
    InvalidDelimiter { value: String, reason: String },

    #[error("output file already exists: {0}")]
    OutputExists(PathBuf),

    #[error("unable to detect encoding of {path}: {reason}")]
    EncodingUndetectable { path: PathBuf, reason: String },

    #[error("failed converting from {encoding} to UTF-8: {reason}")]
    EncodingConversionFailed { encoding: String, reason: String },

    #[error("mojibake repair failed: {0}")]
    MojibakeRepairIo(#[source] io::Error),

    #[error("no data on standard input")]
    StdinNotPiped,

    #[error("{}: {message}", category.title())]
    TransportError {
        category: FailureCategory,
        message: String,
    },

    #[error("validation found {rejected} invalid row(s)")]
    ValidationFailed { strict: bool, rejected: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl NormalizeError {
    /// Actionable guidance rendered beneath the error message.
    pub fn hint(&self) -> Option<String> {
        match self {
            NormalizeError::InputNotFound(_) => {
                Some("Check the path, or pass '-' to read from standard input.".to_string())
            }
            NormalizeError::NotAFile(_) => Some("Directories cannot be normalized.".to_string()),
            NormalizeError::InvalidDelimiter { .. } => Some(
                "Use a single ASCII character such as ',', ';', '|' or 'tab'.".to_string(),
            ),
            NormalizeError::OutputExists(_) => Some("Use --force to overwrite.".to_string()),
            NormalizeError::EncodingUndetectable { .. } => Some(
                "The file may be empty or binary. Convert it to UTF-8 and try again.".to_string(),
            ),
            NormalizeError::EncodingConversionFailed { .. } => {
                Some("Convert the file to UTF-8 manually and try again.".to_string())
            }
            NormalizeError::MojibakeRepairIo(_) => Some(
                "Check free disk space and permissions in the working directory.".to_string(),
            ),
            NormalizeError::StdinNotPiped => Some(
                "Pipe CSV data into the command, e.g. `cat data.csv | csv-normalizer -`."
                    .to_string(),
            ),
            NormalizeError::TransportError { category, .. } => Some(category.guidance()),
            NormalizeError::ValidationFailed { strict: true, .. } => Some(
                "Strict mode treats any invalid row as fatal; drop --strict to keep valid rows."
                    .to_string(),
            ),
            NormalizeError::ValidationFailed { .. } | NormalizeError::Io(_) => None,
        }
    }

    /// Errors the validation driver already rendered as a panel.
    pub fn already_reported(&self) -> bool {
        matches!(
            self,
            NormalizeError::TransportError { .. } | NormalizeError::ValidationFailed { .. }
        )
    }
}
