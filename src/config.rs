use std::{env, path::PathBuf};

use crate::{error::NormalizeError, io_utils};

pub const DEFAULT_DELIMITER: &str = ",";
pub const DEFAULT_MOJIBAKE_SAMPLE: usize = 5000;

/// Raw run options as they arrive from the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output: Option<PathBuf>,
    pub delimiter: String,
    pub keep_names: bool,
    pub force: bool,
    pub strict: bool,
    pub check_only: bool,
    pub use_stdout: bool,
    pub fix_mojibake_sample: Option<usize>,
    pub skip_rows: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            output: None,
            delimiter: DEFAULT_DELIMITER.to_string(),
            keep_names: false,
            force: false,
            strict: false,
            check_only: false,
            use_stdout: false,
            fix_mojibake_sample: None,
            skip_rows: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    File(PathBuf),
    Stdout,
}

impl OutputTarget {
    pub fn is_stdout(&self) -> bool {
        matches!(self, OutputTarget::Stdout)
    }

    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            OutputTarget::File(path) => Some(path),
            OutputTarget::Stdout => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            OutputTarget::File(path) => path.display().to_string(),
            OutputTarget::Stdout => "stdout".to_string(),
        }
    }
}

/// Validated, read-only configuration for a single pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub delimiter: u8,
    pub keep_names: bool,
    pub force: bool,
    pub strict: bool,
    pub check_only: bool,
    pub use_stdout: bool,
    pub fix_mojibake_sample: Option<usize>,
    pub skip_rows: usize,
    pub output: OutputTarget,
}

impl PipelineConfig {
    /// Validates raw options. `base_name` seeds the default output file name.
    pub fn from_options(options: &RunOptions, base_name: &str) -> Result<Self, NormalizeError> {
        let delimiter = parse_delimiter(&options.delimiter)?;
        let output = match options.output.as_deref() {
            _ if options.use_stdout => OutputTarget::Stdout,
            Some(path) if io_utils::is_dash(path) => OutputTarget::Stdout,
            Some(path) => OutputTarget::File(path.to_path_buf()),
            None => {
                let cwd = env::current_dir()?;
                OutputTarget::File(cwd.join(format!("{base_name}.csv")))
            }
        };
        Ok(Self {
            delimiter,
            keep_names: options.keep_names,
            force: options.force,
            strict: options.strict,
            check_only: options.check_only,
            use_stdout: output.is_stdout(),
            fix_mojibake_sample: options.fix_mojibake_sample.filter(|sample| *sample > 0),
            skip_rows: options.skip_rows,
            output,
        })
    }
}

pub fn parse_delimiter(value: &str) -> Result<u8, NormalizeError> {
    let invalid = |reason: &str| NormalizeError::InvalidDelimiter {
        value: value.to_string(),
        reason: reason.to_string(),
    };
    let delimiter = match value {
        "tab" | "\t" | "\\t" => b'\t',
        "comma" | "," => b',',
        "|" | "pipe" => b'|',
        ";" | "semicolon" => b';',
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| invalid("delimiter cannot be empty"))?;
            if chars.next().is_some() {
                return Err(invalid("delimiter must be a single character"));
            }
            if !first.is_ascii() {
                return Err(invalid("delimiter must be ASCII"));
            }
            first as u8
        }
    };
    if matches!(delimiter, b'"' | b'\n' | b'\r') {
        return Err(invalid("quotes and line breaks cannot separate fields"));
    }
    Ok(delimiter)
}
