use std::path::PathBuf;

use clap::Parser;

use crate::{
    config::{DEFAULT_DELIMITER, RunOptions},
    engine::HTTP_TIMEOUT_SECS,
};

#[derive(Debug, Parser)]
#[command(
    name = "csv-normalizer",
    author,
    version,
    about = "Validate and normalize CSV files: encoding, mojibake, malformed rows, delimiters and column names",
    long_about = None
)]
pub struct Cli {
    /// Input CSV: a local path (optionally .gz), an http(s) URL, or '-' for stdin
    pub input: String,
    /// Output file ('-' writes to stdout; defaults to <input name>.csv in the current directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Overwrite the output file if it exists
    #[arg(short, long)]
    pub force: bool,
    /// Keep the original column names instead of converting them to snake_case
    #[arg(short = 'n', long = "keep-names")]
    pub keep_names: bool,
    /// Output delimiter (single character, or 'tab', 'comma', 'semicolon', 'pipe')
    #[arg(short, long, default_value = DEFAULT_DELIMITER)]
    pub delimiter: String,
    /// Fail when any row is rejected
    #[arg(long)]
    pub strict: bool,
    /// Validate only; never write the output file
    #[arg(long = "check")]
    pub check_only: bool,
    /// Write the normalized CSV to stdout
    #[arg(long)]
    pub stdout: bool,
    /// Repair mojibake, sampling this many bytes to detect it
    #[arg(
        long = "fix-mojibake",
        value_name = "SAMPLE_BYTES",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "5000"
    )]
    pub fix_mojibake: Option<usize>,
    /// Raw lines to skip before the header row
    #[arg(long, default_value_t = 0)]
    pub skip_rows: usize,
    /// Timeout in seconds for remote inputs
    #[arg(long, default_value_t = HTTP_TIMEOUT_SECS)]
    pub http_timeout: u64,
    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            output: self.output.clone(),
            delimiter: self.delimiter.clone(),
            keep_names: self.keep_names,
            force: self.force,
            strict: self.strict,
            check_only: self.check_only,
            use_stdout: self.stdout,
            fix_mojibake_sample: self.fix_mojibake,
            skip_rows: self.skip_rows,
        }
    }
}
