pub mod cleanup;
pub mod cli;
pub mod config;
pub mod data;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod input;
pub mod io_utils;
pub mod mojibake;
pub mod normalize;
pub mod pipeline;
pub mod policy;
pub mod report;
pub mod schema;
pub mod table;
pub mod validation;

use std::{env, io, sync::OnceLock, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug};

use crate::{
    cleanup::TempFileSet,
    cli::Cli,
    engine::CsvEngine,
    input::ProcessStdin,
    pipeline::{ExitStatus, Session, process_csv},
    report::ConsoleReporter,
};

/// Exit code used when the run is interrupted with Ctrl-C.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging(verbose: bool) {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if verbose {
            builder.filter_module("csv_normalizer", LevelFilter::Debug);
        } else if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_normalizer", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<ExitStatus> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let temp_files = TempFileSet::new();
    let interrupted = temp_files.clone();
    ctrlc::set_handler(move || {
        interrupted.cleanup();
        eprintln!("Interrupted; temporary files removed.");
        std::process::exit(INTERRUPTED_EXIT_CODE);
    })
    .context("Installing the interrupt handler")?;

    let engine = CsvEngine::new(Duration::from_secs(cli.http_timeout));
    let mut stdin = ProcessStdin;
    let mut stdout = io::stdout().lock();
    let mut reporter = ConsoleReporter::stderr();
    debug!("Run options: {:?}", cli);

    let status = process_csv(
        &cli.input,
        &cli.run_options(),
        Session {
            stdin: &mut stdin,
            stdout: &mut stdout,
            reporter: &mut reporter,
            engine: &engine,
            temp_files,
            temp_dir: None,
        },
    );
    Ok(status)
}
