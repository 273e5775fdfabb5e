//! The end-to-end run: resolve, validate, decide, normalize, summarize.
//!
//! [`process_csv`] owns every failure. Errors are reported once through the
//! session's reporter and collapse to [`ExitStatus::Failure`]; temp files and
//! an empty reject sink are removed by an [`ArtifactGuard`] on every path out.

use std::{
    env, fs,
    io::Write,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};

use crate::{
    cleanup::{ArtifactGuard, TempFileSet},
    config::{OutputTarget, PipelineConfig, RunOptions},
    engine::{DataEngine, ReadOptions},
    error::NormalizeError,
    input::{self, InputReference, ResolvedInput, StdinSource},
    io_utils,
    normalize::{self, NormalizeStats},
    policy::{self, HaltStatus, PolicyDecision},
    report::{Reporter, Severity},
    validation::{self, ValidationOutcome},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failure,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure => 1,
        }
    }
}

/// Everything a run talks to outside its own arguments.
pub struct Session<'a> {
    pub stdin: &'a mut dyn StdinSource,
    pub stdout: &'a mut dyn Write,
    pub reporter: &'a mut dyn Reporter,
    pub engine: &'a dyn DataEngine,
    pub temp_files: TempFileSet,
    /// Where intermediate files go; defaults to the output's directory, or
    /// the system temp dir when writing to stdout.
    pub temp_dir: Option<PathBuf>,
}

pub fn process_csv(input: &str, options: &RunOptions, session: Session<'_>) -> ExitStatus {
    let Session {
        stdin,
        stdout,
        reporter,
        engine,
        temp_files,
        temp_dir,
    } = session;

    let mut run = Run {
        stdin,
        stdout,
        reporter,
        engine,
        temp_files,
        temp_dir,
    };
    match run.execute(input, options) {
        Ok(status) => status,
        Err(err) => {
            if !err.already_reported() {
                let body = err.hint().unwrap_or_default();
                run.reporter.panel(Severity::Error, &err.to_string(), &body);
            }
            debug!("Run failed: {err:?}");
            ExitStatus::Failure
        }
    }
}

struct Run<'a> {
    stdin: &'a mut dyn StdinSource,
    stdout: &'a mut dyn Write,
    reporter: &'a mut dyn Reporter,
    engine: &'a dyn DataEngine,
    temp_files: TempFileSet,
    temp_dir: Option<PathBuf>,
}

impl Run<'_> {
    fn execute(&mut self, input: &str, options: &RunOptions) -> Result<ExitStatus, NormalizeError> {
        let reference = InputReference::classify(input);
        check_input_exists(&reference)?;
        if reference == InputReference::Stdin && self.stdin.is_interactive() {
            return Err(NormalizeError::StdinNotPiped);
        }
        let base_name = input::derive_base_name(&reference);
        let config = PipelineConfig::from_options(options, &base_name)?;
        if !config.check_only {
            normalize::ensure_output_available(&config.output, config.force)?;
            ensure_output_dir(&config.output)?;
        }

        let temp_dir = self
            .temp_dir
            .clone()
            .unwrap_or_else(|| default_temp_dir(&config.output));
        let reject = reject_sink_path(&config, &temp_dir, &base_name);
        if io_utils::remove_if_exists(&reject)? {
            debug!("Removed stale reject file {:?}", reject);
        }
        let staged = temp_dir.join(format!("{base_name}_staged.csv"));

        let guard = ArtifactGuard::new(self.temp_files.clone(), Some(reject.clone()));
        guard.temp_files().register(&staged);

        info!(
            "Processing {} -> {}",
            reference.display_name(),
            config.output.describe()
        );
        let resolved = input::resolve_input(
            &reference,
            &config,
            &temp_dir,
            &base_name,
            guard.temp_files(),
            &mut *self.stdin,
        )?;

        let read_options = ReadOptions {
            skip_rows: config.skip_rows,
            ..ReadOptions::default()
        };
        let outcome = validation::validate_with_classification(
            self.engine,
            &resolved.source,
            &reject,
            &staged,
            &read_options,
            reference.is_remote(),
            &reference.display_name(),
            &mut *self.reporter,
        )?;

        let decision = policy::apply_policy(&outcome, &config, &reject, &mut *self.reporter);
        let fail_after = match decision {
            PolicyDecision::Halt(HaltStatus::Success) => return Ok(ExitStatus::Success),
            PolicyDecision::Halt(HaltStatus::Failure) => {
                return Err(NormalizeError::ValidationFailed {
                    strict: config.strict,
                    rejected: outcome.rejected_rows(),
                });
            }
            PolicyDecision::Proceed => false,
            PolicyDecision::ProceedWithWarnings { fail_after } => fail_after,
        };

        let writer = normalize::open_output(&config.output, config.force, &mut *self.stdout)?;
        let stats =
            normalize::normalize_csv(&staged, writer, config.delimiter, !config.keep_names)?;

        let summary = self.summary_rows(
            &reference, &resolved, &config, &outcome, &stats, &staged, &reject,
        );
        self.reporter.summary(&summary);

        drop(guard);
        if fail_after {
            return Err(NormalizeError::ValidationFailed {
                strict: true,
                rejected: outcome.rejected_rows(),
            });
        }
        Ok(ExitStatus::Success)
    }

    #[allow(clippy::too_many_arguments)]
    fn summary_rows(
        &self,
        reference: &InputReference,
        resolved: &ResolvedInput,
        config: &PipelineConfig,
        outcome: &ValidationOutcome,
        stats: &NormalizeStats,
        staged: &Path,
        reject: &Path,
    ) -> Vec<(String, String)> {
        let rows = self.engine.row_count(staged).unwrap_or_else(|err| {
            warn!("Unable to count output rows: {err}");
            stats.rows
        });
        let columns = self.engine.column_count(staged).unwrap_or_else(|err| {
            warn!("Unable to count output columns: {err}");
            stats.columns
        });

        let mut summary = vec![
            ("Input".to_string(), reference.display_name()),
            ("Encoding".to_string(), resolved.encoding.clone()),
        ];
        if config.fix_mojibake_sample.is_some() {
            let repaired = if resolved.mojibake_repaired { "yes" } else { "no" };
            summary.push(("Mojibake repaired".to_string(), repaired.to_string()));
        }
        summary.push((
            "Delimiter".to_string(),
            io_utils::printable_delimiter(config.delimiter),
        ));
        summary.push((
            "Column names".to_string(),
            if config.keep_names {
                "kept".to_string()
            } else {
                format!("normalized ({} renamed)", stats.renamed)
            },
        ));
        summary.push(("Rows".to_string(), rows.to_string()));
        summary.push(("Columns".to_string(), columns.to_string()));
        if let Some(size) = resolved.local_input.as_deref().and_then(io_utils::file_size) {
            summary.push(("Input size".to_string(), io_utils::human_size(size)));
        }
        summary.push(("Output".to_string(), config.output.describe()));
        if let Some(size) = config.output.path().and_then(io_utils::file_size) {
            summary.push(("Output size".to_string(), io_utils::human_size(size)));
        }
        if outcome.has_errors {
            summary.push((
                "Rejected rows".to_string(),
                outcome.rejected_rows().to_string(),
            ));
            summary.push(("Reject file".to_string(), reject.display().to_string()));
        }
        summary
    }
}

fn check_input_exists(reference: &InputReference) -> Result<(), NormalizeError> {
    let Some(path) = reference.local_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Err(NormalizeError::InputNotFound(path.display().to_string()));
    }
    if !path.is_file() {
        return Err(NormalizeError::NotAFile(path.to_path_buf()));
    }
    Ok(())
}

fn ensure_output_dir(output: &OutputTarget) -> Result<(), NormalizeError> {
    match output.path().and_then(Path::parent) {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            debug!("Creating output directory {:?}", parent);
            fs::create_dir_all(parent)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

fn default_temp_dir(output: &OutputTarget) -> PathBuf {
    match output.path().and_then(Path::parent) {
        Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
        Some(parent) => parent.to_path_buf(),
        None => env::temp_dir(),
    }
}

/// File mode keeps the reject sink next to the output; stdout and check
/// runs keep it in the temp dir.
fn reject_sink_path(config: &PipelineConfig, temp_dir: &Path, base_name: &str) -> PathBuf {
    let file_name = format!("{base_name}_reject_errors.csv");
    match config.output.path().and_then(Path::parent) {
        Some(parent) if !config.check_only && !parent.as_os_str().is_empty() => {
            parent.join(file_name)
        }
        Some(_) if !config.check_only => PathBuf::from(file_name),
        _ => temp_dir.join(file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(output: OutputTarget, check_only: bool) -> PipelineConfig {
        let mut config = PipelineConfig::from_options(&RunOptions::default(), "data").unwrap();
        config.use_stdout = output.is_stdout();
        config.output = output;
        config.check_only = check_only;
        config
    }

    #[test]
    fn exit_codes() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::Failure.code(), 1);
    }

    #[test]
    fn reject_sink_sits_next_to_file_output() {
        let file = config(OutputTarget::File(PathBuf::from("/data/out/clean.csv")), false);
        assert_eq!(
            reject_sink_path(&file, Path::new("/tmp"), "data"),
            PathBuf::from("/data/out/data_reject_errors.csv")
        );
        let relative = config(OutputTarget::File(PathBuf::from("clean.csv")), false);
        assert_eq!(
            reject_sink_path(&relative, Path::new("/tmp"), "data"),
            PathBuf::from("data_reject_errors.csv")
        );
    }

    #[test]
    fn reject_sink_uses_temp_dir_for_stdout_and_check_runs() {
        let stdout = config(OutputTarget::Stdout, false);
        assert_eq!(
            reject_sink_path(&stdout, Path::new("/tmp/run"), "data"),
            PathBuf::from("/tmp/run/data_reject_errors.csv")
        );
        let check = config(OutputTarget::File(PathBuf::from("/data/clean.csv")), true);
        assert_eq!(
            reject_sink_path(&check, Path::new("/tmp/run"), "data"),
            PathBuf::from("/tmp/run/data_reject_errors.csv")
        );
    }

    #[test]
    fn default_temp_dir_follows_output() {
        assert_eq!(
            default_temp_dir(&OutputTarget::File(PathBuf::from("/data/clean.csv"))),
            PathBuf::from("/data")
        );
        assert_eq!(
            default_temp_dir(&OutputTarget::File(PathBuf::from("clean.csv"))),
            PathBuf::from(".")
        );
        assert_eq!(default_temp_dir(&OutputTarget::Stdout), env::temp_dir());
    }
}
