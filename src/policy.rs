//! What happens after validation: continue, continue with warnings, or stop.

use std::path::Path;

use itertools::Itertools;
use log::debug;

use crate::{
    config::PipelineConfig,
    report::{Reporter, Severity},
    validation::ValidationOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Proceed,
    /// Write the output anyway; `fail_after` turns the run into a failure
    /// once the output is written.
    ProceedWithWarnings { fail_after: bool },
    Halt(HaltStatus),
}

pub fn decide(outcome: &ValidationOutcome, config: &PipelineConfig) -> PolicyDecision {
    let decision = match (outcome.has_errors, config.check_only) {
        (false, false) => PolicyDecision::Proceed,
        (false, true) => PolicyDecision::Halt(HaltStatus::Success),
        (true, true) => PolicyDecision::Halt(HaltStatus::Failure),
        (true, false) if config.use_stdout && config.strict => {
            PolicyDecision::Halt(HaltStatus::Failure)
        }
        (true, false) if config.use_stdout => {
            PolicyDecision::ProceedWithWarnings { fail_after: false }
        }
        (true, false) => PolicyDecision::ProceedWithWarnings {
            fail_after: config.strict,
        },
    };
    debug!("Post-validation decision: {:?}", decision);
    decision
}

/// Decides and reports. `reject` is the sink path shown to the user.
pub fn apply_policy(
    outcome: &ValidationOutcome,
    config: &PipelineConfig,
    reject: &Path,
    reporter: &mut dyn Reporter,
) -> PolicyDecision {
    if outcome.fallback.is_some_and(|fallback| !fallback.strict_mode) {
        reporter.warn(
            "The input could not be parsed strictly; it was read in permissive mode \
             (quotes ignored). Check the output for shifted values.",
        );
    }

    let decision = decide(outcome, config);
    match decision {
        PolicyDecision::Proceed => {}
        PolicyDecision::Halt(HaltStatus::Success) => {
            reporter.panel(
                Severity::Info,
                "Validation passed",
                &format!("{} row(s) conform to the inferred schema.", outcome.conforming_rows),
            );
        }
        PolicyDecision::Halt(HaltStatus::Failure) => {
            let title = if config.check_only {
                "Validation failed"
            } else {
                "Validation failed in strict mode"
            };
            reporter.panel(Severity::Error, title, &rejection_body(outcome, reject));
        }
        PolicyDecision::ProceedWithWarnings { fail_after } => {
            let title = if fail_after {
                "Invalid rows found in strict mode"
            } else {
                "Invalid rows found"
            };
            let mut body = rejection_body(outcome, reject);
            body.push_str("\nValid rows are written to the output.");
            reporter.panel(Severity::Warning, title, &body);
        }
    }
    decision
}

fn rejection_body(outcome: &ValidationOutcome, reject: &Path) -> String {
    let mut body = format!("{} row(s) rejected", outcome.rejected_rows());
    if !outcome.error_types.is_empty() {
        body.push_str(&format!(" ({})", outcome.error_types.iter().join(", ")));
    }
    body.push_str(&format!("\nDetails: {}", reject.display()));
    body
}
