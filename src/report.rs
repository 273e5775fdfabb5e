//! Reporting sink injected into the pipeline.
//!
//! The orchestrator never prints directly. Everything user-facing goes
//! through a [`Reporter`], so tests can capture output with
//! [`MemoryReporter`] and the binary can render to stderr with
//! [`ConsoleReporter`] while stdout stays reserved for CSV data.

use std::io::{self, Write};

use crate::table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

pub trait Reporter {
    fn warn(&mut self, message: &str);
    fn panel(&mut self, severity: Severity, title: &str, body: &str);
    fn summary(&mut self, rows: &[(String, String)]);
}

/// Renders panels and summaries to a writer (stderr by default).
pub struct ConsoleReporter<W: Write> {
    out: W,
}

impl ConsoleReporter<io::Stderr> {
    pub fn stderr() -> Self {
        Self { out: io::stderr() }
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn warn(&mut self, message: &str) {
        let _ = writeln!(self.out, "warning: {message}");
    }

    fn panel(&mut self, severity: Severity, title: &str, body: &str) {
        let prefix = match severity {
            Severity::Info => "",
            Severity::Warning => "warning: ",
            Severity::Error => "error: ",
        };
        let rendered = table::render_panel(&format!("{prefix}{title}"), body);
        let _ = write!(self.out, "{rendered}");
    }

    fn summary(&mut self, rows: &[(String, String)]) {
        let _ = write!(self.out, "{}", table::render_key_values(rows));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    Warning(String),
    Panel {
        severity: Severity,
        title: String,
        body: String,
    },
    Summary(Vec<(String, String)>),
}

/// Records every event; used by tests and embedders that render later.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    pub events: Vec<ReportEvent>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn panels(&self) -> Vec<(Severity, &str, &str)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ReportEvent::Panel {
                    severity,
                    title,
                    body,
                } => Some((*severity, title.as_str(), body.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ReportEvent::Warning(message) => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn last_summary(&self) -> Option<&[(String, String)]> {
        self.events.iter().rev().find_map(|event| match event {
            ReportEvent::Summary(rows) => Some(rows.as_slice()),
            _ => None,
        })
    }

    pub fn mentions(&self, needle: &str) -> bool {
        self.events.iter().any(|event| match event {
            ReportEvent::Warning(message) => message.contains(needle),
            ReportEvent::Panel { title, body, .. } => {
                title.contains(needle) || body.contains(needle)
            }
            ReportEvent::Summary(rows) => rows
                .iter()
                .any(|(label, value)| label.contains(needle) || value.contains(needle)),
        })
    }
}

impl Reporter for MemoryReporter {
    fn warn(&mut self, message: &str) {
        self.events.push(ReportEvent::Warning(message.to_string()));
    }

    fn panel(&mut self, severity: Severity, title: &str, body: &str) {
        self.events.push(ReportEvent::Panel {
            severity,
            title: title.to_string(),
            body: body.to_string(),
        });
    }

    fn summary(&mut self, rows: &[(String, String)]) {
        self.events.push(ReportEvent::Summary(rows.to_vec()));
    }
}
