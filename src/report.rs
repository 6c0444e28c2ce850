//! Final command output.
//!
//! Rendering is pure: it turns the pipeline result into what goes to stdout,
//! what goes to stderr and the exit code. On success stdout carries the URL
//! alone; on failure stdout stays empty.

use crate::cli::OutputFormat;
use crate::diags::{DiagsError, DiagsSummary};
use crate::schema::{Diagnostic, DiagnosticLevel, EventCollector, EventType, Status};
use serde_json::json;

pub const COMMAND: &str = "calicoctl diags";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub stdout: Option<String>,
    pub stderr: Vec<String>,
    pub exit_code: i32,
}

impl Report {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

pub fn render(
    result: Result<DiagsSummary, DiagsError>,
    format: OutputFormat,
    mut events: EventCollector,
) -> Report {
    if let Err(err) = &result {
        let mut diagnostic = Diagnostic::error(err.to_string()).with_code(err.kind());
        if let Some(suggestion) = err.suggestion() {
            diagnostic = diagnostic.with_suggestion(suggestion);
        }
        events.diagnostic(diagnostic);
    }
    events.event(EventType::CommandEnd);

    match format {
        OutputFormat::Text => render_text(result, &events),
        OutputFormat::Json => render_json(result, events),
    }
}

fn render_text(result: Result<DiagsSummary, DiagsError>, events: &EventCollector) -> Report {
    let mut stderr: Vec<String> = events
        .diagnostics()
        .iter()
        .filter(|d| d.level == DiagnosticLevel::Warning)
        .map(|d| format!("warning: {}", d.message))
        .collect();

    match result {
        Ok(summary) => Report {
            stdout: Some(summary.url),
            stderr,
            exit_code: 0,
        },
        Err(err) => {
            stderr.push(format!("{COMMAND}: {err}"));
            if let Some(suggestion) = err.suggestion() {
                stderr.push(format!("hint: {suggestion}"));
            }
            Report {
                stdout: None,
                stderr,
                exit_code: err.exit_code(),
            }
        }
    }
}

fn render_json(result: Result<DiagsSummary, DiagsError>, events: EventCollector) -> Report {
    match result {
        Ok(summary) => {
            let envelope = events.build_envelope(COMMAND, Status::Ok, summary.to_json());
            Report {
                stdout: Some(envelope.to_json()),
                stderr: Vec::new(),
                exit_code: 0,
            }
        }
        Err(err) => {
            let detail = json!({
                "error": err.to_string(),
                "kind": err.kind(),
                "exit_code": err.exit_code(),
            });
            let envelope = events.build_envelope(COMMAND, Status::Error, detail);
            Report {
                stdout: None,
                stderr: vec![envelope.to_json()],
                exit_code: err.exit_code(),
            }
        }
    }
}
