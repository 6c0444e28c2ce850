//! JSON output schema.
//!
//! `--format json` wraps every command result in the same envelope:
//! ```json
//! {
//!   "version": "1",
//!   "command": "calicoctl diags",
//!   "status": "ok" | "error",
//!   "duration_ms": 123,
//!   "detail": { ... },
//!   "events": [ ... ],
//!   "diagnostics": [ ... ],
//!   "trace_id": "uuid" (present when CALICOCTL_TRACE is set)
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Schema version - bump when breaking changes occur
pub const SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

/// A diagnostic message attached to the command output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    /// Failure class, e.g. "upload" or "archive"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            code: None,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Warning, message)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CommandStart,
    CommandEnd,

    CollectStart,
    CollectComplete,

    ArchiveComplete,

    UploadStart,
    UploadRetry,
    UploadComplete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Milliseconds since command start
    pub timestamp_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Event {
    pub fn new(event_type: EventType, timestamp_ms: u64) -> Self {
        Self {
            event_type,
            timestamp_ms,
            data: None,
            message: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonEnvelope {
    pub version: String,
    pub command: String,
    pub status: Status,
    pub duration_ms: u64,
    pub detail: Value,
    pub events: Vec<Event>,
    pub diagnostics: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl JsonEnvelope {
    pub fn new(
        command: impl Into<String>,
        status: Status,
        duration: Duration,
        detail: Value,
    ) -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            command: command.into(),
            status,
            duration_ms: duration.as_millis() as u64,
            detail,
            events: Vec::new(),
            diagnostics: Vec::new(),
            trace_id: None,
        }
    }

    pub fn to_json(&self) -> String {
        // Only strings, numbers and serde_json values: serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|err| {
            format!(r#"{{"version":"{SCHEMA_VERSION}","status":"error","error":"{err}"}}"#)
        })
    }
}

/// Callback invoked for every recorded event (used by the progress renderer).
pub type EventListener = Box<dyn Fn(&Event)>;

/// Tracks events and diagnostics while a command runs.
pub struct EventCollector {
    start: Instant,
    events: Vec<Event>,
    diagnostics: Vec<Diagnostic>,
    trace_id: Option<String>,
    listener: Option<EventListener>,
}

impl std::fmt::Debug for EventCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCollector")
            .field("events", &self.events.len())
            .field("diagnostics", &self.diagnostics.len())
            .field("trace_id", &self.trace_id)
            .finish()
    }
}

impl EventCollector {
    pub fn new() -> Self {
        let trace_id = std::env::var_os("CALICOCTL_TRACE").map(|_| Uuid::new_v4().to_string());
        Self {
            start: Instant::now(),
            events: Vec::new(),
            diagnostics: Vec::new(),
            trace_id,
            listener: None,
        }
    }

    pub fn with_trace_id(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: Some(trace_id.into()),
            ..Self::new()
        }
    }

    pub fn set_listener(&mut self, listener: Option<EventListener>) {
        self.listener = listener;
    }

    pub fn event(&mut self, event_type: EventType) {
        self.push(Event::new(event_type, self.timestamp_ms()));
    }

    pub fn event_with_message(&mut self, event_type: EventType, message: impl Into<String>) {
        self.push(Event::new(event_type, self.timestamp_ms()).with_message(message));
    }

    pub fn event_with_data(&mut self, event_type: EventType, data: Value) {
        self.push(Event::new(event_type, self.timestamp_ms()).with_data(data));
    }

    pub fn diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::warning(message));
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn build_envelope(
        self,
        command: impl Into<String>,
        status: Status,
        detail: Value,
    ) -> JsonEnvelope {
        let mut envelope = JsonEnvelope::new(command, status, self.start.elapsed(), detail);
        envelope.events = self.events;
        envelope.diagnostics = self.diagnostics;
        envelope.trace_id = self.trace_id;
        envelope
    }

    fn timestamp_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn push(&mut self, event: Event) {
        if let Some(listener) = &self.listener {
            listener(&event);
        }
        self.events.push(event);
    }
}

impl Default for EventCollector {
    fn default() -> Self {
        Self::new()
    }
}
