//! The `diags` pipeline: collect → archive → upload.

use crate::archive::{self, ArchiveError};
use crate::collector::Collector;
use crate::config::{ConfigError, DiagsConfig};
use crate::schema::{Diagnostic, EventCollector, EventType};
use crate::uploader::{
    AttemptObserver, HostingService, TransferSh, UploadError, UploadResult, Uploader,
};
use chrono::Utc;
use serde_json::{Value, json};
use std::future::Future;
use thiserror::Error;

pub const EXIT_UNEXPECTED: i32 = 1;
pub const EXIT_UPLOAD: i32 = 2;
pub const EXIT_ARCHIVE: i32 = 3;
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Error)]
pub enum DiagsError {
    #[error("failed to create diagnostics bundle: {0}")]
    Archive(#[from] ArchiveError),
    #[error("upload failed after {attempts} attempt(s): {error}")]
    Upload { error: UploadError, attempts: u32 },
    #[error("interrupted, upload aborted")]
    Interrupted,
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl DiagsError {
    pub fn exit_code(&self) -> i32 {
        match self {
            DiagsError::Archive(_) => EXIT_ARCHIVE,
            DiagsError::Upload { .. } => EXIT_UPLOAD,
            DiagsError::Interrupted => EXIT_INTERRUPTED,
            DiagsError::Config(_) | DiagsError::Unexpected(_) => EXIT_UNEXPECTED,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DiagsError::Archive(_) => "archive",
            DiagsError::Upload { .. } => "upload",
            DiagsError::Interrupted => "interrupted",
            DiagsError::Config(_) => "config",
            DiagsError::Unexpected(_) => "unexpected",
        }
    }

    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            DiagsError::Upload { .. } => Some(
                "check that this host can reach the upload service, or point --upload-url at a reachable instance",
            ),
            DiagsError::Archive(_) => Some("check that the temporary directory is writable (TMPDIR)"),
            _ => None,
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagsSummary {
    pub url: String,
    pub attempts: u32,
    pub bundle: Value,
    pub artifacts: Vec<Value>,
}

impl DiagsSummary {
    pub fn to_json(&self) -> Value {
        json!({
            "url": self.url,
            "upload": { "status": "uploaded", "attempts": self.attempts },
            "bundle": self.bundle,
            "artifacts": self.artifacts,
        })
    }
}

impl AttemptObserver for EventCollector {
    fn retrying(&mut self, attempt: u32, error: &UploadError) {
        self.event_with_data(
            EventType::UploadRetry,
            json!({ "attempt": attempt, "error": error.to_string() }),
        );
    }
}

/// Build the collector and uploader from resolved configuration.
pub fn build(config: &DiagsConfig) -> Result<(Collector, Uploader<TransferSh>), DiagsError> {
    let collector = Collector::new(crate::collector::default_sources(&config.log_dir))
        .with_command_timeout(config.command_timeout)
        .with_max_file_bytes(config.max_file_bytes);
    let service = TransferSh::new(&config.upload_url)
        .map_err(|err| DiagsError::Unexpected(err.to_string()))?
        .with_max_days(config.max_days);
    let uploader = Uploader::new(service)
        .with_timeout(config.upload_timeout)
        .with_retries(config.retries)
        .with_retry_delay(config.retry_delay);
    Ok((collector, uploader))
}

/// Run one collection pass, archive it and upload the bundle.
pub async fn run<S: HostingService>(
    collector: &Collector,
    uploader: &Uploader<S>,
    events: &mut EventCollector,
) -> Result<DiagsSummary, DiagsError> {
    events.event_with_data(
        EventType::CollectStart,
        json!({ "sources": collector.sources().len() }),
    );
    let artifacts = collector.collect().await;

    let mut failed = 0usize;
    for artifact in &artifacts {
        if let Some(reason) = artifact.outcome().reason() {
            if artifact.is_failed() {
                failed += 1;
            }
            events.diagnostic(
                Diagnostic::warning(format!("{}: {reason}", artifact.name())).with_code("collect"),
            );
        }
    }
    events.event_with_data(
        EventType::CollectComplete,
        json!({ "artifacts": artifacts.len(), "failed": failed }),
    );

    let summaries: Vec<Value> = artifacts
        .iter()
        .map(|artifact| {
            json!({
                "name": artifact.name(),
                "outcome": artifact.outcome().label(),
                "bytes": artifact.content().len(),
            })
        })
        .collect();

    let bundle = archive::archive(&artifacts, Utc::now())?;
    drop(artifacts);
    events.event_with_data(EventType::ArchiveComplete, bundle.to_json());

    events.event_with_message(
        EventType::UploadStart,
        format!("Uploading {} ({} bytes)", bundle.filename(), bundle.size()),
    );
    let result = uploader
        .upload_bytes(bundle.bytes(), bundle.filename(), events)
        .await;

    match result {
        UploadResult::Uploaded { url, attempts } => {
            events.event_with_data(
                EventType::UploadComplete,
                json!({ "url": url, "attempts": attempts }),
            );
            Ok(DiagsSummary {
                url,
                attempts,
                bundle: bundle.to_json(),
                artifacts: summaries,
            })
        }
        UploadResult::Failed { error, attempts } => Err(DiagsError::Upload { error, attempts }),
    }
}

/// Like [`run`], but abandons the pipeline as soon as `cancel` resolves.
///
/// Dropping the pipeline future aborts the in-flight request and kills any
/// running collection commands.
pub async fn run_until<S, C>(
    collector: &Collector,
    uploader: &Uploader<S>,
    events: &mut EventCollector,
    cancel: C,
) -> Result<DiagsSummary, DiagsError>
where
    S: HostingService,
    C: Future<Output = ()>,
{
    tokio::select! {
        result = run(collector, uploader, events) => result,
        _ = cancel => Err(DiagsError::Interrupted),
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed it never resolves.
pub async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
