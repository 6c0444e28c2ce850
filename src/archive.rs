//! Bundle creation.
//!
//! Artifacts are written into a single deflated ZIP staged in a temporary
//! directory. Entry order, timestamps and permissions are fixed, so the bytes
//! depend only on the artifacts themselves.

use crate::collector::{CollectionOutcome, DiagnosticArtifact};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const MANIFEST_ENTRY: &str = "manifest.json";
pub const FAILED_SUFFIX: &str = ".failed";
const MANIFEST_SCHEMA: u32 = 1;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to create staging directory: {0}")]
    Staging(std::io::Error),
    #[error("failed to write bundle {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode bundle: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("failed to encode manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// The archived result of one collection pass.
///
/// The staged copy lives in a temporary directory that is removed when the
/// bundle is dropped.
#[derive(Debug)]
pub struct DiagnosticBundle {
    filename: String,
    bytes: Vec<u8>,
    sha256: String,
    entries: Vec<String>,
    _staging: TempDir,
}

impl DiagnosticBundle {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn to_json(&self) -> Value {
        json!({
            "filename": self.filename,
            "bytes": self.size(),
            "sha256": self.sha256,
            "entries": self.entries,
        })
    }
}

/// `diags-YYYYMMDD_HHMMSS.zip`
pub fn bundle_filename(created_at: DateTime<Utc>) -> String {
    format!("diags-{}.zip", created_at.format("%Y%m%d_%H%M%S"))
}

/// Archive `artifacts` in the given order into a staged bundle.
pub fn archive(
    artifacts: &[DiagnosticArtifact],
    created_at: DateTime<Utc>,
) -> Result<DiagnosticBundle, ArchiveError> {
    let staging = tempfile::Builder::new()
        .prefix("calicoctl-diags-")
        .tempdir()
        .map_err(ArchiveError::Staging)?;
    archive_in(staging, artifacts, created_at)
}

fn archive_in(
    staging: TempDir,
    artifacts: &[DiagnosticArtifact],
    created_at: DateTime<Utc>,
) -> Result<DiagnosticBundle, ArchiveError> {
    let filename = bundle_filename(created_at);
    let (bytes, entries) = encode(artifacts)?;

    let path = staging.path().join(&filename);
    fs::write(&path, &bytes).map_err(|source| ArchiveError::Write { path, source })?;

    let sha256 = hex::encode(Sha256::digest(&bytes));
    Ok(DiagnosticBundle {
        filename,
        bytes,
        sha256,
        entries,
        _staging: staging,
    })
}

/// Encode the ZIP in memory. Returns the bytes and the entry names in write order.
pub fn encode(artifacts: &[DiagnosticArtifact]) -> Result<(Vec<u8>, Vec<String>), ArchiveError> {
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let mut entries = Vec::with_capacity(artifacts.len() + 1);

    let manifest = serde_json::to_vec_pretty(&manifest(artifacts))?;
    writer.start_file(MANIFEST_ENTRY, options)?;
    writer.write_all(&manifest).map_err(zip::result::ZipError::Io)?;
    entries.push(MANIFEST_ENTRY.to_string());

    for artifact in artifacts {
        let entry = entry_name(artifact);
        writer.start_file(entry.as_str(), options)?;
        match artifact.outcome() {
            CollectionOutcome::Failed { reason } => {
                let placeholder = format!(
                    "{} could not be collected at {}\nreason: {}\n",
                    artifact.name(),
                    artifact.collected_at().to_rfc3339(),
                    reason
                );
                writer
                    .write_all(placeholder.as_bytes())
                    .map_err(zip::result::ZipError::Io)?;
            }
            _ => writer
                .write_all(artifact.content())
                .map_err(zip::result::ZipError::Io)?,
        }
        entries.push(entry);
    }

    let bytes = writer.finish()?.into_inner();
    Ok((bytes, entries))
}

/// Failed artifacts are stored as `<name>.failed` placeholders.
pub fn entry_name(artifact: &DiagnosticArtifact) -> String {
    if artifact.is_failed() {
        format!("{}{FAILED_SUFFIX}", artifact.name())
    } else {
        artifact.name().to_string()
    }
}

fn manifest(artifacts: &[DiagnosticArtifact]) -> Value {
    let listed: Vec<Value> = artifacts
        .iter()
        .map(|artifact| {
            json!({
                "name": artifact.name(),
                "entry": entry_name(artifact),
                "outcome": artifact.outcome().label(),
                "reason": artifact.outcome().reason(),
                "bytes": artifact.content().len(),
                "collected_at": artifact.collected_at().to_rfc3339(),
            })
        })
        .collect();
    let failed = artifacts.iter().filter(|a| a.is_failed()).count();
    json!({
        "schema": MANIFEST_SCHEMA,
        "tool": format!("calicoctl {}", env!("CARGO_PKG_VERSION")),
        "artifact_count": artifacts.len(),
        "failed_count": failed,
        "artifacts": listed,
    })
}
