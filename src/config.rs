//! Configuration for `calicoctl diags`.
//!
//! ## Priority
//! 1. Command-line flags (clap also reads the `CALICOCTL_*` environment variables)
//! 2. Config file: `$CALICOCTL_HOME/diags.toml`, falling back to `~/.calicoctl/diags.toml`
//! 3. Built-in defaults

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_UPLOAD_URL: &str = "https://transfer.sh";
pub const DEFAULT_LOG_DIR: &str = "/var/log/calico";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_RETRIES: u32 = 1;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_FILE_BYTES: u64 = 16 * 1024 * 1024;
/// Upper bound on retries; a CLI invocation should never loop for long.
pub const MAX_RETRIES: u32 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid upload URL {0:?}: expected an http:// or https:// base URL")]
    UploadUrl(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("retries must be at most 5, got {0}")]
    TooManyRetries(u32),
}

/// Values loaded from `diags.toml`. Every field is optional.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub upload_url: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub max_days: Option<u32>,
    pub command_timeout_secs: Option<u64>,
    pub max_file_bytes: Option<u64>,
}

impl FileConfig {
    /// Load from `path`; a missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Overrides coming from the command line (or env through clap).
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub upload_url: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub retries: Option<u32>,
    pub max_days: Option<u32>,
    pub command_timeout_secs: Option<u64>,
}

/// Fully resolved settings for one diags run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagsConfig {
    pub upload_url: String,
    pub log_dir: PathBuf,
    pub upload_timeout: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
    pub max_days: Option<u32>,
    pub command_timeout: Duration,
    pub max_file_bytes: u64,
}

impl Default for DiagsConfig {
    fn default() -> Self {
        Self {
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            upload_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retries: DEFAULT_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_days: None,
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

impl DiagsConfig {
    /// Resolve the config file location, load it and apply `overrides` on top.
    pub fn load(overrides: Overrides) -> Result<Self, ConfigError> {
        let file = match config_file_path() {
            Some(path) => FileConfig::load(&path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file, overrides)
    }

    pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let upload_url = overrides
            .upload_url
            .or(file.upload_url)
            .unwrap_or(defaults.upload_url);
        let upload_url = upload_url.trim().trim_end_matches('/').to_string();
        if !(upload_url.starts_with("http://") || upload_url.starts_with("https://"))
            || upload_url.ends_with(':')
        {
            return Err(ConfigError::UploadUrl(upload_url));
        }

        let timeout_secs = overrides.timeout_secs.or(file.timeout_secs);
        if timeout_secs == Some(0) {
            return Err(ConfigError::Zero("upload timeout"));
        }
        let command_timeout_secs = overrides.command_timeout_secs.or(file.command_timeout_secs);
        if command_timeout_secs == Some(0) {
            return Err(ConfigError::Zero("command timeout"));
        }
        if file.max_file_bytes == Some(0) {
            return Err(ConfigError::Zero("max_file_bytes"));
        }

        let retries = overrides.retries.or(file.retries).unwrap_or(defaults.retries);
        if retries > MAX_RETRIES {
            return Err(ConfigError::TooManyRetries(retries));
        }

        Ok(Self {
            upload_url,
            log_dir: overrides.log_dir.or(file.log_dir).unwrap_or(defaults.log_dir),
            upload_timeout: timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.upload_timeout),
            retries,
            retry_delay: file
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
            max_days: overrides.max_days.or(file.max_days),
            command_timeout: command_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.command_timeout),
            max_file_bytes: file.max_file_bytes.unwrap_or(defaults.max_file_bytes),
        })
    }
}

/// `$CALICOCTL_HOME/diags.toml` or `~/.calicoctl/diags.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    if let Some(home) = std::env::var_os("CALICOCTL_HOME") {
        return Some(PathBuf::from(home).join("diags.toml"));
    }
    dirs::home_dir().map(|home| home.join(".calicoctl").join("diags.toml"))
}
