//! Diagnostic collection.
//!
//! Each [`DiagnosticSource`] is gathered on its own tokio task and turned into
//! one or more [`DiagnosticArtifact`]s. A source that cannot be collected is
//! recorded as a failed artifact; it never aborts the pass.

use crate::redact::Redactor;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// How much of a failed command's stderr is kept in the failure reason.
const STDERR_EXCERPT_BYTES: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionOutcome {
    Success,
    /// Some content was captured but it is incomplete.
    Partial { reason: String },
    Failed { reason: String },
}

impl CollectionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CollectionOutcome::Success => "success",
            CollectionOutcome::Partial { .. } => "partial",
            CollectionOutcome::Failed { .. } => "failed",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            CollectionOutcome::Success => None,
            CollectionOutcome::Partial { reason } | CollectionOutcome::Failed { reason } => {
                Some(reason)
            }
        }
    }
}

/// One named piece of collected data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticArtifact {
    name: String,
    content: Vec<u8>,
    collected_at: DateTime<Utc>,
    outcome: CollectionOutcome,
}

impl DiagnosticArtifact {
    pub fn success(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            collected_at: Utc::now(),
            outcome: CollectionOutcome::Success,
        }
    }

    pub fn partial(
        name: impl Into<String>,
        content: impl Into<Vec<u8>>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            outcome: CollectionOutcome::Partial {
                reason: reason.into(),
            },
            ..Self::success(name, content)
        }
    }

    /// Failed artifacts keep their name but carry no content.
    pub fn failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            outcome: CollectionOutcome::Failed {
                reason: reason.into(),
            },
            ..Self::success(name, Vec::new())
        }
    }

    pub fn collected_at_time(mut self, at: DateTime<Utc>) -> Self {
        self.collected_at = at;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn collected_at(&self) -> DateTime<Utc> {
        self.collected_at
    }

    pub fn outcome(&self) -> &CollectionOutcome {
        &self.outcome
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, CollectionOutcome::Failed { .. })
    }
}

/// A place diagnostic data comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticSource {
    /// Run a read-only command and keep its stdout.
    Command {
        name: String,
        program: String,
        args: Vec<String>,
    },
    File {
        name: String,
        path: PathBuf,
    },
    /// Every regular file under `path`, named `<name>/<relative path>`.
    LogDirectory {
        name: String,
        path: PathBuf,
    },
    /// Process environment with secrets redacted.
    Environment,
    /// calicoctl version and platform.
    Version,
    /// Time of collection.
    Date,
}

impl DiagnosticSource {
    pub fn command(name: &str, program: &str, args: &[&str]) -> Self {
        DiagnosticSource::Command {
            name: name.to_string(),
            program: program.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    pub fn file(name: &str, path: impl Into<PathBuf>) -> Self {
        DiagnosticSource::File {
            name: name.to_string(),
            path: path.into(),
        }
    }

    pub fn log_directory(name: &str, path: impl Into<PathBuf>) -> Self {
        DiagnosticSource::LogDirectory {
            name: name.to_string(),
            path: path.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            DiagnosticSource::Command { name, .. }
            | DiagnosticSource::File { name, .. }
            | DiagnosticSource::LogDirectory { name, .. } => name,
            DiagnosticSource::Environment => "environment.json",
            DiagnosticSource::Version => "version.json",
            DiagnosticSource::Date => "date.txt",
        }
    }
}

impl fmt::Display for DiagnosticSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticSource::Command { program, args, .. } => {
                write!(f, "`{program}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, "`")
            }
            DiagnosticSource::File { path, .. } | DiagnosticSource::LogDirectory { path, .. } => {
                write!(f, "{}", path.display())
            }
            other => write!(f, "{}", other.name()),
        }
    }
}

/// The host state gathered by `calicoctl diags`.
pub fn default_sources(log_dir: &Path) -> Vec<DiagnosticSource> {
    vec![
        DiagnosticSource::Date,
        DiagnosticSource::Version,
        DiagnosticSource::Environment,
        DiagnosticSource::command("hostname.txt", "hostname", &[]),
        DiagnosticSource::command("dmesg.txt", "dmesg", &[]),
        DiagnosticSource::command("ip_addr.txt", "ip", &["addr"]),
        DiagnosticSource::command("ip_route.txt", "ip", &["route"]),
        DiagnosticSource::command("ip6_route.txt", "ip", &["-6", "route"]),
        DiagnosticSource::command("ip_rule.txt", "ip", &["rule"]),
        DiagnosticSource::command("iptables_save.txt", "iptables-save", &["-c"]),
        DiagnosticSource::command("ip6tables_save.txt", "ip6tables-save", &["-c"]),
        DiagnosticSource::command("ipset_list.txt", "ipset", &["list"]),
        DiagnosticSource::command("sockets.txt", "ss", &["-tanp"]),
        DiagnosticSource::command("processes.txt", "ps", &["auxww"]),
        DiagnosticSource::file("etc_hosts.txt", "/etc/hosts"),
        DiagnosticSource::file("resolv_conf.txt", "/etc/resolv.conf"),
        DiagnosticSource::file("kernel_version.txt", "/proc/version"),
        DiagnosticSource::log_directory("logs", log_dir),
    ]
}

/// Gathers artifacts from a fixed list of sources.
#[derive(Debug, Clone)]
pub struct Collector {
    sources: Vec<DiagnosticSource>,
    command_timeout: Duration,
    max_file_bytes: u64,
    redactor: Redactor,
}

impl Collector {
    pub fn new(sources: Vec<DiagnosticSource>) -> Self {
        Self {
            sources,
            command_timeout: Duration::from_secs(crate::config::DEFAULT_COMMAND_TIMEOUT_SECS),
            max_file_bytes: crate::config::DEFAULT_MAX_FILE_BYTES,
            redactor: Redactor::default(),
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    pub fn sources(&self) -> &[DiagnosticSource] {
        &self.sources
    }

    /// Collect every source concurrently and wait for all of them.
    ///
    /// The result is sorted by artifact name and always holds at least one
    /// artifact per source.
    pub async fn collect(&self) -> Vec<DiagnosticArtifact> {
        let handles: Vec<_> = self
            .sources
            .iter()
            .cloned()
            .map(|source| {
                let collector = self.clone();
                let name = source.name().to_string();
                let handle = tokio::spawn(async move { collector.collect_source(&source).await });
                (name, handle)
            })
            .collect();

        let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let mut artifacts = Vec::new();
        for (name, joined) in names.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(collected) => artifacts.extend(collected),
                Err(err) => artifacts.push(DiagnosticArtifact::failed(
                    name,
                    format!("collection task aborted: {err}"),
                )),
            }
        }

        artifacts.sort_by(|a, b| a.name.cmp(&b.name));
        artifacts
    }

    async fn collect_source(&self, source: &DiagnosticSource) -> Vec<DiagnosticArtifact> {
        match source {
            DiagnosticSource::Command {
                name,
                program,
                args,
            } => vec![self.collect_command(name, program, args, source).await],
            DiagnosticSource::File { name, path } => vec![self.collect_file(name, path).await],
            DiagnosticSource::LogDirectory { name, path } => {
                self.collect_directory(name, path).await
            }
            DiagnosticSource::Environment => vec![self.environment_artifact(std::env::vars_os())],
            DiagnosticSource::Version => vec![collect_version()],
            DiagnosticSource::Date => vec![DiagnosticArtifact::success(
                source.name(),
                format!("{}\n", Utc::now().to_rfc3339()),
            )],
        }
    }

    async fn collect_command(
        &self,
        name: &str,
        program: &str,
        args: &[String],
        source: &DiagnosticSource,
    ) -> DiagnosticArtifact {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.command_timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return DiagnosticArtifact::failed(name, format!("failed to run {source}: {err}"));
            }
            Err(_) => {
                return DiagnosticArtifact::failed(
                    name,
                    format!(
                        "{source} did not finish within {}s",
                        self.command_timeout.as_secs_f64()
                    ),
                );
            }
        };

        let stdout = self.redact_bytes(&output.stdout);
        if output.status.success() {
            return DiagnosticArtifact::success(name, stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let excerpt = excerpt(stderr.trim(), STDERR_EXCERPT_BYTES);
        let reason = if excerpt.is_empty() {
            format!("{source} exited with {}", output.status)
        } else {
            format!("{source} exited with {}: {excerpt}", output.status)
        };
        if stdout.is_empty() {
            DiagnosticArtifact::failed(name, reason)
        } else {
            DiagnosticArtifact::partial(name, stdout, reason)
        }
    }

    async fn collect_file(&self, name: &str, path: &Path) -> DiagnosticArtifact {
        match self.read_capped(path).await {
            Ok((bytes, false)) => DiagnosticArtifact::success(name, self.redact_bytes(&bytes)),
            Ok((bytes, true)) => DiagnosticArtifact::partial(
                name,
                self.redact_bytes(&bytes),
                format!("truncated to {} bytes", self.max_file_bytes),
            ),
            Err(err) => {
                DiagnosticArtifact::failed(name, format!("failed to read {}: {err}", path.display()))
            }
        }
    }

    async fn collect_directory(&self, name: &str, root: &Path) -> Vec<DiagnosticArtifact> {
        let files = match list_files(root).await {
            Ok(files) => files,
            Err(err) => {
                return vec![DiagnosticArtifact::failed(
                    name,
                    format!("failed to read log directory {}: {err}", root.display()),
                )];
            }
        };

        if files.is_empty() {
            return vec![DiagnosticArtifact::success(
                name,
                format!("no log files under {}\n", root.display()),
            )];
        }

        let mut taken = HashSet::with_capacity(files.len());
        let mut artifacts = Vec::with_capacity(files.len());
        for file in files {
            let relative = file
                .strip_prefix(root)
                .unwrap_or(&file)
                .components()
                .map(|part| part.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let artifact_name = unique_name(&mut taken, format!("{name}/{relative}"));
            artifacts.push(self.collect_file(&artifact_name, &file).await);
        }
        artifacts
    }

    /// Environment as JSON, with secret values replaced.
    fn environment_artifact<I, K, V>(&self, vars: I) -> DiagnosticArtifact
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        let environment: BTreeMap<String, String> = vars
            .into_iter()
            .map(|(key, value)| {
                let key = key.as_ref().to_string_lossy().into_owned();
                let (value, _) = self
                    .redactor
                    .redact_pair(&key, &value.as_ref().to_string_lossy());
                (key, value)
            })
            .collect();
        match serde_json::to_vec_pretty(&json!({ "environment": environment })) {
            Ok(bytes) => DiagnosticArtifact::success("environment.json", bytes),
            Err(err) => DiagnosticArtifact::failed("environment.json", err.to_string()),
        }
    }

    async fn read_capped(&self, path: &Path) -> std::io::Result<(Vec<u8>, bool)> {
        let file = tokio::fs::File::open(path).await?;
        let mut buffer = Vec::new();
        // Read one byte past the cap to detect truncation.
        file.take(self.max_file_bytes + 1)
            .read_to_end(&mut buffer)
            .await?;
        let truncated = buffer.len() as u64 > self.max_file_bytes;
        if truncated {
            buffer.truncate(self.max_file_bytes as usize);
        }
        Ok((buffer, truncated))
    }

    /// Redact UTF-8 content; binary content is kept as-is.
    fn redact_bytes(&self, bytes: &[u8]) -> Vec<u8> {
        match std::str::from_utf8(bytes) {
            Ok(text) => self.redactor.redact_text(text).0.into_bytes(),
            Err(_) => bytes.to_vec(),
        }
    }
}

fn collect_version() -> DiagnosticArtifact {
    let version = json!({
        "calicoctl_version": env!("CARGO_PKG_VERSION"),
        "os": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "family": std::env::consts::FAMILY,
    });
    match serde_json::to_vec_pretty(&version) {
        Ok(bytes) => DiagnosticArtifact::success("version.json", bytes),
        Err(err) => DiagnosticArtifact::failed("version.json", err.to_string()),
    }
}

/// Regular files below `root`, depth first. Symlinks are not followed.
async fn list_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let metadata = tokio::fs::metadata(root).await?;
    if !metadata.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a directory",
        ));
    }

    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if dir == root => return Err(err),
            Err(_) => continue,
        };
        // Entries that cannot be read are skipped; the rest of the walk goes on.
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Lossy file names can collide; later duplicates get a `~N` suffix.
fn unique_name(taken: &mut HashSet<String>, candidate: String) -> String {
    if taken.insert(candidate.clone()) {
        return candidate;
    }
    let mut counter = 1u32;
    loop {
        let renamed = format!("{candidate}~{counter}");
        if taken.insert(renamed.clone()) {
            return renamed;
        }
        counter += 1;
    }
}

fn excerpt(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(artifacts: &[DiagnosticArtifact]) -> Vec<&str> {
        artifacts.iter().map(|a| a.name()).collect()
    }

    #[tokio::test]
    async fn failing_source_does_not_abort_others() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("present.txt");
        std::fs::write(&present, "hello\n").unwrap();

        let collector = Collector::new(vec![
            DiagnosticSource::file("b_missing.txt", temp.path().join("missing.txt")),
            DiagnosticSource::command("c_no_such_tool.txt", "calicoctl-no-such-tool", &[]),
            DiagnosticSource::file("a_present.txt", &present),
        ]);
        let artifacts = collector.collect().await;

        assert_eq!(
            names(&artifacts),
            vec!["a_present.txt", "b_missing.txt", "c_no_such_tool.txt"]
        );
        assert_eq!(artifacts[0].outcome(), &CollectionOutcome::Success);
        assert_eq!(artifacts[0].content(), b"hello\n");
        assert!(artifacts[1].is_failed());
        assert!(artifacts[1].content().is_empty());
        assert!(artifacts[2].is_failed());
        assert!(
            artifacts[2]
                .outcome()
                .reason()
                .unwrap()
                .contains("calicoctl-no-such-tool")
        );
    }

    #[tokio::test]
    async fn empty_source_list_collects_nothing() {
        assert!(Collector::new(Vec::new()).collect().await.is_empty());
    }

    #[tokio::test]
    async fn log_directory_is_walked_recursively() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("felix")).unwrap();
        std::fs::write(temp.path().join("felix/current"), "felix started\n").unwrap();
        std::fs::write(temp.path().join("bird.log"), "bird up\n").unwrap();

        let collector = Collector::new(vec![DiagnosticSource::log_directory(
            "logs",
            temp.path(),
        )]);
        let artifacts = collector.collect().await;
        assert_eq!(names(&artifacts), vec!["logs/bird.log", "logs/felix/current"]);
        assert!(artifacts.iter().all(|a| !a.is_failed()));
    }

    #[tokio::test]
    async fn missing_log_directory_is_one_failed_artifact() {
        let temp = TempDir::new().unwrap();
        let collector = Collector::new(vec![DiagnosticSource::log_directory(
            "logs",
            temp.path().join("absent"),
        )]);
        let artifacts = collector.collect().await;
        assert_eq!(names(&artifacts), vec!["logs"]);
        assert!(artifacts[0].is_failed());
    }

    #[tokio::test]
    async fn empty_log_directory_leaves_a_marker() {
        let temp = TempDir::new().unwrap();
        let collector = Collector::new(vec![DiagnosticSource::log_directory(
            "logs",
            temp.path(),
        )]);
        let artifacts = collector.collect().await;
        assert_eq!(names(&artifacts), vec!["logs"]);
        assert_eq!(artifacts[0].outcome(), &CollectionOutcome::Success);
        let text = String::from_utf8(artifacts[0].content().to_vec()).unwrap();
        assert!(text.starts_with("no log files under"));

        let bundle = crate::archive::archive(&artifacts, Utc::now()).unwrap();
        assert_eq!(bundle.entries(), &["manifest.json", "logs"]);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn lossy_log_names_stay_unique() {
        use std::os::unix::ffi::OsStrExt;

        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(OsStr::from_bytes(b"felix\xfe.log")), "a\n").unwrap();
        std::fs::write(temp.path().join(OsStr::from_bytes(b"felix\xff.log")), "b\n").unwrap();

        let collector = Collector::new(vec![DiagnosticSource::log_directory(
            "logs",
            temp.path(),
        )]);
        let artifacts = collector.collect().await;
        assert_eq!(
            names(&artifacts),
            vec!["logs/felix\u{FFFD}.log", "logs/felix\u{FFFD}.log~1"]
        );

        let bundle = crate::archive::archive(&artifacts, Utc::now()).unwrap();
        assert_eq!(bundle.entries().len(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_subdirectory_keeps_other_logs() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let locked = temp.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::write(temp.path().join("bird.log"), "bird up\n").unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        let collector = Collector::new(vec![DiagnosticSource::log_directory(
            "logs",
            temp.path(),
        )]);
        let artifacts = collector.collect().await;
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(names(&artifacts).contains(&"logs/bird.log"));
        assert!(artifacts.iter().all(|a| !a.is_failed()));
    }

    #[test]
    fn colliding_names_get_a_suffix() {
        let mut taken = HashSet::new();
        assert_eq!(unique_name(&mut taken, "logs/a".into()), "logs/a");
        assert_eq!(unique_name(&mut taken, "logs/a".into()), "logs/a~1");
        assert_eq!(unique_name(&mut taken, "logs/a".into()), "logs/a~2");
    }

    #[test]
    fn environment_secrets_are_redacted() {
        let collector = Collector::new(Vec::new());
        let artifact = collector.environment_artifact([
            ("CALICO_API_TOKEN", "abc"),
            ("HOSTNAME", "node-1"),
            ("ETCD_ENDPOINTS", "https://user:pw@10.0.0.1:2379"),
        ]);
        assert_eq!(artifact.name(), "environment.json");

        let parsed: serde_json::Value = serde_json::from_slice(artifact.content()).unwrap();
        let environment = &parsed["environment"];
        assert_eq!(environment["CALICO_API_TOKEN"], crate::redact::REDACTED);
        assert_eq!(environment["HOSTNAME"], "node-1");
        assert_eq!(
            environment["ETCD_ENDPOINTS"],
            "https://<redacted>@10.0.0.1:2379"
        );
        assert!(!String::from_utf8_lossy(artifact.content()).contains("abc"));
    }

    #[tokio::test]
    async fn large_files_are_truncated_as_partial() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("big.log");
        std::fs::write(&path, "x".repeat(64)).unwrap();

        let collector =
            Collector::new(vec![DiagnosticSource::file("big.log", &path)]).with_max_file_bytes(16);
        let artifacts = collector.collect().await;
        assert_eq!(artifacts[0].content().len(), 16);
        assert_eq!(artifacts[0].outcome().label(), "partial");
    }

    #[tokio::test]
    async fn file_content_is_redacted() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("calico.env");
        std::fs::write(&path, "ETCD_ENDPOINTS=http://127.0.0.1:2379\nAPI_TOKEN=abc\n").unwrap();

        let collector = Collector::new(vec![DiagnosticSource::file("calico.env", &path)]);
        let artifacts = collector.collect().await;
        let text = String::from_utf8(artifacts[0].content().to_vec()).unwrap();
        assert!(text.contains("ETCD_ENDPOINTS=http://127.0.0.1:2379"));
        assert!(text.contains("API_TOKEN=<redacted>"));
        assert!(!text.contains("abc"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_outcomes() {
        let collector = Collector::new(vec![
            DiagnosticSource::command("ok.txt", "sh", &["-c", "echo routes"]),
            DiagnosticSource::command("partial.txt", "sh", &["-c", "echo some; echo boom >&2; exit 3"]),
            DiagnosticSource::command("failed.txt", "sh", &["-c", "echo denied >&2; exit 1"]),
        ]);
        let artifacts = collector.collect().await;
        assert_eq!(names(&artifacts), vec!["failed.txt", "ok.txt", "partial.txt"]);

        assert!(artifacts[0].is_failed());
        assert!(artifacts[0].outcome().reason().unwrap().contains("denied"));
        assert_eq!(artifacts[1].content(), b"routes\n");
        assert_eq!(artifacts[2].outcome().label(), "partial");
        assert_eq!(artifacts[2].content(), b"some\n");
        assert!(artifacts[2].outcome().reason().unwrap().contains("boom"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_times_out() {
        let collector = Collector::new(vec![DiagnosticSource::command(
            "slow.txt",
            "sleep",
            &["5"],
        )])
        .with_command_timeout(Duration::from_millis(100));

        let started = std::time::Instant::now();
        let artifacts = collector.collect().await;
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(artifacts[0].is_failed());
        assert!(artifacts[0].outcome().reason().unwrap().contains("did not finish"));
    }

    #[tokio::test]
    async fn generated_sources() {
        let collector = Collector::new(vec![
            DiagnosticSource::Version,
            DiagnosticSource::Environment,
            DiagnosticSource::Date,
        ]);
        let artifacts = collector.collect().await;
        assert_eq!(
            names(&artifacts),
            vec!["date.txt", "environment.json", "version.json"]
        );
        let version: serde_json::Value = serde_json::from_slice(artifacts[2].content()).unwrap();
        assert_eq!(version["calicoctl_version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn default_sources_have_unique_names() {
        let sources = default_sources(Path::new("/var/log/calico"));
        let mut names: Vec<_> = sources.iter().map(|s| s.name()).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
