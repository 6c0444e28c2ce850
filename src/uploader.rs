//! Bundle upload to an anonymous file-hosting service.
//!
//! [`HostingService`] is the seam between the retry policy in [`Uploader`]
//! and a concrete service. [`TransferSh`] speaks the transfer.sh protocol:
//! `PUT <base>/<filename>` with the raw bytes, response body is the URL.

use crate::archive::DiagnosticBundle;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Response bodies quoted in errors are cut to this many characters.
const BODY_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("upload timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("network error: {0}")]
    Transport(String),
    #[error("upload rejected with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("upload response did not contain a URL starting with {prefix}: {body:?}")]
    UnparseableResponse { prefix: String, body: String },
}

impl UploadError {
    /// Timeouts, transport errors and server-side failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Timeout(_) | UploadError::Transport(_) => true,
            UploadError::Status { status, .. } => *status >= 500,
            UploadError::UnparseableResponse { .. } => false,
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

/// Outcome of [`Uploader::upload`], consumed once by the reporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadResult {
    Uploaded { url: String, attempts: u32 },
    Failed { error: UploadError, attempts: u32 },
}

impl UploadResult {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadResult::Uploaded { .. })
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            UploadResult::Uploaded { url, .. } => Some(url),
            UploadResult::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&UploadError> {
        match self {
            UploadResult::Uploaded { .. } => None,
            UploadResult::Failed { error, .. } => Some(error),
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            UploadResult::Uploaded { attempts, .. } | UploadResult::Failed { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// A service that stores bytes anonymously and hands back a public URL.
pub trait HostingService {
    /// Every URL returned by the service starts with this prefix.
    fn url_prefix(&self) -> String;

    /// One physical upload attempt.
    fn upload(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> impl Future<Output = Result<String, UploadError>> + Send;
}

/// transfer.sh and compatible self-hosted instances.
#[derive(Debug, Clone)]
pub struct TransferSh {
    client: Client,
    base_url: String,
    max_days: Option<u32>,
}

impl TransferSh {
    pub fn new(base_url: &str) -> Result<Self, UploadError> {
        // The per-attempt limit is enforced by the Uploader; this only bounds connecting.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("calicoctl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| UploadError::Transport(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_days: None,
        })
    }

    /// Ask the service to expire the file after `days` days.
    pub fn with_max_days(mut self, days: Option<u32>) -> Self {
        self.max_days = days;
        self
    }

    async fn put(&self, bytes: Vec<u8>, filename: &str) -> Result<String, UploadError> {
        let url = format!("{}/{}", self.base_url, filename);
        let mut request = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, "application/zip")
            .body(bytes);
        if let Some(days) = self.max_days {
            request = request.header("Max-Days", days.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(UploadError::Status {
                status: status.as_u16(),
                body: excerpt(body.trim()),
            });
        }
        parse_url(&body, &self.url_prefix())
    }
}

impl HostingService for TransferSh {
    fn url_prefix(&self) -> String {
        format!("{}/", self.base_url)
    }

    fn upload(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> impl Future<Output = Result<String, UploadError>> + Send {
        let bytes = bytes.to_vec();
        let filename = filename.to_string();
        async move { self.put(bytes, &filename).await }
    }
}

/// Find the first whitespace-separated token starting with `prefix`.
pub fn parse_url(body: &str, prefix: &str) -> Result<String, UploadError> {
    body.split_whitespace()
        .map(|token| token.trim_matches(|c| c == '"' || c == '\'' || c == '<' || c == '>'))
        .find(|token| token.len() > prefix.len() && token.starts_with(prefix))
        .map(str::to_string)
        .ok_or_else(|| UploadError::UnparseableResponse {
            prefix: prefix.to_string(),
            body: excerpt(body.trim()),
        })
}

fn excerpt(body: &str) -> String {
    if body.chars().count() <= BODY_EXCERPT_CHARS {
        return body.to_string();
    }
    let mut cut: String = body.chars().take(BODY_EXCERPT_CHARS).collect();
    cut.push_str("...");
    cut
}

/// Observer for upload attempts, used to surface retries as events.
pub trait AttemptObserver {
    fn retrying(&mut self, attempt: u32, error: &UploadError);
}

impl AttemptObserver for () {
    fn retrying(&mut self, _attempt: u32, _error: &UploadError) {}
}

/// Bounded-retry upload driver.
#[derive(Debug, Clone)]
pub struct Uploader<S> {
    service: S,
    timeout: Duration,
    retries: u32,
    retry_delay: Duration,
}

impl<S: HostingService> Uploader<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            timeout: Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS),
            retries: crate::config::DEFAULT_RETRIES,
            retry_delay: Duration::from_millis(crate::config::DEFAULT_RETRY_DELAY_MS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub async fn upload(&self, bundle: &DiagnosticBundle) -> UploadResult {
        self.upload_bytes(bundle.bytes(), bundle.filename(), &mut ())
            .await
    }

    /// Upload with at most `retries + 1` physical attempts.
    ///
    /// The first parsed URL ends the loop and is the only one reported.
    pub async fn upload_bytes(
        &self,
        bytes: &[u8],
        filename: &str,
        observer: &mut impl AttemptObserver,
    ) -> UploadResult {
        let max_attempts = self.retries.saturating_add(1);
        let mut attempts = 0;
        loop {
            attempts += 1;
            let error = match tokio::time::timeout(self.timeout, self.service.upload(bytes, filename))
                .await
            {
                Ok(Ok(url)) => return UploadResult::Uploaded { url, attempts },
                Ok(Err(error)) => error,
                Err(_) => UploadError::Timeout(self.timeout),
            };

            if attempts >= max_attempts || !error.is_retryable() {
                return UploadResult::Failed { error, attempts };
            }
            observer.retrying(attempts + 1, &error);
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays scripted results; `None` means "never answer".
    struct Scripted {
        calls: AtomicU32,
        script: Mutex<Vec<Option<Result<String, UploadError>>>>,
    }

    impl Scripted {
        fn new(mut script: Vec<Option<Result<String, UploadError>>>) -> Self {
            script.reverse();
            Self {
                calls: AtomicU32::new(0),
                script: Mutex::new(script),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl HostingService for Scripted {
        fn url_prefix(&self) -> String {
            "https://transfer.sh/".to_string()
        }

        fn upload(
            &self,
            _bytes: &[u8],
            _filename: &str,
        ) -> impl Future<Output = Result<String, UploadError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop().flatten();
            async move {
                match next {
                    Some(result) => result,
                    None => std::future::pending().await,
                }
            }
        }
    }

    fn transport() -> Option<Result<String, UploadError>> {
        Some(Err(UploadError::Transport("connection refused".into())))
    }

    fn uploader(service: Scripted, retries: u32) -> Uploader<Scripted> {
        Uploader::new(service)
            .with_retries(retries)
            .with_timeout(Duration::from_millis(50))
            .with_retry_delay(Duration::from_millis(1))
    }

    #[derive(Default)]
    struct Recorded(Vec<u32>);

    impl AttemptObserver for Recorded {
        fn retrying(&mut self, attempt: u32, _error: &UploadError) {
            self.0.push(attempt);
        }
    }

    #[tokio::test]
    async fn retry_bound_is_respected() {
        let up = uploader(Scripted::new(vec![transport(); 10]), 2);
        let mut seen = Recorded::default();
        let result = up.upload_bytes(b"zip", "diags.zip", &mut seen).await;

        assert_eq!(up.service().calls(), 3);
        assert_eq!(result.attempts(), 3);
        assert_eq!(seen.0, vec![2, 3]);
        assert!(matches!(result.error(), Some(UploadError::Transport(_))));
    }

    #[tokio::test]
    async fn first_success_wins() {
        let up = uploader(
            Scripted::new(vec![
                transport(),
                Some(Ok("https://transfer.sh/a/diags.zip".into())),
                Some(Ok("https://transfer.sh/b/diags.zip".into())),
            ]),
            3,
        );
        let result = up.upload_bytes(b"zip", "diags.zip", &mut ()).await;
        assert_eq!(
            result,
            UploadResult::Uploaded {
                url: "https://transfer.sh/a/diags.zip".into(),
                attempts: 2
            }
        );
        assert_eq!(up.service().calls(), 2);
    }

    #[tokio::test]
    async fn huge_retry_count_does_not_overflow() {
        let up = uploader(
            Scripted::new(vec![
                transport(),
                Some(Ok("https://transfer.sh/m/diags.zip".into())),
            ]),
            u32::MAX,
        );
        let result = up.upload_bytes(b"zip", "diags.zip", &mut ()).await;
        assert_eq!(result.url(), Some("https://transfer.sh/m/diags.zip"));
        assert_eq!(result.attempts(), 2);
    }

    #[tokio::test]
    async fn stalled_attempt_times_out() {
        let up = uploader(Scripted::new(vec![None, None]), 1);
        let started = std::time::Instant::now();
        let result = up.upload_bytes(b"zip", "diags.zip", &mut ()).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(result.attempts(), 2);
        assert!(matches!(result.error(), Some(UploadError::Timeout(_))));
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let up = uploader(
            Scripted::new(vec![
                Some(Err(UploadError::Status {
                    status: 400,
                    body: "bad request".into(),
                })),
                Some(Ok("https://transfer.sh/x/diags.zip".into())),
            ]),
            3,
        );
        let result = up.upload_bytes(b"zip", "diags.zip", &mut ()).await;
        assert_eq!(result.attempts(), 1);
        assert!(!result.is_success());
        assert!(result.url().is_none());
    }

    #[tokio::test]
    async fn uploads_archived_bundle() {
        let bundle = crate::archive::archive(&[], chrono::Utc::now()).unwrap();
        let up = uploader(
            Scripted::new(vec![Some(Ok("https://transfer.sh/z/diags.zip".into()))]),
            0,
        );
        let result = up.upload(&bundle).await;
        assert_eq!(result.url(), Some("https://transfer.sh/z/diags.zip"));
        assert_eq!(up.service().calls(), 1);
    }

    #[test]
    fn parses_url_from_body() {
        let prefix = "https://transfer.sh/";
        assert_eq!(
            parse_url("https://transfer.sh/Ab12/diags-20160314_150926.zip\n", prefix).unwrap(),
            "https://transfer.sh/Ab12/diags-20160314_150926.zip"
        );
        assert_eq!(
            parse_url("Uploaded: \"https://transfer.sh/x/y.zip\"", prefix).unwrap(),
            "https://transfer.sh/x/y.zip"
        );
        assert!(matches!(
            parse_url("<html>rate limited</html>", prefix),
            Err(UploadError::UnparseableResponse { .. })
        ));
        assert!(parse_url("https://transfer.sh/", prefix).is_err());
        assert!(parse_url("https://evil.example/transfer.sh/", prefix).is_err());
    }

    #[test]
    fn retryable_classification() {
        assert!(UploadError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(
            UploadError::Status {
                status: 503,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !UploadError::UnparseableResponse {
                prefix: String::new(),
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !UploadError::Status {
                status: 413,
                body: String::new()
            }
            .is_retryable()
        );
    }
}
