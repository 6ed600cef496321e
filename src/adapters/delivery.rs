//! Delivery of packaged messages and best-effort failure reports.
//!
//! With network delivery configured the PEM text is POSTed as the form
//! field `p7m` on a spawned task; the caller does not wait for it. Without
//! it, the text goes to a clipboard synchronously. A failed POST falls back
//! to the clipboard so the user keeps the packaged text.
//!
//! Failure reports are spawned too. Their handles are kept so a short-lived
//! caller can [`DeliveryService::flush`] them before the runtime shuts down.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::infra::error::{SigningError, SigningResult};

/// Form field carrying the PEM text.
pub const P7M_FIELD: &str = "p7m";

/// Prefix of the `message` field in failure reports.
pub const FAILURE_MESSAGE_PREFIX: &str = "FREE_TEXT_ERROR:";

/// Minimal HTTP surface used by delivery and registration.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST `fields` as `application/x-www-form-urlencoded`.
    async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
        timeout: Duration,
    ) -> SigningResult<()>;

    async fn get_json(&self, url: &str, timeout: Duration) -> SigningResult<serde_json::Value>;
}

/// `reqwest`-backed transport.
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> SigningResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("confirm-signer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SigningError::NetworkError(format!("HTTP client setup failed: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
        timeout: Duration,
    ) -> SigningResult<()> {
        let resp = self
            .http
            .post(url)
            .timeout(timeout)
            .form(fields)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SigningError::NetworkError(format!(
                "{url} answered HTTP {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn get_json(&self, url: &str, timeout: Duration) -> SigningResult<serde_json::Value> {
        let resp = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}

/// Local clipboard-equivalent.
pub trait Clipboard: Send + Sync {
    fn set_text(&self, label: &str, text: &str) -> SigningResult<()>;
}

/// Keeps the last text in memory.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    content: Mutex<Option<(String, String)>>,
}

impl MemoryClipboard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last `(label, text)` pair, if any.
    #[must_use]
    pub fn contents(&self) -> Option<(String, String)> {
        self.content.lock().ok().and_then(|c| c.clone())
    }
}

impl Clipboard for MemoryClipboard {
    fn set_text(&self, label: &str, text: &str) -> SigningResult<()> {
        let mut guard = self
            .content
            .lock()
            .map_err(|_| SigningError::DeliveryFailed("clipboard lock poisoned".to_string()))?;
        *guard = Some((label.to_string(), text.to_string()));
        Ok(())
    }
}

/// Writes the text to a file, replacing previous content.
#[derive(Debug, Clone)]
pub struct FileClipboard {
    path: PathBuf,
}

impl FileClipboard {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Clipboard for FileClipboard {
    fn set_text(&self, label: &str, text: &str) -> SigningResult<()> {
        std::fs::write(&self.path, text).map_err(|e| {
            SigningError::DeliveryFailed(format!(
                "cannot write {label} to {}: {e}",
                self.path.display()
            ))
        })?;
        log::info!("{label} written to {}", self.path.display());
        Ok(())
    }
}

/// Prints the text to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutClipboard;

impl Clipboard for StdoutClipboard {
    fn set_text(&self, _label: &str, text: &str) -> SigningResult<()> {
        print!("{text}");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Network delivery configured and reachable.
    pub connected: bool,
    pub p7m_url: String,
    pub failure_url: String,
    pub post_timeout: Duration,
    pub device_info: String,
}

/// How a packaged message left the protocol.
pub enum Delivery {
    /// POST in flight; resolves to how it ended.
    Network(JoinHandle<DeliveryStatus>),
    Clipboard,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Delivery::Network(_) => f.write_str("Delivery::Network"),
            Delivery::Clipboard => f.write_str("Delivery::Clipboard"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Posted,
    /// POST failed; the text was put on the clipboard instead.
    FellBackToClipboard(String),
}

#[derive(Clone)]
pub struct DeliveryService {
    transport: Arc<dyn HttpTransport>,
    clipboard: Arc<dyn Clipboard>,
    config: DeliveryConfig,
    reports: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl DeliveryService {
    #[must_use]
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        clipboard: Arc<dyn Clipboard>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            transport,
            clipboard,
            config,
            reports: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Route `pem`: spawned POST when connected, clipboard otherwise.
    ///
    /// # Errors
    /// Only a failing synchronous clipboard write is an error.
    pub fn deliver(&self, pem: &str) -> SigningResult<Delivery> {
        if self.config.connected {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let transport = Arc::clone(&self.transport);
                let clipboard = Arc::clone(&self.clipboard);
                let url = self.config.p7m_url.clone();
                let timeout = self.config.post_timeout;
                let text = pem.to_string();
                log::debug!("Posting {} byte(s) of PKCS7 text to {url}", text.len());
                let task = runtime.spawn(async move {
                    let fields = [(P7M_FIELD.to_string(), text.clone())];
                    match transport.post_form(&url, &fields, timeout).await {
                        Ok(()) => {
                            log::info!("Signed message delivered to {url}");
                            DeliveryStatus::Posted
                        }
                        Err(e) => {
                            log::warn!("Failed to send p7m: {e}");
                            if let Err(clip) = clipboard.set_text("PKCS7", &text) {
                                log::error!("Clipboard fallback failed too: {clip}");
                            }
                            DeliveryStatus::FellBackToClipboard(e.to_string())
                        }
                    }
                });
                return Ok(Delivery::Network(task));
            }
            log::warn!("No async runtime for network delivery; using clipboard");
        }
        self.clipboard.set_text("PKCS7", pem)?;
        Ok(Delivery::Clipboard)
    }

    /// Fire-and-forget failure report; never fails, never blocks.
    pub fn report_failure(&self, message: &str) {
        if !self.config.connected {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("No async runtime; failure report dropped");
            return;
        };
        let transport = Arc::clone(&self.transport);
        let url = self.config.failure_url.clone();
        let timeout = self.config.post_timeout;
        let fields = vec![
            ("device".to_string(), self.config.device_info.clone()),
            (
                "message".to_string(),
                format!("{FAILURE_MESSAGE_PREFIX}{message}"),
            ),
        ];
        let task = runtime.spawn(async move {
            if let Err(e) = transport.post_form(&url, &fields, timeout).await {
                log::warn!("Failed to send failure report: {e}");
            }
        });
        let mut reports = self.reports.lock().unwrap_or_else(PoisonError::into_inner);
        reports.retain(|report| !report.is_finished());
        reports.push(task);
    }

    /// Wait for pending failure reports, each bounded by the POST timeout.
    ///
    /// Reports still running after that are left detached.
    pub async fn flush(&self) {
        let pending: Vec<JoinHandle<()>> = self
            .reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for report in pending {
            if tokio::time::timeout(self.config.post_timeout, report)
                .await
                .is_err()
            {
                log::warn!(
                    "Failure report still pending after {:?}",
                    self.config.post_timeout
                );
            }
        }
    }
}

/// Short description of the host for failure reports.
#[must_use]
pub fn device_information() -> String {
    format!(
        "{} {} ({} {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingTransport {
        fail: bool,
        delay: Duration,
        posts: Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    #[async_trait]
    impl HttpTransport for RecordingTransport {
        async fn post_form(
            &self,
            url: &str,
            fields: &[(String, String)],
            _timeout: Duration,
        ) -> SigningResult<()> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.posts
                .lock()
                .unwrap()
                .push((url.to_string(), fields.to_vec()));
            if self.fail {
                Err(SigningError::NetworkError("connection refused".into()))
            } else {
                Ok(())
            }
        }

        async fn get_json(&self, _url: &str, _t: Duration) -> SigningResult<serde_json::Value> {
            Err(SigningError::NetworkError("offline".into()))
        }
    }

    type Fixture = (DeliveryService, Arc<RecordingTransport>, Arc<MemoryClipboard>);

    fn service(connected: bool, fail: bool) -> Fixture {
        slow_service(connected, fail, Duration::ZERO, Duration::from_millis(2000))
    }

    fn slow_service(connected: bool, fail: bool, delay: Duration, post_timeout: Duration) -> Fixture {
        let transport = Arc::new(RecordingTransport {
            fail,
            delay,
            posts: Mutex::new(Vec::new()),
        });
        let clipboard = Arc::new(MemoryClipboard::new());
        let svc = DeliveryService::new(
            transport.clone(),
            clipboard.clone(),
            DeliveryConfig {
                connected,
                p7m_url: "http://backend/api/p7m".into(),
                failure_url: "http://backend/api/failure".into(),
                post_timeout,
                device_info: "test-device".into(),
            },
        );
        (svc, transport, clipboard)
    }

    #[tokio::test]
    async fn offline_goes_to_clipboard() {
        let (svc, transport, clipboard) = service(false, false);
        assert!(matches!(svc.deliver("PEM").unwrap(), Delivery::Clipboard));
        assert_eq!(clipboard.contents(), Some(("PKCS7".into(), "PEM".into())));
        assert!(transport.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn connected_posts_p7m_field() {
        let (svc, transport, clipboard) = service(true, false);
        let Delivery::Network(task) = svc.deliver("PEM").unwrap() else {
            panic!("expected network delivery");
        };
        assert_eq!(task.await.unwrap(), DeliveryStatus::Posted);
        let posts = transport.posts.lock().unwrap();
        assert_eq!(posts[0].0, "http://backend/api/p7m");
        assert_eq!(posts[0].1, vec![("p7m".to_string(), "PEM".to_string())]);
        assert!(clipboard.contents().is_none());
    }

    #[tokio::test]
    async fn failed_post_falls_back_to_clipboard() {
        let (svc, _transport, clipboard) = service(true, true);
        let Delivery::Network(task) = svc.deliver("PEM").unwrap() else {
            panic!("expected network delivery");
        };
        assert!(matches!(task.await.unwrap(), DeliveryStatus::FellBackToClipboard(_)));
        assert_eq!(clipboard.contents().unwrap().1, "PEM");
    }

    #[tokio::test]
    async fn failure_report_swallows_errors() {
        let (svc, transport, _clipboard) = service(true, true);
        svc.report_failure("boom");
        tokio::task::yield_now().await;
        for _ in 0..10 {
            if !transport.posts.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let posts = transport.posts.lock().unwrap();
        assert_eq!(posts[0].0, "http://backend/api/failure");
        assert_eq!(posts[0].1[1].1, "FREE_TEXT_ERROR:boom");
    }

    #[tokio::test]
    async fn flush_waits_for_pending_report() {
        let (svc, transport, _clipboard) =
            slow_service(true, false, Duration::from_millis(50), Duration::from_secs(2));
        svc.report_failure("late");
        assert!(transport.posts.lock().unwrap().is_empty());
        svc.flush().await;
        let posts = transport.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].1[1].1, "FREE_TEXT_ERROR:late");
    }

    #[tokio::test]
    async fn flush_gives_up_after_post_timeout() {
        let (svc, transport, _clipboard) =
            slow_service(true, false, Duration::from_secs(30), Duration::from_millis(20));
        svc.report_failure("stuck");
        let started = std::time::Instant::now();
        svc.flush().await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(transport.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn flush_without_reports_returns() {
        let (svc, _transport, _clipboard) = service(true, false);
        svc.flush().await;
    }

    #[test]
    fn no_runtime_no_panic() {
        let (svc, _transport, clipboard) = service(true, false);
        svc.report_failure("ignored");
        assert!(matches!(svc.deliver("PEM").unwrap(), Delivery::Clipboard));
        assert!(clipboard.contents().is_some());
    }
}
