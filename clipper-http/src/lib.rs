//! Page-fetching HTTP client with safe logging, retries, and per-request TLS
//! and redirect policy.
//!
//! - Request options: headers, timeout, retries, certificate verification,
//!   redirect following
//! - [`PageFetcher`]: the seam the extractor fetches through; implemented by
//!   [`HttpClient`] and the browser-impersonating [`ImpersonatingClient`]
//! - Retries 429/5xx with exponential backoff and `Retry-After` support
//! - Optional [`rate::RateBudget`] gate driven by `X-RateLimit-*` headers
//! - Optional *raw* request/response logging via `CLIPPER_HTTP_RAW=1`
//!
//! Example (no_run):
//! ```rust
//! # async fn demo() -> Result<(), clipper_http::HttpError> {
//! use clipper_http::{HttpClient, PageFetcher, RequestOpts};
//!
//! let client = HttpClient::new()?;
//! let page = client
//!     .get("https://example.com/post", RequestOpts::default().insecure())
//!     .await?;
//! println!("{} bytes from {}", page.body.len(), page.final_url);
//! # Ok(()) }
//! ```
//!
//! Observability: structured `tracing` events are emitted for request start,
//! response headers, body snippets (truncated), retries and final errors, plus
//! raw request/response lines (target `http.raw`) when `CLIPPER_HTTP_RAW=1`.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::redirect::Policy;
use reqwest::{Client, Method, StatusCode, Url};
use std::env;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

pub mod impersonate;
pub mod rate;

pub use impersonate::ImpersonatingClient;
pub use rate::RateBudget;

// ==============================
// Raw logging toggles
// ==============================

const RAW_ENV: &str = "CLIPPER_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024; // cap raw body logs (64 KiB)
const MAX_FOLLOWED_REDIRECTS: usize = 10;

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

/// Render a best-effort curl command for repro/debug, with cookies redacted.
fn make_curl(method: &Method, url: &Url, headers: &HeaderMap, insecure: bool) -> String {
    let mut parts = vec!["curl".to_string(), format!("-X{}", method)];
    if insecure {
        parts.push("-k".to_string());
    }
    for (key, val) in redact_headers(headers) {
        parts.push(format!("-H '{}: {}'", key, val.replace('\'', r"'\''")));
    }
    parts.push(format!("'{}'", url.as_str()));
    parts.join(" ")
}

/// Redact sensitive headers for logging
fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let mut val = v.to_str().unwrap_or("").to_string();
            if key.eq_ignore_ascii_case("authorization")
                || key.eq_ignore_ascii_case("cookie")
                || key.eq_ignore_ascii_case("set-cookie")
            {
                val = "<redacted>".into();
            }
            (key, val)
        })
        .collect()
}

// ==============================
// Errors
// ==============================

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {message}")]
    Network {
        message: String,
        /// URL the transport was talking to when it failed, if known.
        url: Option<String>,
    },
    #[error("server returned {status} for {url}")]
    Status {
        status: StatusCode,
        url: String,
        location: Option<String>,
    },
    #[error("anti-bot challenge served by {url}")]
    Challenge { url: String },
}

impl HttpError {
    /// A URL other than the one requested that the failure points at, if any:
    /// a redirect target, the final URL after redirects, or the URL the
    /// transport error was raised for.
    pub fn redirect_hint(&self, requested: &str) -> Option<String> {
        let candidate = match self {
            HttpError::Network { url, .. } => url.clone(),
            HttpError::Status { url, location, .. } => {
                location.clone().or_else(|| Some(url.clone()))
            }
            HttpError::Challenge { url } => Some(url.clone()),
            HttpError::Url(_) | HttpError::Build(_) => None,
        }?;
        let absolute = Url::parse(requested)
            .ok()
            .and_then(|base| base.join(&candidate).ok())
            .map(String::from)
            .unwrap_or(candidate);
        (!same_url(&absolute, requested)).then_some(absolute)
    }
}

/// Compare two URLs after parsing so `http://x` and `http://x/` are equal.
pub fn same_url(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

// ==============================
// Request options & responses
// ==============================

/// Per-request tuning knobs for the HTTP client.
///
/// ```
/// use clipper_http::RequestOpts;
/// use std::time::Duration;
///
/// let opts = RequestOpts::default()
///     .with_timeout(Duration::from_secs(10))
///     .insecure()
///     .no_redirects();
///
/// assert_eq!(opts.timeout.unwrap().as_secs(), 10);
/// assert!(!opts.verify_tls);
/// assert!(!opts.follow_redirects);
/// ```
#[derive(Clone, Debug)]
pub struct RequestOpts {
    pub timeout: Option<Duration>,
    pub retries: Option<usize>,
    pub headers: Option<HeaderMap>,
    /// Verify server certificates (default `true`).
    pub verify_tls: bool,
    /// Follow `Location` redirects inside the client (default `true`).
    pub follow_redirects: bool,
}

impl Default for RequestOpts {
    fn default() -> Self {
        Self {
            timeout: None,
            retries: None,
            headers: None,
            verify_tls: true,
            follow_redirects: true,
        }
    }
}

impl RequestOpts {
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Skip certificate verification.
    pub fn insecure(mut self) -> Self {
        self.verify_tls = false;
        self
    }

    /// Return 3xx responses to the caller instead of following them.
    pub fn no_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }
}

/// A fetched HTML (or other text) page.
#[derive(Clone, Debug)]
pub struct FetchedPage {
    pub status: StatusCode,
    /// URL after any redirects the client followed.
    pub final_url: Url,
    pub headers: HeaderMap,
    pub body: String,
}

/// Result of a `HEAD` request; redirects are reported, never followed.
#[derive(Clone, Debug)]
pub struct HeadResponse {
    pub status: StatusCode,
    pub location: Option<String>,
}

impl HeadResponse {
    pub fn is_redirect(&self) -> bool {
        matches!(self.status.as_u16(), 301 | 302 | 303 | 307 | 308)
    }
}

/// GET/HEAD seam used by the extractor; mocked in tests.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// GET `url`; non-2xx statuses are returned as [`HttpError::Status`].
    async fn get(&self, url: &str, opts: RequestOpts) -> Result<FetchedPage, HttpError>;

    /// HEAD `url` without following redirects.
    async fn head(&self, url: &str, opts: RequestOpts) -> Result<HeadResponse, HttpError>;
}

// ==============================
// Client
// ==============================

/// One reqwest client per (certificate verification, redirect policy) pair so
/// connection pools are shared across requests with the same policy.
#[derive(Clone)]
struct ClientSet {
    verified_follow: Client,
    verified_manual: Client,
    insecure_follow: Client,
    insecure_manual: Client,
}

impl ClientSet {
    fn build(connect_timeout: Duration) -> Result<Self, HttpError> {
        let make = |verify: bool, follow: bool| {
            let policy = if follow {
                Policy::limited(MAX_FOLLOWED_REDIRECTS)
            } else {
                Policy::none()
            };
            Client::builder()
                .connect_timeout(connect_timeout)
                .danger_accept_invalid_certs(!verify)
                .redirect(policy)
                .gzip(true)
                .brotli(true)
                .deflate(true)
                .build()
                .map_err(|e| HttpError::Build(e.to_string()))
        };
        Ok(Self {
            verified_follow: make(true, true)?,
            verified_manual: make(true, false)?,
            insecure_follow: make(false, true)?,
            insecure_manual: make(false, false)?,
        })
    }

    fn pick(&self, verify_tls: bool, follow_redirects: bool) -> &Client {
        match (verify_tls, follow_redirects) {
            (true, true) => &self.verified_follow,
            (true, false) => &self.verified_manual,
            (false, true) => &self.insecure_follow,
            (false, false) => &self.insecure_manual,
        }
    }
}

/// Raw response captured by [`HttpClient::send`] before status handling.
struct RawResponse {
    status: StatusCode,
    url: Url,
    headers: HeaderMap,
    bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct HttpClient {
    clients: ClientSet,
    pub default_timeout: Duration,
    pub max_retries: usize,
    rate: Option<RateBudget>,
}

impl HttpClient {
    /// Construct a client with a 15s default timeout and no retries.
    ///
    /// ```no_run
    /// use clipper_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new()?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(15));
    /// assert_eq!(client.max_retries, 0);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new() -> Result<Self, HttpError> {
        Self::with_connect_timeout(Duration::from_secs(5))
    }

    pub fn with_connect_timeout(connect_timeout: Duration) -> Result<Self, HttpError> {
        Ok(Self {
            clients: ClientSet::build(connect_timeout)?,
            default_timeout: Duration::from_secs(15),
            max_retries: 0,
            rate: None,
        })
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    pub fn with_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    /// Gate every request on a shared [`RateBudget`] and feed it response headers.
    pub fn with_rate_budget(mut self, budget: RateBudget) -> Self {
        self.rate = Some(budget);
        self
    }

    // ==============================
    // Core request implementation
    // ==============================

    async fn send(
        &self,
        method: Method,
        raw_url: &str,
        opts: &RequestOpts,
    ) -> Result<RawResponse, HttpError> {
        let url = Url::parse(raw_url).map_err(|e| HttpError::Url(format!("{raw_url}: {e}")))?;
        let client = self.clients.pick(opts.verify_tls, opts.follow_redirects);

        let mut attempt = 0usize;
        let max_retries = opts.retries.unwrap_or(self.max_retries);
        let timeout = opts.timeout.unwrap_or(self.default_timeout);
        let req_id = uuid::Uuid::new_v4().simple().to_string();

        loop {
            if let Some(budget) = &self.rate {
                budget.acquire().await;
            }

            let mut rb = client.request(method.clone(), url.clone()).timeout(timeout);
            if let Some(hdrs) = &opts.headers {
                rb = rb.headers(hdrs.clone());
            }

            tracing::debug!(
                req_id=%req_id,
                attempt=attempt + 1,
                max_retries,
                method=%method,
                host_path=%format!("{}{}", url.host_str().unwrap_or("-"), url.path()),
                timeout_ms=timeout.as_millis() as u64,
                verify_tls=opts.verify_tls,
                follow_redirects=opts.follow_redirects,
                "http.request.start"
            );

            if raw_enabled() {
                let headers = opts.headers.clone().unwrap_or_default();
                let curl = make_curl(&method, &url, &headers, !opts.verify_tls);
                tracing::debug!(target: "http.raw", %req_id, %curl, "request");
            }

            // ----- Send -----
            let t0 = std::time::Instant::now();
            let resp = match rb.send().await {
                Ok(resp) => resp,
                Err(err) => {
                    let message = err.to_string();
                    let err_url = err.url().map(|u| u.to_string());
                    if attempt < max_retries {
                        attempt += 1;
                        let delay = backoff(attempt);
                        tracing::warn!(
                            req_id=%req_id,
                            attempt,
                            max_retries,
                            backoff_ms=delay.as_millis() as u64,
                            message=%message,
                            "http.retrying.network_send"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(
                        req_id=%req_id,
                        attempt,
                        message=%message,
                        timeout=err.is_timeout(),
                        connect=err.is_connect(),
                        "http.network_error.send"
                    );
                    return Err(HttpError::Network {
                        message,
                        url: err_url,
                    });
                }
            };
            let status = resp.status();
            let final_url = resp.url().clone();
            let headers = resp.headers().clone();
            let bytes = match resp.bytes().await {
                Ok(bytes) => bytes.to_vec(),
                Err(err) => {
                    let message = err.to_string();
                    if attempt < max_retries {
                        attempt += 1;
                        let delay = backoff(attempt);
                        tracing::warn!(
                            req_id=%req_id,
                            attempt,
                            backoff_ms=delay.as_millis() as u64,
                            message=%message,
                            "http.retrying.network_body"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(req_id=%req_id, attempt, message=%message, "http.network_error.body");
                    return Err(HttpError::Network {
                        message,
                        url: Some(final_url.to_string()),
                    });
                }
            };
            let dur_ms = t0.elapsed().as_millis() as u64;

            if let Some(budget) = &self.rate {
                budget.observe(&headers);
            }

            tracing::debug!(
                req_id=%req_id,
                %status,
                duration_ms=dur_ms,
                body_len=bytes.len(),
                final_url=%final_url,
                redirected=%(final_url != url),
                "http.response.headers"
            );

            if raw_enabled() {
                let hdrs = redact_headers(&headers);
                let truncated = bytes.len() > RAW_MAX_BODY;
                let text = String::from_utf8_lossy(&bytes[..bytes.len().min(RAW_MAX_BODY)]);
                tracing::info!(
                    target:"http.raw",
                    %req_id,
                    status=%status,
                    duration_ms=dur_ms,
                    headers=?hdrs,
                    body=%text,
                    truncated
                );
            }

            tracing::trace!(
                req_id=%req_id,
                body_snippet=%snip_body(&bytes),
                "http.response.body_snippet"
            );

            let is_429 = status == StatusCode::TOO_MANY_REQUESTS;
            if (is_429 || status.is_server_error()) && attempt < max_retries {
                attempt += 1;
                let delay = match retry_after_delay_secs(&headers) {
                    Some(secs) => Duration::from_secs(secs),
                    None if is_429 => backoff(attempt).max(Duration::from_millis(1100)),
                    None => backoff(attempt),
                };
                tracing::warn!(
                    req_id=%req_id,
                    %status,
                    attempt,
                    max_retries,
                    backoff_ms=delay.as_millis() as u64,
                    "http.retrying"
                );
                sleep(delay).await;
                continue;
            }

            return Ok(RawResponse {
                status,
                url: final_url,
                headers,
                bytes,
            });
        }
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn get(&self, url: &str, opts: RequestOpts) -> Result<FetchedPage, HttpError> {
        let raw = self.send(Method::GET, url, &opts).await?;
        if !raw.status.is_success() {
            let location = location_of(&raw.headers);
            tracing::warn!(
                url=%url,
                status=%raw.status,
                final_url=%raw.url,
                location=?location,
                body_snippet=%snip_body(&raw.bytes),
                "http.error"
            );
            return Err(HttpError::Status {
                status: raw.status,
                url: raw.url.to_string(),
                location,
            });
        }
        Ok(FetchedPage {
            status: raw.status,
            final_url: raw.url,
            body: String::from_utf8_lossy(&raw.bytes).into_owned(),
            headers: raw.headers,
        })
    }

    async fn head(&self, url: &str, opts: RequestOpts) -> Result<HeadResponse, HttpError> {
        let raw = self.send(Method::HEAD, url, &opts.no_redirects()).await?;
        Ok(HeadResponse {
            status: raw.status,
            location: location_of(&raw.headers),
        })
    }
}

// ==============================
// Helpers
// ==============================

fn backoff(attempt: usize) -> Duration {
    Duration::from_millis(200u64.saturating_mul(1 << (attempt.saturating_sub(1)).min(10)))
}

fn location_of(h: &HeaderMap) -> Option<String> {
    h.get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn retry_after_delay_secs(h: &HeaderMap) -> Option<u64> {
    h.get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())?
        .parse()
        .ok()
}

fn snip_body(body: &[u8]) -> String {
    let mut snip = String::from_utf8_lossy(body).to_string();
    if snip.len() > 500 {
        let mut cut = 500;
        while !snip.is_char_boundary(cut) {
            cut -= 1;
        }
        snip.truncate(cut);
        snip.push_str("...");
    }
    snip
}
