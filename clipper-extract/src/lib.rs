//! Resilient article extraction.
//!
//! [`Extractor::extract`] turns any URL into a complete [`ArticleRecord`]:
//!
//! 1. [`normalize`]: expand shorteners, strip `utm_*` parameters
//! 2. [`strategy`]: direct fetches through the [`profiles`] table, each
//!    followed by the sufficiency check
//! 3. [`fallback`]: impersonating fetch, browser render, structured parse,
//!    then the [`heuristics`] rule tables
//! 4. [`recovery`]: one more pass against an alternate URL, else a stub
//!
//! Nothing here returns an error to the caller; degraded results carry the
//! `No Title` / `No Text` sentinels.

use clipper_common::ArticleRecord;
use clipper_config::{BrowserSettings, ClipperConfig, ExtractorConfig, HttpConfig};
use clipper_drivers::{BehavioralEngine, BrowserConfig, BrowserLauncher, FantocciniLauncher};
use clipper_http::{HttpClient, HttpError, ImpersonatingClient, PageFetcher};
use std::sync::Arc;
use std::time::Duration;

pub mod fallback;
pub mod heuristics;
pub mod normalize;
pub mod outcome;
pub mod parser;
pub mod profiles;
pub mod recovery;
pub mod strategy;

pub use outcome::{ExtractionOutcome, ExtractionRequest, FailureKind, FetchFailure, is_sufficient};
pub use parser::{ContentParser, ParsedArticle, ReadabilityParser};

use normalize::RedirectPolicy;

/// Orchestrates one extraction per call. Holds configuration and shared
/// clients only, so concurrent `extract` calls are independent.
pub struct Extractor {
    fetcher: Arc<dyn PageFetcher>,
    bypass: Arc<dyn PageFetcher>,
    launcher: Arc<dyn BrowserLauncher>,
    parser: Arc<dyn ContentParser>,
    policy: ExtractorConfig,
    http: HttpConfig,
    browser: BrowserConfig,
    pacing: BehavioralEngine,
}

impl Extractor {
    pub fn builder() -> ExtractorBuilder {
        ExtractorBuilder::default()
    }

    /// Real clients configured from a loaded [`ClipperConfig`].
    pub fn from_config(config: &ClipperConfig) -> Result<Self, HttpError> {
        Self::builder()
            .policy(config.extractor.clone())
            .http(config.http.clone())
            .browser(browser_config(&config.browser))
            .build()
    }

    pub fn policy(&self) -> &ExtractorConfig {
        &self.policy
    }

    /// Extract `url`. Never fails: the worst case is a stub record.
    pub async fn extract(&self, url: &str) -> ArticleRecord {
        tracing::info!(url=%url, "extract.start");
        let (request, outcome) = self.pass(url, self.policy.max_retries).await;
        match outcome {
            ExtractionOutcome::Success(record) => {
                tracing::info!(
                    url=%url,
                    canonical=%record.canonical_link,
                    chars=record.text_chars(),
                    "extract.done"
                );
                record
            }
            ExtractionOutcome::Failure(failure) => self.recover(&request, failure).await,
        }
    }

    /// Normalize `url`, then run the strategies and the fallback chain once.
    pub async fn pass(
        &self,
        url: &str,
        max_retries: usize,
    ) -> (ExtractionRequest, ExtractionOutcome) {
        let mut request = ExtractionRequest::new(url, max_retries, self.policy.max_redirect_hops);
        let policy = self.redirect_policy(request.redirect_budget);
        request.url = normalize::normalize(self.fetcher.as_ref(), url, &policy).await;
        let outcome = match self.run_strategies(&mut request).await {
            ExtractionOutcome::Failure(last) => {
                tracing::info!(url=%request.url, attempted=?request.attempted, "extract.strategies.exhausted");
                match self.run_fallbacks(&request.url).await {
                    ExtractionOutcome::Failure(f) => {
                        ExtractionOutcome::Failure(f.or_alternate(last.alternate_url))
                    }
                    success => success,
                }
            }
            success => success,
        };
        (request, outcome)
    }

    fn redirect_policy(&self, max_hops: usize) -> RedirectPolicy {
        RedirectPolicy {
            max_hops,
            hop_delay: Duration::from_millis(self.policy.redirect_hop_delay_ms),
            timeout: Duration::from_secs(self.http.head_timeout_secs),
        }
    }

    pub(crate) fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.http.page_timeout_secs)
    }
}

fn browser_config(settings: &BrowserSettings) -> BrowserConfig {
    BrowserConfig {
        webdriver_url: settings.webdriver_url.clone(),
        headless: settings.headless,
        viewport: (settings.viewport_width, settings.viewport_height),
        user_agent: settings.user_agent.clone(),
        sandbox: false,
        navigate_timeout_ms: settings.navigate_timeout_secs.saturating_mul(1000),
    }
}

/// Collaborators left unset get the real implementations at `build` time.
#[derive(Default)]
pub struct ExtractorBuilder {
    fetcher: Option<Arc<dyn PageFetcher>>,
    bypass: Option<Arc<dyn PageFetcher>>,
    launcher: Option<Arc<dyn BrowserLauncher>>,
    parser: Option<Arc<dyn ContentParser>>,
    policy: ExtractorConfig,
    http: HttpConfig,
    browser: BrowserConfig,
}

impl ExtractorBuilder {
    pub fn fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Client used for the Cloudflare-bypass step.
    pub fn bypass(mut self, bypass: Arc<dyn PageFetcher>) -> Self {
        self.bypass = Some(bypass);
        self
    }

    pub fn launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn parser(mut self, parser: Arc<dyn ContentParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn policy(mut self, policy: ExtractorConfig) -> Self {
        self.policy = policy;
        self
    }

    pub fn http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    pub fn browser(mut self, browser: BrowserConfig) -> Self {
        self.browser = browser;
        self
    }

    pub fn build(self) -> Result<Extractor, HttpError> {
        let timeout = Duration::from_secs(self.http.page_timeout_secs);
        let fetcher: Arc<dyn PageFetcher> = match self.fetcher {
            Some(f) => f,
            None => Arc::new(
                HttpClient::with_connect_timeout(Duration::from_secs(
                    self.http.connect_timeout_secs,
                ))?
                .with_timeout(timeout)
                .with_retries(self.http.retries),
            ),
        };
        let bypass: Arc<dyn PageFetcher> = match self.bypass {
            Some(b) => b,
            None => Arc::new(ImpersonatingClient::new()?.with_timeout(timeout)),
        };
        Ok(Extractor {
            fetcher,
            bypass,
            launcher: self
                .launcher
                .unwrap_or_else(|| Arc::new(FantocciniLauncher::new())),
            parser: self
                .parser
                .unwrap_or_else(|| Arc::new(ReadabilityParser::new())),
            policy: self.policy,
            http: self.http,
            browser: self.browser,
            pacing: BehavioralEngine::new(),
        })
    }
}
