#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use clipper_common::observability::{LogConfig, LogFormat};
use clipper_config::ExtractorConfig;
use clipper_drivers::{BrowserConfig, BrowserElement, BrowserLauncher, BrowserSession, DriverError};
use clipper_extract::Extractor;
use clipper_http::{FetchedPage, HeadResponse, HttpError, PageFetcher, RequestOpts};
use reqwest::header::{HeaderMap, USER_AGENT};
use reqwest::{StatusCode, Url};

static INIT_PATH: OnceLock<std::path::PathBuf> = OnceLock::new();

pub fn init_test_tracing() {
    let _ = INIT_PATH.get_or_init(|| {
        let config = LogConfig {
            app_name: "clipper-tests".to_string(),
            emit_stderr: true,
            format: if std::env::var("CLIPPER_LOG_FORMAT")
                .map(|raw| raw.trim().eq_ignore_ascii_case("json"))
                .unwrap_or(false)
            {
                LogFormat::Json
            } else {
                LogFormat::Text
            },
            default_filter: "debug".to_string(),
            ..LogConfig::default()
        };

        clipper_common::observability::init_logging(config).unwrap_or_default()
    });
}

/// Paragraph of exactly `chars` characters inside an `<article>`.
pub fn article_html(chars: usize) -> String {
    format!(
        "<html><head><title>Story</title></head><body>\
         <nav><p>Home</p></nav><article><p>{}</p></article></body></html>",
        "a".repeat(chars)
    )
}

#[derive(Debug, Clone)]
pub struct Call {
    pub method: &'static str,
    pub url: String,
    pub user_agent: Option<String>,
    pub verify_tls: bool,
}

/// In-memory `PageFetcher` serving canned pages, statuses and redirects.
#[derive(Default)]
pub struct ScriptedFetcher {
    pages: HashMap<String, String>,
    agent_pages: Vec<(String, String, String)>,
    moved: HashMap<String, String>,
    redirects: HashMap<String, String>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, body: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), body.into());
        self
    }

    /// Serve `body` only when the user agent contains `agent`.
    pub fn page_for_agent(mut self, url: &str, agent: &str, body: impl Into<String>) -> Self {
        self.agent_pages
            .push((url.to_string(), agent.to_string(), body.into()));
        self
    }

    /// GET answers 410 pointing at `location`.
    pub fn moved(mut self, url: &str, location: &str) -> Self {
        self.moved.insert(url.to_string(), location.to_string());
        self
    }

    /// HEAD answers 301 with `location`.
    pub fn redirect(mut self, url: &str, location: &str) -> Self {
        self.redirects.insert(url.to_string(), location.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn gets_to(&self, url: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == "GET" && c.url == url)
            .count()
    }

    fn record(&self, method: &'static str, url: &str, opts: &RequestOpts) -> Option<String> {
        let user_agent = opts
            .headers
            .as_ref()
            .and_then(|h| h.get(USER_AGENT))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(Call {
                method,
                url: url.to_string(),
                user_agent: user_agent.clone(),
                verify_tls: opts.verify_tls,
            });
        }
        user_agent
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn get(&self, url: &str, opts: RequestOpts) -> Result<FetchedPage, HttpError> {
        let agent = self.record("GET", url, &opts).unwrap_or_default();
        let final_url = Url::parse(url).map_err(|e| HttpError::Url(e.to_string()))?;
        if let Some(location) = self.moved.get(url) {
            return Err(HttpError::Status {
                status: StatusCode::GONE,
                url: url.to_string(),
                location: Some(location.clone()),
            });
        }
        let body = self
            .agent_pages
            .iter()
            .find(|(u, a, _)| u == url && agent.contains(a.as_str()))
            .map(|(_, _, b)| b.clone())
            .or_else(|| self.pages.get(url).cloned());
        match body {
            Some(body) => Ok(FetchedPage {
                status: StatusCode::OK,
                final_url,
                headers: HeaderMap::new(),
                body,
            }),
            None => Err(HttpError::Network {
                message: "connection refused".to_string(),
                url: Some(url.to_string()),
            }),
        }
    }

    async fn head(&self, url: &str, opts: RequestOpts) -> Result<HeadResponse, HttpError> {
        self.record("HEAD", url, &opts);
        Ok(match self.redirects.get(url) {
            Some(location) => HeadResponse {
                status: StatusCode::MOVED_PERMANENTLY,
                location: Some(location.clone()),
            },
            None => HeadResponse {
                status: StatusCode::OK,
                location: None,
            },
        })
    }
}

/// What a scripted browser session does.
#[derive(Debug, Clone, Default)]
pub struct BrowserScript {
    pub html: String,
    pub launch_error: bool,
    pub navigation_error: bool,
    /// `navigate` never answers in test time.
    pub navigation_hang: bool,
    pub capture_error: bool,
    /// Looking up `<button>` elements fails.
    pub lookup_error: bool,
    /// Every button click fails.
    pub click_error: bool,
    /// (text, id) of each `<button>`.
    pub buttons: Vec<(String, Option<String>)>,
}

#[derive(Debug, Default)]
pub struct BrowserCounters {
    pub launches: AtomicUsize,
    pub navigations: AtomicUsize,
    pub closes: AtomicUsize,
    pub clicks: AtomicUsize,
    pub captures: AtomicUsize,
}

impl BrowserCounters {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn clicks(&self) -> usize {
        self.clicks.load(Ordering::SeqCst)
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

pub struct ScriptedBrowser {
    script: BrowserScript,
    counters: Arc<BrowserCounters>,
}

impl ScriptedBrowser {
    pub fn new(script: BrowserScript) -> (Arc<Self>, Arc<BrowserCounters>) {
        let counters = Arc::new(BrowserCounters::default());
        (
            Arc::new(Self {
                script,
                counters: counters.clone(),
            }),
            counters,
        )
    }

    /// Browser that cannot start; the chain must still finish.
    pub fn unavailable() -> (Arc<Self>, Arc<BrowserCounters>) {
        Self::new(BrowserScript {
            launch_error: true,
            ..BrowserScript::default()
        })
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedBrowser {
    async fn launch(&self, _config: &BrowserConfig) -> Result<Box<dyn BrowserSession>, DriverError> {
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        if self.script.launch_error {
            return Err(DriverError::Launch("no webdriver".to_string()));
        }
        Ok(Box::new(ScriptedSession {
            script: self.script.clone(),
            counters: self.counters.clone(),
        }))
    }
}

struct ScriptedSession {
    script: BrowserScript,
    counters: Arc<BrowserCounters>,
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.counters.navigations.fetch_add(1, Ordering::SeqCst);
        if self.script.navigation_error {
            return Err(DriverError::Navigate {
                url: url.to_string(),
                message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            });
        }
        if self.script.navigation_hang {
            tokio::time::sleep(Duration::from_secs(40)).await;
        }
        Ok(())
    }

    async fn find_by_selector(
        &self,
        selector: &str,
    ) -> Result<Vec<Box<dyn BrowserElement>>, DriverError> {
        if selector != "button" {
            return Ok(Vec::new());
        }
        if self.script.lookup_error {
            return Err(DriverError::Command("stale element reference".to_string()));
        }
        Ok(self
            .script
            .buttons
            .iter()
            .map(|(text, id)| {
                Box::new(ScriptedButton {
                    text: text.clone(),
                    id: id.clone(),
                    fail_click: self.script.click_error,
                    counters: self.counters.clone(),
                }) as Box<dyn BrowserElement>
            })
            .collect())
    }

    async fn rendered_html(&self) -> Result<String, DriverError> {
        self.counters.captures.fetch_add(1, Ordering::SeqCst);
        if self.script.capture_error {
            return Err(DriverError::Command("page crashed".to_string()));
        }
        Ok(self.script.html.clone())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedButton {
    text: String,
    id: Option<String>,
    fail_click: bool,
    counters: Arc<BrowserCounters>,
}

#[async_trait]
impl BrowserElement for ScriptedButton {
    async fn text(&self) -> Result<String, DriverError> {
        Ok(self.text.clone())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, DriverError> {
        Ok(match name {
            "id" => self.id.clone(),
            _ => None,
        })
    }

    async fn click(&self) -> Result<(), DriverError> {
        self.counters.clicks.fetch_add(1, Ordering::SeqCst);
        if self.fail_click {
            return Err(DriverError::Command("element click intercepted".to_string()));
        }
        Ok(())
    }
}

/// Extractor over scripted collaborators with every pacing sleep disabled.
pub fn extractor(
    fetcher: Arc<ScriptedFetcher>,
    bypass: Arc<ScriptedFetcher>,
    browser: Arc<ScriptedBrowser>,
) -> Extractor {
    extractor_with_browser(fetcher, bypass, browser, BrowserConfig::default())
}

/// Same as [`extractor`] with explicit launch parameters.
pub fn extractor_with_browser(
    fetcher: Arc<ScriptedFetcher>,
    bypass: Arc<ScriptedFetcher>,
    browser: Arc<ScriptedBrowser>,
    config: BrowserConfig,
) -> Extractor {
    Extractor::builder()
        .fetcher(fetcher)
        .bypass(bypass)
        .launcher(browser)
        .policy(ExtractorConfig::default().without_delays())
        .browser(config)
        .build()
        .expect("extractor builds")
}
