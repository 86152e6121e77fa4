//! Driver layer for headless browser rendering.
//!
//! The extractor only talks to the traits defined here, so rendering can be
//! swapped for a scripted fake in tests:
//!
//! - [`BrowserLauncher`]: starts one isolated browser session per call
//! - [`BrowserSession`]: navigate, query elements, capture the rendered DOM,
//!   close (idempotent, safe after any failure)
//! - [`BrowserElement`]: text/attribute reads and clicks
//!
//! [`browser::driver::FantocciniLauncher`] implements them over a WebDriver
//! endpoint (Chromedriver by default) and
//! [`browser::behavioral::BehavioralEngine`] provides randomized pacing.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod browser;

pub use browser::behavioral::BehavioralEngine;
pub use browser::driver::FantocciniLauncher;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {message}")]
    Navigate { url: String, message: String },
    #[error("browser command failed: {0}")]
    Command(String),
    #[error("browser session already closed")]
    Closed,
}

/// Launch parameters for one isolated browser session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
    pub viewport: (u32, u32),
    pub user_agent: String,
    /// Chrome's sandbox is disabled unless this is set.
    pub sandbox: bool,
    /// Page-load limit for one navigation, enforced by WebDriver and by the caller.
    pub navigate_timeout_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            viewport: (1920, 1080),
            user_agent: browser::fingerprint::DESKTOP_CHROME_UA.to_string(),
            sandbox: false,
            navigate_timeout_ms: 15_000,
        }
    }
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, config: &BrowserConfig) -> Result<Box<dyn BrowserSession>, DriverError>;
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    async fn find_by_selector(
        &self,
        selector: &str,
    ) -> Result<Vec<Box<dyn BrowserElement>>, DriverError>;

    /// Serialized DOM after scripts have run.
    async fn rendered_html(&self) -> Result<String, DriverError>;

    /// End the session. Calling it again, or after a failed command, is a no-op.
    async fn close(&mut self) -> Result<(), DriverError>;
}

#[async_trait]
pub trait BrowserElement: Send + Sync {
    async fn text(&self) -> Result<String, DriverError>;

    async fn attribute(&self, name: &str) -> Result<Option<String>, DriverError>;

    async fn click(&self) -> Result<(), DriverError>;
}
