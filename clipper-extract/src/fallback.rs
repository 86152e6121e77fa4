//! Anti-bot fallback chain, run once the direct strategies are exhausted:
//! impersonating fetch, browser render, structured parse, DOM heuristics.

use crate::heuristics;
use crate::normalize::clean;
use crate::outcome::{ExtractionOutcome, FailureKind, FetchFailure, is_sufficient};
use crate::Extractor;
use clipper_drivers::{BrowserSession, DriverError};
use clipper_http::RequestOpts;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Visible labels of cookie-consent buttons worth clicking.
pub const CONSENT_LABELS: &[&str] = &["Accept", "I agree", "Agree", "Accept All"];
/// Substring looked for in a button's `id` or `class`.
pub const CONSENT_ATTR_MARKER: &str = "accept";

impl Extractor {
    pub async fn run_fallbacks(&self, url: &str) -> ExtractionOutcome {
        let bypass_failure = match self.bypass_fetch(url).await {
            Ok(outcome) => return outcome,
            Err(f) => {
                tracing::info!(url=%url, kind=?f.kind, error=%f.message, "extract.fallback.bypass_failed");
                f
            }
        };

        let html = match self.render(url).await {
            Ok(html) => html,
            Err(f) => {
                tracing::warn!(url=%url, error=%f.message, "extract.fallback.render_failed");
                return ExtractionOutcome::Failure(f.or_alternate(bypass_failure.alternate_url));
            }
        };

        let parsed = self.parser.parse(&html, url).into_record(url);
        if is_sufficient(&parsed.text, self.policy.min_text_chars) {
            tracing::info!(url=%url, "extract.fallback.render_parsed");
            let mut record = parsed;
            record.canonical_link = clean(&record.canonical_link);
            return ExtractionOutcome::Success(record);
        }

        match heuristics::extract(&html, url) {
            Some(record) => {
                tracing::info!(url=%url, "extract.fallback.heuristics_matched");
                ExtractionOutcome::Success(record)
            }
            None => ExtractionOutcome::Failure(
                FetchFailure::new(
                    FailureKind::InsufficientContent,
                    "rendered page matched no article container",
                )
                .or_alternate(bypass_failure.alternate_url),
            ),
        }
    }

    /// Cloudflare-bypass step; canonical link is the URL requested.
    async fn bypass_fetch(&self, url: &str) -> Result<ExtractionOutcome, FetchFailure> {
        let opts = RequestOpts::default()
            .insecure()
            .with_timeout(self.page_timeout());
        let page = self
            .bypass
            .get(url, opts)
            .await
            .map_err(|e| FetchFailure::from_http(&e, url))?;
        let mut record = self.parser.parse(&page.body, url).into_record(url);
        if !is_sufficient(&record.text, self.policy.min_text_chars) {
            return Err(FetchFailure::insufficient(record.text_chars()));
        }
        record.canonical_link = clean(url);
        Ok(ExtractionOutcome::Success(record))
    }

    /// Render `url` in a fresh browser session and return the DOM.
    ///
    /// The session is closed exactly once before returning, whatever happened
    /// after launch.
    async fn render(&self, url: &str) -> Result<String, FetchFailure> {
        let mut session = self
            .launcher
            .launch(&self.browser)
            .await
            .map_err(|e| FetchFailure::from_driver(&e))?;

        let captured = self.capture(session.as_mut(), url).await;

        match session.close().await {
            Ok(()) => tracing::debug!(url=%url, "browser.session.closed"),
            Err(e) => tracing::warn!(url=%url, error=%e, "browser.session.close_failed"),
        }

        captured.map_err(|e| FetchFailure::from_driver(&e))
    }

    async fn capture(&self, session: &mut dyn BrowserSession, url: &str) -> Result<String, DriverError> {
        let limit = Duration::from_millis(self.browser.navigate_timeout_ms);
        timeout(limit, session.navigate(url))
            .await
            .map_err(|_| DriverError::Navigate {
                url: url.to_string(),
                message: format!("page did not load within {} ms", limit.as_millis()),
            })??;
        pause(self.policy.render_wait_ms).await;
        if click_consent(session).await {
            pause(self.policy.consent_wait_ms).await;
        }
        session.rendered_html().await
    }
}

/// Click the first button that looks like a cookie-consent "accept".
/// Errors are swallowed; returns whether a click happened.
async fn click_consent(session: &dyn BrowserSession) -> bool {
    let buttons = match session.find_by_selector("button").await {
        Ok(buttons) => buttons,
        Err(e) => {
            tracing::debug!(error=%e, "browser.consent.lookup_failed");
            return false;
        }
    };
    for button in buttons {
        let text = button.text().await.unwrap_or_default();
        let by_label = CONSENT_LABELS.iter().any(|label| text.contains(label));
        let mut by_attr = false;
        if !by_label {
            for attr in ["id", "class"] {
                if let Ok(Some(value)) = button.attribute(attr).await {
                    if value.to_ascii_lowercase().contains(CONSENT_ATTR_MARKER) {
                        by_attr = true;
                        break;
                    }
                }
            }
        }
        if by_label || by_attr {
            return match button.click().await {
                Ok(()) => {
                    tracing::debug!(text=%text, "browser.consent.clicked");
                    true
                }
                Err(e) => {
                    tracing::debug!(error=%e, "browser.consent.click_failed");
                    false
                }
            };
        }
    }
    false
}

async fn pause(ms: u64) {
    if ms > 0 {
        sleep(Duration::from_millis(ms)).await;
    }
}
