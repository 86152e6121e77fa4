//! Browser-impersonating client for sites behind Cloudflare-style bot walls.
//!
//! Sends the full header set a desktop Chrome on Windows sends on a top-level
//! navigation (client hints, `Sec-Fetch-*`, compressed encodings), keeps a
//! cookie jar across the request pair, and never verifies certificates. When
//! the first response is a challenge interstitial it retries once with the
//! cookies the challenge handed out; a second challenge is reported as
//! [`HttpError::Challenge`].

use crate::{FetchedPage, HeadResponse, HttpError, PageFetcher, RequestOpts, snip_body};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::sleep;

const CHROME_WINDOWS_HEADERS: &[(&str, &str)] = &[
    (
        "user-agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    ),
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
    ),
    ("accept-language", "en-US,en;q=0.9"),
    ("accept-encoding", "gzip, deflate, br"),
    (
        "sec-ch-ua",
        "\"Google Chrome\";v=\"123\", \"Not:A-Brand\";v=\"8\", \"Chromium\";v=\"123\"",
    ),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-ch-ua-platform", "\"Windows\""),
    ("sec-fetch-dest", "document"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-site", "none"),
    ("sec-fetch-user", "?1"),
    ("upgrade-insecure-requests", "1"),
    ("cache-control", "max-age=0"),
];

/// Markers of interstitial challenge pages (lower-cased).
const CHALLENGE_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "cf-challenge",
    "cf-turnstile",
    "challenge-platform",
    "cf-chl-bypass",
    "checking your browser",
    "just a moment...",
    "please wait while we verify",
    "enable javascript and cookies to continue",
    "verify you are human",
];

/// True when `body` looks like a bot-check interstitial rather than content.
pub fn looks_like_challenge(body: &str) -> bool {
    let head: String = body.chars().take(64 * 1024).collect::<String>().to_lowercase();
    CHALLENGE_MARKERS.iter().any(|m| head.contains(m))
}

fn chrome_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    for (name, value) in CHROME_WINDOWS_HEADERS {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            h.insert(n, v);
        }
    }
    h
}

#[derive(Clone)]
pub struct ImpersonatingClient {
    inner: Client,
    pub default_timeout: Duration,
    /// Pause before replaying a challenged request with the new cookies.
    pub challenge_pause: Duration,
}

impl ImpersonatingClient {
    pub fn new() -> Result<Self, HttpError> {
        let inner = Client::builder()
            .default_headers(chrome_headers())
            .cookie_store(true)
            .danger_accept_invalid_certs(true)
            .redirect(Policy::limited(10))
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            inner,
            default_timeout: Duration::from_secs(15),
            challenge_pause: Duration::from_secs(3),
        })
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    pub fn with_challenge_pause(mut self, dur: Duration) -> Self {
        self.challenge_pause = dur;
        self
    }

    async fn get_once(
        &self,
        url: &str,
        opts: &RequestOpts,
    ) -> Result<(StatusCode, FetchedPage), HttpError> {
        let timeout = opts.timeout.unwrap_or(self.default_timeout);
        let mut rb = self.inner.get(url).timeout(timeout);
        if let Some(extra) = &opts.headers {
            rb = rb.headers(extra.clone());
        }
        let resp = rb.send().await.map_err(|e| HttpError::Network {
            message: e.to_string(),
            url: e.url().map(|u| u.to_string()),
        })?;
        let status = resp.status();
        let final_url = resp.url().clone();
        let headers = resp.headers().clone();
        let body = resp.text().await.map_err(|e| HttpError::Network {
            message: e.to_string(),
            url: Some(final_url.to_string()),
        })?;
        Ok((
            status,
            FetchedPage {
                status,
                final_url,
                headers,
                body,
            },
        ))
    }
}

#[async_trait]
impl PageFetcher for ImpersonatingClient {
    async fn get(&self, url: &str, opts: RequestOpts) -> Result<FetchedPage, HttpError> {
        let mut challenged = false;
        loop {
            let (status, page) = self.get_once(url, &opts).await?;
            let is_challenge = looks_like_challenge(&page.body);
            tracing::debug!(
                url=%url,
                %status,
                final_url=%page.final_url,
                body_len=page.body.len(),
                is_challenge,
                "http.impersonate.response"
            );

            if is_challenge {
                if challenged {
                    tracing::warn!(url=%url, %status, "http.impersonate.challenge_persisted");
                    return Err(HttpError::Challenge {
                        url: page.final_url.to_string(),
                    });
                }
                challenged = true;
                sleep(self.challenge_pause).await;
                continue;
            }

            if !status.is_success() {
                tracing::warn!(
                    url=%url,
                    %status,
                    body_snippet=%snip_body(page.body.as_bytes()),
                    "http.impersonate.error"
                );
                return Err(HttpError::Status {
                    status,
                    url: page.final_url.to_string(),
                    location: page
                        .headers
                        .get(LOCATION)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string),
                });
            }
            return Ok(page);
        }
    }

    async fn head(&self, url: &str, opts: RequestOpts) -> Result<HeadResponse, HttpError> {
        let timeout = opts.timeout.unwrap_or(self.default_timeout);
        let resp = self
            .inner
            .head(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| HttpError::Network {
                message: e.to_string(),
                url: e.url().map(|u| u.to_string()),
            })?;
        Ok(HeadResponse {
            status: resp.status(),
            location: resp
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        })
    }
}
