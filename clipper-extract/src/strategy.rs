//! Direct-fetch escalation over [`PROFILES`](crate::profiles::PROFILES).
//!
//! An explicit loop: every failure (transport or insufficient text) moves
//! `strategy_index` forward by one, and the loop ends once the index passes
//! `min(max_retries, PROFILES.len())`.

use crate::normalize::clean;
use crate::outcome::{ExtractionOutcome, ExtractionRequest, FailureKind, FetchFailure, is_sufficient};
use crate::profiles::{FetchProfile, last_index, profile};
use crate::Extractor;
use clipper_common::ArticleRecord;
use clipper_http::{FetchedPage, RequestOpts};
use reqwest::StatusCode;

impl Extractor {
    /// Try each remaining strategy of `request` in order.
    ///
    /// `request.attempted` records every index tried. On exhaustion the
    /// returned failure is the last one seen, carrying the most recent
    /// alternate URL any attempt observed.
    pub async fn run_strategies(&self, request: &mut ExtractionRequest) -> ExtractionOutcome {
        let last = last_index(request.max_retries);
        let mut failure = FetchFailure::new(
            FailureKind::Transport,
            "no direct-fetch strategy attempted",
        );
        while request.strategy_index <= last {
            let Some(profile) = profile(request.strategy_index) else {
                break;
            };
            request.attempted.push(profile.index);
            tracing::debug!(url=%request.url, index=profile.index, profile=profile.name, "extract.strategy.attempt");

            match self.try_profile(&request.url, profile).await {
                Ok(record) => {
                    tracing::info!(url=%request.url, index=profile.index, "extract.strategy.succeeded");
                    return ExtractionOutcome::Success(record);
                }
                Err(f) => {
                    tracing::info!(
                        url=%request.url,
                        index=profile.index,
                        kind=?f.kind,
                        error=%f.message,
                        "extract.strategy.failed"
                    );
                    failure = f.or_alternate(failure.alternate_url.take());
                }
            }
            request.advance();
        }
        ExtractionOutcome::Failure(failure)
    }

    async fn try_profile(
        &self,
        url: &str,
        profile: &FetchProfile,
    ) -> Result<ArticleRecord, FetchFailure> {
        let mut alternate = None;
        if profile.insecure_prefetch {
            match self.raw_fetch(url, profile).await {
                Ok(record) => return Ok(record),
                Err(f) => {
                    tracing::debug!(url=%url, error=%f.message, "extract.strategy.prefetch_failed");
                    alternate = f.alternate_url;
                }
            }
        }

        self.pacing
            .random_delay(self.policy.politeness_min_ms, self.policy.politeness_max_ms)
            .await;

        let mut opts = RequestOpts::default()
            .with_headers(profile.header_map())
            .with_timeout(self.page_timeout());
        if !profile.verify_tls {
            opts = opts.insecure();
        }
        let page = self
            .fetcher
            .get(url, opts)
            .await
            .map_err(|e| FetchFailure::from_http(&e, url).or_alternate(alternate.clone()))?;
        self.accept(url, &page)
            .map_err(|f| f.or_alternate(alternate))
    }

    /// Unverified GET that only counts when the server answers exactly 200.
    async fn raw_fetch(&self, url: &str, profile: &FetchProfile) -> Result<ArticleRecord, FetchFailure> {
        let opts = RequestOpts::default()
            .with_headers(profile.header_map())
            .with_timeout(self.page_timeout())
            .insecure();
        let page = self
            .fetcher
            .get(url, opts)
            .await
            .map_err(|e| FetchFailure::from_http(&e, url))?;
        if page.status != StatusCode::OK {
            return Err(FetchFailure::new(
                FailureKind::Transport,
                format!("raw fetch answered {}", page.status),
            ));
        }
        self.accept(url, &page)
    }

    /// Parse a fetched page and apply the sufficiency check.
    fn accept(&self, url: &str, page: &FetchedPage) -> Result<ArticleRecord, FetchFailure> {
        let final_url = page.final_url.as_str();
        let mut record = self.parser.parse(&page.body, final_url).into_record(final_url);
        if !is_sufficient(&record.text, self.policy.min_text_chars) {
            let mut failure = FetchFailure::insufficient(record.text_chars());
            if !clipper_http::same_url(final_url, url) {
                failure.alternate_url = Some(final_url.to_string());
            }
            return Err(failure);
        }
        record.canonical_link = clean(&record.canonical_link);
        Ok(record)
    }
}
