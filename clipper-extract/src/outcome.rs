use clipper_common::{ArticleRecord, NO_TEXT};
use clipper_drivers::DriverError;
use clipper_http::HttpError;
use std::fmt;

/// Why an attempt did not produce a usable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, DNS, TLS, non-success status.
    Transport,
    /// Fetched fine but the text is missing or too short.
    InsufficientContent,
    /// Browser launch or navigation failed.
    Render,
}

/// Structured failure passed along the escalation chain.
///
/// `alternate_url` is filled in by whichever layer saw a URL other than the
/// one requested (a redirect target, a final response URL, the URL a
/// transport error was raised for). Recovery reads it instead of digging
/// through error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub message: String,
    pub alternate_url: Option<String>,
}

impl FetchFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            alternate_url: None,
        }
    }

    pub fn insufficient(chars: usize) -> Self {
        Self::new(
            FailureKind::InsufficientContent,
            format!("extracted text too short ({chars} chars)"),
        )
    }

    /// Transport failure for `requested`, keeping any alternate URL the error points at.
    pub fn from_http(err: &HttpError, requested: &str) -> Self {
        let kind = match err {
            HttpError::Challenge { .. } => FailureKind::InsufficientContent,
            _ => FailureKind::Transport,
        };
        Self {
            kind,
            message: err.to_string(),
            alternate_url: err.redirect_hint(requested),
        }
    }

    pub fn from_driver(err: &DriverError) -> Self {
        Self::new(FailureKind::Render, err.to_string())
    }

    /// Keep our own alternate URL; otherwise adopt `alternate`.
    pub fn or_alternate(mut self, alternate: Option<String>) -> Self {
        if self.alternate_url.is_none() {
            self.alternate_url = alternate;
        }
        self
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(alt) = &self.alternate_url {
            write!(f, " (alternate: {alt})")?;
        }
        Ok(())
    }
}

impl std::error::Error for FetchFailure {}

/// Result of one attempt, one pass, or the fallback chain.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Success(ArticleRecord),
    Failure(FetchFailure),
}

impl ExtractionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Success(_))
    }
}

/// Text counts only when it is not the sentinel and is strictly longer than
/// `min_chars` characters.
pub fn is_sufficient(text: &str, min_chars: usize) -> bool {
    text != NO_TEXT && text.chars().count() > min_chars
}

/// Mutable state of one extraction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub url: String,
    /// Next direct-fetch strategy to try (1-based).
    pub strategy_index: usize,
    pub max_retries: usize,
    pub redirect_budget: usize,
    /// Every strategy index tried so far, in order.
    pub attempted: Vec<usize>,
}

impl ExtractionRequest {
    pub fn new(url: impl Into<String>, max_retries: usize, redirect_budget: usize) -> Self {
        Self {
            url: url.into(),
            strategy_index: 1,
            max_retries,
            redirect_budget,
            attempted: Vec::new(),
        }
    }

    pub(crate) fn advance(&mut self) {
        self.strategy_index += 1;
    }
}
