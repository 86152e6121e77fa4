//! Common types and utilities shared across Clipper crates.
//!
//! This crate defines the article record handed to the bookmarking layer,
//! observability helpers, and shared error types used throughout the Clipper
//! workspace. It is intentionally lightweight so that every crate can depend
//! on it without introducing heavy transitive costs.
//!
//! # Overview
//!
//! - [`ArticleRecord`]: the always-complete extraction result
//! - [`observability`]: Centralised tracing/logging initialisation
//! - [`ClipperError`] and [`Result`]: Shared error handling
//! - [`OutputFormat`]: how records are rendered for downstream consumers
//!
//! # Examples
//!
//! A stub record keeps every field populated:
//!
//! ```rust
//! use clipper_common::{ArticleRecord, NO_TEXT, NO_TITLE};
//!
//! let rec = ArticleRecord::stub("https://example.com/post");
//! assert_eq!(rec.title, NO_TITLE);
//! assert_eq!(rec.text, NO_TEXT);
//! assert_eq!(rec.canonical_link, "https://example.com/post");
//! assert!(rec.image.is_empty() && rec.publish_date.is_empty());
//! ```
use serde::{Deserialize, Serialize};

pub mod observability;

/// Title used when no title could be extracted.
pub const NO_TITLE: &str = "No Title";
/// Body used when no article text could be extracted.
pub const NO_TEXT: &str = "No Text";

/// Clean article record consumed by the storage/bookmarking layer.
///
/// Every field is always present; degraded results are signalled through the
/// sentinel values rather than absence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    pub text: String,
    pub canonical_link: String,
    pub image: String,
    #[serde(rename = "publish")]
    pub publish_date: String,
}

impl ArticleRecord {
    /// Minimal record pointing at `canonical_link` with sentinel title/text.
    pub fn stub(canonical_link: impl Into<String>) -> Self {
        Self {
            title: NO_TITLE.to_string(),
            text: NO_TEXT.to_string(),
            canonical_link: canonical_link.into(),
            image: String::new(),
            publish_date: String::new(),
        }
    }

    /// True when the record carries neither a real title nor real text.
    pub fn is_stub(&self) -> bool {
        self.title == NO_TITLE && self.text == NO_TEXT
    }

    /// Number of characters (not bytes) in the body text.
    pub fn text_chars(&self) -> usize {
        self.text.chars().count()
    }
}

/// Preferred output format for rendered records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    /// YAML front matter followed by a markdown body.
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format `{other}` (expected json or markdown)")),
        }
    }
}

/// Error types used across the Clipper system.
#[derive(thiserror::Error, Debug)]
pub enum ClipperError {
    /// An HTTP or browser client could not be set up.
    #[error("Client error: {0}")]
    Client(String),

    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rendering a record for output failed.
    #[error("Render error: {0}")]
    Render(String),
}

/// Convenient alias for results that use [`ClipperError`].
pub type Result<T> = std::result::Result<T, ClipperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_is_structurally_complete() {
        let rec = ArticleRecord::stub("not a url");
        assert!(rec.is_stub());
        assert_eq!(rec.canonical_link, "not a url");
        assert_eq!(rec.text_chars(), NO_TEXT.len());
    }

    #[test]
    fn serializes_publish_key_like_the_bookmark_store() {
        let rec = ArticleRecord::stub("https://example.com");
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["publish"], "");
        assert!(v.get("publish_date").is_none());
    }

    #[test]
    fn output_format_parses_cli_spellings() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("md".parse::<OutputFormat>(), Ok(OutputFormat::Markdown));
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn text_chars_counts_code_points() {
        let mut rec = ArticleRecord::stub("https://example.com");
        rec.text = "été".to_string();
        assert_eq!(rec.text_chars(), 3);
    }
}
