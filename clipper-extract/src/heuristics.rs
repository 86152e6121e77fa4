//! Last-resort extraction from a rendered DOM using fixed selector tables.

use crate::parser::visible_text;
use clipper_common::{ArticleRecord, NO_TITLE};
use scraper::{Html, Selector};
use url::Url;

/// A candidate article container and the visible text it must exceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerRule {
    pub selector: &'static str,
    pub min_chars: usize,
}

/// Evaluated top to bottom. Only the first element matching each selector is
/// measured; a short one moves on to the next rule.
pub const CONTAINER_RULES: &[ContainerRule] = &[
    ContainerRule { selector: "article", min_chars: 200 },
    ContainerRule { selector: ".article-content", min_chars: 200 },
    ContainerRule { selector: ".entry-content", min_chars: 200 },
    ContainerRule { selector: ".post-content", min_chars: 200 },
    ContainerRule { selector: "main", min_chars: 200 },
    ContainerRule { selector: "#content", min_chars: 200 },
];

pub const TITLE_SELECTORS: &[&str] = &["h1", "title", ".article-title", ".entry-title", ".post-title"];

pub const IMAGE_SELECTOR: &str = "article img, .article-content img, .featured-image img";

/// Build a record from the first qualifying container, or `None` when no
/// rule matches.
pub fn extract(html: &str, url: &str) -> Option<ArticleRecord> {
    let doc = Html::parse_document(html);
    let (rule, text) = CONTAINER_RULES.iter().find_map(|rule| {
        let sel = Selector::parse(rule.selector).ok()?;
        let text = visible_text(doc.select(&sel).next()?);
        (text.chars().count() > rule.min_chars).then_some((rule, text))
    })?;
    tracing::debug!(url=%url, selector=rule.selector, chars=text.chars().count(), "extract.heuristics.matched");

    let title = TITLE_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|sel| {
            let text = visible_text(doc.select(&sel).next()?);
            (!text.is_empty()).then_some(text)
        })
        .unwrap_or_else(|| NO_TITLE.to_string());

    let image = Selector::parse(IMAGE_SELECTOR)
        .ok()
        .and_then(|sel| {
            doc.select(&sel)
                .filter_map(|img| img.value().attr("src"))
                .map(str::trim)
                .find(|src| !src.is_empty())
                .map(|src| rebase(src, url))
        })
        .unwrap_or_default();

    Some(ArticleRecord {
        title,
        text,
        canonical_link: url.to_string(),
        image,
        publish_date: String::new(),
    })
}

/// Root-relative paths get the page's scheme and host; protocol-relative
/// paths get its scheme. Anything else is returned as found.
pub fn rebase(src: &str, page_url: &str) -> String {
    let Ok(page) = Url::parse(page_url) else {
        return src.to_string();
    };
    if let Some(rest) = src.strip_prefix("//") {
        return format!("{}://{}", page.scheme(), rest);
    }
    if src.starts_with('/') {
        let host = page.host_str().unwrap_or_default();
        return match page.port() {
            Some(port) => format!("{}://{}:{}{}", page.scheme(), host, port, src),
            None => format!("{}://{}{}", page.scheme(), host, src),
        };
    }
    src.to_string()
}
