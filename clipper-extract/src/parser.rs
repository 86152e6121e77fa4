//! HTML to article fields.
//!
//! [`ContentParser`] is the seam; [`ReadabilityParser`] is a small
//! readability-style implementation over `scraper`: metadata from `<meta>`
//! and `<link>` tags, body text from the element holding the most paragraph
//! text.

use clipper_common::{ArticleRecord, NO_TEXT, NO_TITLE};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Fields a parser could recover; every one may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArticle {
    pub title: Option<String>,
    pub text: Option<String>,
    pub canonical_link: Option<String>,
    pub top_image: Option<String>,
    pub publish_date: Option<String>,
}

impl ParsedArticle {
    /// Fill gaps with the sentinels; `fallback_link` stands in for a missing canonical.
    pub fn into_record(self, fallback_link: &str) -> ArticleRecord {
        ArticleRecord {
            title: self.title.unwrap_or_else(|| NO_TITLE.to_string()),
            text: self.text.unwrap_or_else(|| NO_TEXT.to_string()),
            canonical_link: self
                .canonical_link
                .unwrap_or_else(|| fallback_link.to_string()),
            image: self.top_image.unwrap_or_default(),
            publish_date: self.publish_date.unwrap_or_default(),
        }
    }
}

pub trait ContentParser: Send + Sync {
    /// Pure parse of `html` fetched from `url`.
    fn parse(&self, html: &str, url: &str) -> ParsedArticle;
}

const TITLE_META: &[&str] = &[
    r#"meta[property="og:title"]"#,
    r#"meta[name="twitter:title"]"#,
];
const CANONICAL_LINKS: &[(&str, &str)] = &[
    (r#"link[rel="canonical"]"#, "href"),
    (r#"meta[property="og:url"]"#, "content"),
];
const IMAGE_META: &[&str] = &[
    r#"meta[property="og:image"]"#,
    r#"meta[name="twitter:image"]"#,
    r#"link[rel="image_src"]"#,
];
const PUBLISHED: &[(&str, &str)] = &[
    (r#"meta[property="article:published_time"]"#, "content"),
    (r#"meta[name="pubdate"]"#, "content"),
    (r#"meta[itemprop="datePublished"]"#, "content"),
    (r#"meta[name="date"]"#, "content"),
    ("time[datetime]", "datetime"),
];
/// Elements whose text never counts as visible content.
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

#[derive(Debug, Clone, Default)]
pub struct ReadabilityParser;

impl ReadabilityParser {
    pub fn new() -> Self {
        Self
    }
}

impl ContentParser for ReadabilityParser {
    fn parse(&self, html: &str, url: &str) -> ParsedArticle {
        let doc = Html::parse_document(html);
        let base = Url::parse(url).ok();

        let title = TITLE_META
            .iter()
            .find_map(|sel| first_attr(&doc, sel, "content"))
            .or_else(|| first_text(&doc, "title"))
            .or_else(|| first_text(&doc, "h1"));
        let canonical_link = CANONICAL_LINKS
            .iter()
            .find_map(|(sel, attr)| first_attr(&doc, sel, attr))
            .and_then(|href| absolutize(base.as_ref(), &href));
        let top_image = IMAGE_META
            .iter()
            .find_map(|sel| first_attr(&doc, sel, "content").or_else(|| first_attr(&doc, sel, "href")))
            .and_then(|src| absolutize(base.as_ref(), &src));
        let publish_date = PUBLISHED
            .iter()
            .find_map(|(sel, attr)| first_attr(&doc, sel, attr));

        ParsedArticle {
            title,
            text: densest_paragraphs(&doc),
            canonical_link,
            top_image,
            publish_date,
        }
    }
}

/// Visible text of an element with whitespace collapsed.
pub fn visible_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(el, &mut out);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if !SKIPPED_TAGS.contains(&child_el.value().name()) {
                collect_text(child_el, out);
            }
        }
    }
}

fn first_attr(doc: &Html, selector: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .map(visible_text)
        .find(|t| !t.is_empty())
}

fn absolutize(base: Option<&Url>, href: &str) -> Option<String> {
    match Url::parse(href) {
        Ok(u) => Some(u.into()),
        Err(_) => base.and_then(|b| b.join(href).ok()).map(String::from),
    }
}

/// Paragraphs of the parent element that holds the most paragraph text.
fn densest_paragraphs(doc: &Html) -> Option<String> {
    let sel = Selector::parse("p").ok()?;
    let mut groups: Vec<(_, usize, Vec<String>)> = Vec::new();
    for p in doc.select(&sel) {
        let text = visible_text(p);
        if text.is_empty() {
            continue;
        }
        let Some(parent) = p.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        let chars = text.chars().count();
        match groups.iter_mut().find(|(id, _, _)| *id == parent.id()) {
            Some((_, total, paras)) => {
                *total += chars;
                paras.push(text);
            }
            None => groups.push((parent.id(), chars, vec![text])),
        }
    }
    let mut best: Option<(usize, Vec<String>)> = None;
    for (_, total, paras) in groups {
        if best.as_ref().is_none_or(|(b, _)| total > *b) {
            best = Some((total, paras));
        }
    }
    best.map(|(_, paras)| paras.join("\n\n"))
}
