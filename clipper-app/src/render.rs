use chrono::{DateTime, Local};
use clipper_common::{ArticleRecord, ClipperError, OutputFormat, Result};
use serde::Serialize;

/// YAML header of a stored bookmark.
#[derive(Debug, Serialize)]
struct FrontMatter<'a> {
    title: &'a str,
    date: &'a str,
    url: &'a str,
    image: &'a str,
    add: String,
    add_source: &'a str,
    public: bool,
}

pub fn render(
    record: &ArticleRecord,
    source_url: &str,
    format: OutputFormat,
    added: DateTime<Local>,
) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string(record).map_err(|e| ClipperError::Render(e.to_string()))
        }
        OutputFormat::Markdown => markdown(record, source_url, added),
    }
}

/// Front matter, `# title`, lead image, then body.
fn markdown(record: &ArticleRecord, source_url: &str, added: DateTime<Local>) -> Result<String> {
    let added = added.format("%Y-%m-%d %H:%M:%S").to_string();
    let date = if record.publish_date.is_empty() {
        added.as_str()
    } else {
        record.publish_date.as_str()
    };
    let header = serde_yaml::to_string(&FrontMatter {
        title: &record.title,
        date,
        url: &record.canonical_link,
        image: &record.image,
        add: added.clone(),
        add_source: source_url,
        public: true,
    })
    .map_err(|e| ClipperError::Render(e.to_string()))?;

    let mut out = format!("---\n{header}---\n\n# {}\n\n", record.title);
    if !record.image.is_empty() {
        out.push_str(&format!("![image]({})\n\n", record.image));
    }
    out.push_str(&record.text);
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn added() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap()
    }

    fn record() -> ArticleRecord {
        ArticleRecord {
            title: "A \"quoted\" title".into(),
            text: "Body text.".into(),
            canonical_link: "https://news.example/a".into(),
            image: "https://news.example/a.jpg".into(),
            publish_date: String::new(),
        }
    }

    #[test]
    fn json_uses_bookmark_field_names() {
        let out = render(&record(), "https://bit.ly/x", OutputFormat::Json, added()).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["canonical_link"], "https://news.example/a");
        assert_eq!(v["publish"], "");
    }

    #[test]
    fn markdown_has_front_matter_and_lead_image() {
        let out = render(&record(), "https://bit.ly/x", OutputFormat::Markdown, added()).unwrap();
        assert!(out.starts_with("---\n"));
        let header: serde_yaml::Value =
            serde_yaml::from_str(out.split("---\n").nth(1).unwrap()).unwrap();
        assert_eq!(header["title"].as_str(), Some("A \"quoted\" title"));
        assert_eq!(header["date"].as_str(), Some("2026-05-04 09:30:00"));
        assert_eq!(header["add_source"].as_str(), Some("https://bit.ly/x"));
        assert!(out.contains("# A \"quoted\" title\n\n![image](https://news.example/a.jpg)\n\nBody text.\n"));
    }

    #[test]
    fn stub_renders_without_image_line() {
        let stub = ArticleRecord::stub("https://dead.example/");
        let out = render(&stub, "https://dead.example/", OutputFormat::Markdown, added()).unwrap();
        assert!(!out.contains("![image]"));
        assert!(out.ends_with("# No Title\n\nNo Text\n"));
    }
}
