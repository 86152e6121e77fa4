use anyhow::Result;
use clap::Parser;
use clipper_common::observability::{LogConfig, LogFormat, init_logging};
use clipper_common::{ClipperError, OutputFormat};
use clipper_config::{ClipperConfig, ClipperConfigLoader};
use clipper_extract::Extractor;
use std::path::PathBuf;

mod render;

const DEFAULT_CONFIG_FILE: &str = "clipper.yaml";

#[derive(Parser, Debug)]
#[command(name = "clipper")]
#[command(about = "Extract clean article records from web pages")]
#[command(version)]
struct Cli {
    /// Page URLs to extract, one record each
    #[arg(required = true)]
    urls: Vec<String>,

    /// Configuration file (defaults to ./clipper.yaml when present)
    #[arg(long, value_name = "FILE", env = "CLIPPER_CONFIG")]
    config: Option<PathBuf>,

    /// Output format: json (one object per line) or markdown
    #[arg(long, default_value = "json")]
    format: OutputFormat,

    /// Highest direct-fetch strategy to try before the anti-bot fallbacks
    #[arg(long)]
    max_retries: Option<usize>,

    /// WebDriver endpoint used for browser rendering
    #[arg(long)]
    webdriver_url: Option<String>,
}

fn load_config(cli: &Cli) -> Result<ClipperConfig, ClipperError> {
    let loader = match &cli.config {
        Some(path) => ClipperConfigLoader::new().with_file(path),
        None => ClipperConfigLoader::new().with_optional_file(DEFAULT_CONFIG_FILE),
    };
    let mut cfg = loader
        .load()
        .map_err(|e| ClipperError::Config(e.to_string()))?;
    if let Some(n) = cli.max_retries {
        cfg.extractor.max_retries = n;
    }
    if let Some(url) = &cli.webdriver_url {
        cfg.browser.webdriver_url = url.clone();
    }
    Ok(cfg)
}

fn log_config(cfg: &ClipperConfig) -> LogConfig {
    LogConfig {
        app_name: cfg.logging.app_name.clone(),
        log_dir: cfg.logging.log_dir.clone(),
        emit_stderr: cfg.logging.emit_stderr,
        format: if cfg.logging.format.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        },
        default_filter: cfg.logging.default_filter.clone(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    let log_path = init_logging(log_config(&cfg))?;
    tracing::debug!(log=%log_path.display(), urls=cli.urls.len(), "clipper.start");

    let extractor =
        Extractor::from_config(&cfg).map_err(|e| ClipperError::Client(e.to_string()))?;

    let mut stubs = 0usize;
    for url in &cli.urls {
        let record = extractor.extract(url).await;
        if record.is_stub() {
            stubs += 1;
            tracing::warn!(url=%url, canonical=%record.canonical_link, "clipper.record.stub");
        }
        let rendered = render::render(&record, url, cli.format, chrono::Local::now())?;
        println!("{rendered}");
    }
    tracing::info!(total=cli.urls.len(), stubs, "clipper.done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_win_over_config() {
        let cli = Cli::parse_from([
            "clipper",
            "--config",
            "/definitely/missing.yaml",
            "https://a.example/",
        ]);
        assert!(matches!(load_config(&cli), Err(ClipperError::Config(_))));

        let cli = Cli::parse_from([
            "clipper",
            "--max-retries",
            "2",
            "--webdriver-url",
            "http://grid:4444",
            "--format",
            "markdown",
            "https://a.example/",
            "https://b.example/",
        ]);
        assert_eq!(cli.urls.len(), 2);
        assert_eq!(cli.format, OutputFormat::Markdown);
        let cfg = load_config(&cli).unwrap();
        assert_eq!(cfg.extractor.max_retries, 2);
        assert_eq!(cfg.browser.webdriver_url, "http://grid:4444");
    }

    #[test]
    fn json_logging_is_selected_by_name() {
        let mut cfg = ClipperConfig::default();
        cfg.logging.format = "JSON".into();
        assert_eq!(log_config(&cfg).format, LogFormat::Json);
    }
}
