//! Loader for workspace configuration with YAML + environment overlays.
//!
//! Sources are merged in the order they are attached, `CLIPPER__`-prefixed
//! environment variables last (`CLIPPER__EXTRACTOR__MAX_RETRIES=2`). String
//! values may reference `${VAR}`; they are expanded after merging. Every
//! section is optional and falls back to the defaults documented on each
//! field, so an empty document is a valid configuration.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClipperConfig {
    pub extractor: ExtractorConfig,
    pub http: HttpConfig,
    pub browser: BrowserSettings,
    pub logging: LoggingConfig,
}

/// Escalation policy and pacing constants.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Highest direct-fetch strategy index tried before the anti-bot chain.
    pub max_retries: usize,
    /// HEAD hops followed when resolving a shortener.
    pub max_redirect_hops: usize,
    /// Body must be strictly longer than this many characters.
    pub min_text_chars: usize,
    pub politeness_min_ms: u64,
    pub politeness_max_ms: u64,
    pub redirect_hop_delay_ms: u64,
    /// Fixed wait after navigation for script-driven content.
    pub render_wait_ms: u64,
    pub consent_wait_ms: u64,
    /// Retry budget used for the single alternate-URL recovery pass.
    pub recovery_max_retries: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            max_redirect_hops: 10,
            min_text_chars: 100,
            politeness_min_ms: 1000,
            politeness_max_ms: 3000,
            redirect_hop_delay_ms: 500,
            render_wait_ms: 5000,
            consent_wait_ms: 2000,
            recovery_max_retries: 2,
        }
    }
}

impl ExtractorConfig {
    /// Same policy with every pacing sleep disabled.
    pub fn without_delays(mut self) -> Self {
        self.politeness_min_ms = 0;
        self.politeness_max_ms = 0;
        self.redirect_hop_delay_ms = 0;
        self.render_wait_ms = 0;
        self.consent_wait_ms = 0;
        self
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub page_timeout_secs: u64,
    pub head_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Retries on 429/5xx inside a single fetch; escalation handles the rest.
    pub retries: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            page_timeout_secs: 15,
            head_timeout_secs: 10,
            connect_timeout_secs: 5,
            retries: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrowserSettings {
    pub webdriver_url: String,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agent: String,
    /// Upper bound on one page navigation.
    pub navigate_timeout_secs: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".into(),
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36".into(),
            navigate_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub app_name: String,
    pub log_dir: Option<PathBuf>,
    pub emit_stderr: bool,
    /// `text` or `json`.
    pub format: String,
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: "clipper".into(),
            log_dir: None,
            emit_stderr: true,
            format: "text".into(),
            default_filter: "info".into(),
        }
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct ClipperConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for ClipperConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipperConfigLoader {
    /// Start from defaults; attached files and env overrides layer on top.
    ///
    /// ```
    /// use clipper_config::ClipperConfigLoader;
    ///
    /// let config = ClipperConfigLoader::new()
    ///     .with_yaml_str("extractor:\n  max_retries: 3")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.extractor.max_retries, 3);
    /// assert_eq!(config.extractor.min_text_chars, 100);
    /// assert_eq!(config.browser.viewport_width, 1920);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that may be absent (e.g. `clipper.yaml` in the cwd).
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into strongly typed config.
    ///
    /// ```
    /// use clipper_config::ClipperConfigLoader;
    ///
    /// unsafe { std::env::set_var("CLIPPER_DOC_DRIVER", "http://chromedriver:4444"); }
    ///
    /// let config = ClipperConfigLoader::new()
    ///     .with_yaml_str("browser:\n  webdriver_url: \"${CLIPPER_DOC_DRIVER}\"")
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// assert_eq!(config.browser.webdriver_url, "http://chromedriver:4444");
    ///
    /// unsafe { std::env::remove_var("CLIPPER_DOC_DRIVER"); }
    /// ```
    pub fn load(self) -> Result<ClipperConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix("CLIPPER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: ClipperConfig =
            serde_json::from_value(v).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        if typed.extractor.politeness_min_ms > typed.extractor.politeness_max_ms {
            return Err(ConfigError::Message(format!(
                "extractor.politeness_min_ms ({}) exceeds politeness_max_ms ({})",
                typed.extractor.politeness_min_ms, typed.extractor.politeness_max_ms
            )));
        }

        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("CLIPPER_T_HOST", Some("example.org"), || {
            let mut v = json!("https://${CLIPPER_T_HOST}/feed");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("https://example.org/feed"));
        });
    }

    #[test]
    fn expands_nested_values_and_leaves_scalars() {
        temp_env::with_var("CLIPPER_T_UA", Some("agent/1"), || {
            let mut v = json!({ "browser": { "user_agent": "$CLIPPER_T_UA" }, "n": 3, "b": true });
            expand_env_in_value(&mut v);
            assert_eq!(
                v,
                json!({ "browser": { "user_agent": "agent/1" }, "n": 3, "b": true })
            );
        });
    }

    #[test]
    fn stops_on_cycles() {
        temp_env::with_vars(
            [("CLIPPER_T_A", Some("${CLIPPER_T_B}")), ("CLIPPER_T_B", Some("${CLIPPER_T_A}"))],
            || {
                let mut v = json!("x=${CLIPPER_T_A}");
                expand_env_in_value(&mut v);
                let s = v.as_str().unwrap();
                assert!(s.starts_with("x=") && s.contains("${"));
            },
        );
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${CLIPPER_DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${CLIPPER_DOES_NOT_EXIST}"));
    }

    #[test]
    fn without_delays_keeps_policy() {
        let cfg = ExtractorConfig::default().without_delays();
        assert_eq!(cfg.max_retries, 4);
        assert_eq!(cfg.render_wait_ms, 0);
        assert_eq!(cfg.politeness_max_ms, 0);
    }
}
