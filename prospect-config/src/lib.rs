//! Loader for Prospect configuration with YAML + environment overlays.
//!
//! Sources are merged in order: an optional `prospect.yaml` (or any file the
//! `config` crate understands), inline YAML snippets, then
//! `PROSPECT__SECTION__KEY` environment overrides. String values are expanded
//! recursively (`${HF_TOKEN}`) before the merged tree is deserialised into
//! [`ProspectConfig`]. [`ProspectConfig::validated`] turns a missing
//! credential into a fatal [`ConfigError::MissingCredential`].
use config::{Config, Environment, File};
use prospect_common::observability::LogFormat;
pub use prospect_common::LlmConfig;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("missing credential `{0}`; set the referenced environment variable")]
    MissingCredential(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProspectConfig {
    #[serde(default)]
    pub version: Option<String>,
    /// Model used for filter interpretation, extraction and enrichment.
    pub llm: LlmConfig,
    /// Search-backed chat model (Perplexity) for the answer path.
    #[serde(default)]
    pub answer_llm: Option<LlmConfig>,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub extraction: ExtractionSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub notify: Option<NotifySettings>,
    #[serde(default)]
    pub watch: WatchSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchSettings {
    #[serde(default)]
    pub tavily: Option<TavilySettings>,
    #[serde(default)]
    pub scraperapi: Option<ScraperApiSettings>,
    #[serde(default)]
    pub stream: Option<StreamSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TavilySettings {
    pub api_key: String,
    #[serde(default = "default_search_depth")]
    pub search_depth: String,
    #[serde(default = "default_true")]
    pub include_raw_content: bool,
    #[serde(default)]
    pub max_results: Option<u32>,
    #[serde(default = "default_tavily_endpoint")]
    pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScraperApiSettings {
    pub api_key: String,
    #[serde(default = "default_scraperapi_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub num: Option<u32>,
}

/// Streaming answer search (OpenPerplex-style SSE endpoint).
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSettings {
    pub api_key: String,
    pub endpoint: String,
    #[serde(default = "default_stream_model")]
    pub model: String,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_search_type")]
    pub search_type: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_recency")]
    pub recency_filter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchSettings {
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_true")]
    pub browser_fallback: bool,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            headless: true,
            browser_fallback: true,
            timeout_secs: default_fetch_timeout(),
        }
    }
}

/// Transport retry policy shared by every outbound client.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_true")]
    pub identity_on_decode: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            identity_on_decode: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionSettings {
    /// Upper bound on characters of source text per extraction call.
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    /// Keys used when interpretation yields none.
    #[serde(default = "default_keys")]
    pub default_keys: Vec<String>,
    /// People to look up during enrichment.
    #[serde(default = "default_roles")]
    pub roles: Vec<String>,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            default_keys: default_keys(),
            roles: default_roles(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_companies_path")]
    pub companies_path: PathBuf,
    #[serde(default = "default_seen_path")]
    pub seen_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            companies_path: default_companies_path(),
            seen_path: default_seen_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifySettings {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub sender: String,
    pub password: String,
    pub receiver: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_watch_filters")]
    pub filters: Vec<String>,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            filters: default_watch_filters(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_true")]
    pub emit_stderr: bool,
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            emit_stderr: true,
            filter: default_log_filter(),
            dir: None,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_search_depth() -> String {
    "advanced".into()
}
fn default_tavily_endpoint() -> String {
    "https://api.tavily.com/".into()
}
fn default_scraperapi_endpoint() -> String {
    "https://api.scraperapi.com/".into()
}
fn default_stream_model() -> String {
    "o3-mini-high".into()
}
fn default_location() -> String {
    "us".into()
}
fn default_search_type() -> String {
    "business".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_top_p() -> f32 {
    0.9
}
fn default_recency() -> String {
    "anytime".into()
}
fn default_webdriver_url() -> String {
    "http://localhost:9515".into()
}
fn default_fetch_timeout() -> u64 {
    30
}
fn default_max_retries() -> usize {
    2
}
fn default_base_delay_ms() -> u64 {
    200
}
fn default_max_delay_ms() -> u64 {
    10_000
}
fn default_chunk_chars() -> usize {
    12_000
}
fn default_keys() -> Vec<String> {
    ["Company Name", "Category", "Funding Type", "Funding", "Employee size"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_roles() -> Vec<String> {
    vec!["CEO".into(), "CTO".into()]
}
fn default_companies_path() -> PathBuf {
    "companies.json".into()
}
fn default_seen_path() -> PathBuf {
    "seen_companies.json".into()
}
fn default_smtp_host() -> String {
    "smtp.gmail.com".into()
}
fn default_smtp_port() -> u16 {
    465
}
fn default_interval_secs() -> u64 {
    24 * 60 * 60
}
fn default_watch_filters() -> Vec<String> {
    vec!["funded $1M".into(), "employee size 50".into()]
}
fn default_log_filter() -> String {
    "info".into()
}

impl ProspectConfig {
    /// Reject the configuration when any configured service lacks its
    /// credential. Optional sections are only checked when present.
    pub fn validated(self) -> Result<Self, ConfigError> {
        if matches!(self.llm, LlmConfig::None) {
            return Err(ConfigError::Invalid("`llm.provider` must be set".into()));
        }
        if let Some(key) = self.llm.credential() {
            require("llm.api_key", key)?;
        }
        if let Some(answer) = &self.answer_llm {
            if let Some(key) = answer.credential() {
                require("answer_llm.api_key", key)?;
            }
        }
        if let Some(t) = &self.search.tavily {
            require("search.tavily.api_key", &t.api_key)?;
        }
        if let Some(s) = &self.search.scraperapi {
            require("search.scraperapi.api_key", &s.api_key)?;
        }
        if let Some(s) = &self.search.stream {
            require("search.stream.api_key", &s.api_key)?;
        }
        if let Some(n) = &self.notify {
            require("notify.sender", &n.sender)?;
            require("notify.password", &n.password)?;
            require("notify.receiver", &n.receiver)?;
        }
        if self.extraction.chunk_chars == 0 {
            return Err(ConfigError::Invalid(
                "`extraction.chunk_chars` must be positive".into(),
            ));
        }
        Ok(self)
    }
}

/// A credential is missing when empty or when a `${VAR}` or whole-value
/// `$VAR` reference stayed unresolved. Other values starting with `$` are
/// real secrets.
fn require(field: &str, value: &str) -> Result<(), ConfigError> {
    let v = value.trim();
    if v.is_empty() || is_unexpanded_reference(v) {
        return Err(ConfigError::MissingCredential(field.to_string()));
    }
    Ok(())
}

fn is_unexpanded_reference(v: &str) -> bool {
    if let Some(open) = v.find("${") {
        if v[open..].contains('}') {
            return true;
        }
    }
    let Some(name) = v.strip_prefix('$') else {
        return false;
    };
    name.starts_with(|c: char| c.is_ascii_uppercase() || c == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
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

/// Builder hiding the `config` crate wiring (files + env overrides).
pub struct ProspectConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for ProspectConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ProspectConfigLoader {
    /// Start with no files; `PROSPECT__`-prefixed env vars override keys.
    ///
    /// ```
    /// use prospect_config::{LlmConfig, ProspectConfigLoader};
    ///
    /// let config = ProspectConfigLoader::new()
    ///     .with_yaml_str("llm:\n  provider: ollama\n  model: llama3.2:3b\n")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert!(matches!(config.llm, LlmConfig::Ollama { .. }));
    /// assert_eq!(config.storage.companies_path.to_str(), Some("companies.json"));
    /// ```
    pub fn new() -> Self {
        let builder = Config::builder();
        Self { builder }
    }

    /// Attach a required file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that may be absent (pure env-driven runs).
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Deserialize the merged sources into [`ProspectConfig`].
    ///
    /// ```
    /// use prospect_config::{LlmConfig, ProspectConfigLoader};
    ///
    /// unsafe { std::env::set_var("DOC_HF_TOKEN", "hf_from_env"); }
    ///
    /// let config = ProspectConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// llm:
    ///   provider: openai
    ///   model: openai/gpt-oss-20b
    ///   api_key: "${DOC_HF_TOKEN}"
    /// "#)
    ///     .load()
    ///     .and_then(|c| c.validated())
    ///     .expect("valid configuration");
    ///
    /// match &config.llm {
    ///     LlmConfig::OpenAi { api_key, base_url, .. } => {
    ///         assert_eq!(api_key, "hf_from_env");
    ///         assert!(base_url.is_none());
    ///     }
    ///     other => panic!("unexpected provider {other:?}"),
    /// }
    ///
    /// unsafe { std::env::remove_var("DOC_HF_TOKEN"); }
    /// ```
    pub fn load(self) -> Result<ProspectConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix("PROSPECT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: ProspectConfig =
            serde_json::from_value(v).map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("FOO", Some("bar"), || {
            let mut v = json!("prefix-${FOO}-suffix");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("prefix-bar-suffix"));
        });
    }

    #[test]
    fn expands_nested_sections() {
        temp_env::with_vars(
            [("TAVILY_KEY", Some("tvly-1")), ("SMTP_PW", Some("app-pw"))],
            || {
                let mut v = json!({
                    "search": { "tavily": { "api_key": "${TAVILY_KEY}" } },
                    "notify": { "password": "$SMTP_PW", "smtp_port": 465 },
                    "watch": { "filters": ["funded $1M"] }
                });
                expand_env_in_value(&mut v);
                assert_eq!(v["search"]["tavily"]["api_key"], json!("tvly-1"));
                assert_eq!(v["notify"]["password"], json!("app-pw"));
                assert_eq!(v["notify"]["smtp_port"], json!(465));
            },
        );
    }

    #[test]
    fn dollar_amounts_in_filters_survive() {
        let mut v = json!("funded $1M");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("funded $1M"));
    }

    #[test]
    fn stops_on_cycles() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let mut v = json!("x=${A}-y");
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unresolved_placeholders_count_as_missing() {
        assert!(matches!(
            require("llm.api_key", "${HF_TOKEN}"),
            Err(ConfigError::MissingCredential(_))
        ));
        assert!(require("llm.api_key", "  ").is_err());
        assert!(require("llm.api_key", "hf_abc").is_ok());
    }

    #[test]
    fn secrets_starting_with_dollar_are_kept() {
        assert!(require("notify.password", "$ecret").is_ok());
        assert!(require("notify.password", "$3cret!").is_ok());
        assert!(require("notify.password", "$SMTP_PW").is_err());
        assert!(require("notify.password", "pre-${SMTP_PW}").is_err());
    }
}
