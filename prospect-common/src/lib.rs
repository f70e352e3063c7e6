//! Common types shared across the Prospect crates.
//!
//! This crate holds the pieces every other crate needs without pulling in
//! heavy transitive dependencies: the provider-agnostic [`LlmConfig`], the
//! shared [`ProspectError`] and [`Result`] alias, and the [`observability`]
//! helpers that install the global `tracing` subscriber.
//!
//! # Examples
//!
//! ```rust
//! use prospect_common::LlmConfig;
//!
//! let cfg: LlmConfig = serde_json::from_str(
//!     r#"{"provider":"openai","api_key":"k","model":"openai/gpt-oss-20b"}"#,
//! ).unwrap();
//! assert_eq!(cfg.model(), Some("openai/gpt-oss-20b"));
//! ```
use serde::{Deserialize, Serialize};

pub mod observability;

/// Configuration for an LLM provider.
///
/// Feature flags control which variants are compiled in; see the
/// `prospect-llm` crate for the clients built from each variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum LlmConfig {
    /// Any OpenAI-compatible chat completions endpoint (Hugging Face router,
    /// Together, Perplexity, OpenAI itself).
    #[cfg(feature = "openai")]
    #[serde(rename = "openai")]
    OpenAi {
        api_key: String,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temperature: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_tokens: Option<u32>,
    },
    #[cfg(feature = "ollama")]
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
        model: String,
    },
    #[default]
    None,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

impl LlmConfig {
    /// Model identifier, if a provider is configured.
    pub fn model(&self) -> Option<&str> {
        match self {
            #[cfg(feature = "openai")]
            Self::OpenAi { model, .. } => Some(model),
            #[cfg(feature = "ollama")]
            Self::Ollama { model, .. } => Some(model),
            Self::None => None,
        }
    }

    /// Secret the provider needs, if any. Used by config validation.
    pub fn credential(&self) -> Option<&str> {
        match self {
            #[cfg(feature = "openai")]
            Self::OpenAi { api_key, .. } => Some(api_key),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}

/// Error types used across the Prospect system.
#[derive(thiserror::Error, Debug)]
pub enum ProspectError {
    /// An LLM provider failed or returned an unusable response.
    #[error("LLM error: {0}")]
    Llm(String),

    /// A search or answer provider failed.
    #[error("Search error: {0}")]
    Search(String),

    /// A driver (browser, SMTP, etc.) reported an error.
    #[error("Driver error: {0}")]
    Driver(#[from] anyhow::Error),

    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required credential was absent at startup.
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// Snapshot files could not be read or written.
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A notification could not be delivered.
    #[error("Notification error: {0}")]
    Notify(String),

    /// Operation exceeded the configured timeout.
    #[error("Timeout occurred")]
    Timeout,
}

/// Convenient alias for results that use [`ProspectError`].
pub type Result<T> = std::result::Result<T, ProspectError>;
