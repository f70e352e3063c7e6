//! Provider-agnostic LLM integration for Prospect.
//!
//! This crate exposes the [`traits::LlmClient`] interface and two providers:
//! any OpenAI-compatible chat completions endpoint ([`openai::OpenAiClient`],
//! used for the Hugging Face router and Perplexity) and a local Ollama
//! server ([`ollama::OllamaClient`]). [`ensure_llm_ready`] builds a client
//! from a [`prospect_common::LlmConfig`].
//!
//! # Examples
//! ```no_run
//! use prospect_common::{LlmConfig, Result};
//! use prospect_http::RetryPolicy;
//! use prospect_llm::ensure_llm_ready;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let cfg = LlmConfig::OpenAi {
//!     api_key: std::env::var("HF_TOKEN").unwrap_or_default(),
//!     model: prospect_llm::DEFAULT_CHAT_MODEL.to_string(),
//!     base_url: None,
//!     temperature: None,
//!     max_tokens: None,
//! };
//! let client = ensure_llm_ready(&cfg, RetryPolicy::default()).await?;
//! assert!(!client.model_name().is_empty());
//! # Ok(())
//! # }
//! ```
pub mod ollama;
pub mod openai;
pub mod traits;

use prospect_common::{LlmConfig, ProspectError};
use prospect_http::RetryPolicy;
use std::sync::Arc;
use traits::LlmClient;

/// Model served through the Hugging Face router for interpretation and
/// extraction.
pub const DEFAULT_CHAT_MODEL: &str = "openai/gpt-oss-20b";
/// Perplexity model used for answer search.
pub const DEFAULT_ANSWER_MODEL: &str = "sonar-pro";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2:3b";

/// Shared handle to a configured client.
pub type SharedLlm = Arc<dyn LlmClient + Send + Sync + 'static>;

/// Build a client for `config`. Ollama clients are probed (and the model
/// pulled) before returning.
pub async fn ensure_llm_ready(
    config: &LlmConfig,
    policy: RetryPolicy,
) -> prospect_common::Result<SharedLlm> {
    match config {
        #[cfg(feature = "openai")]
        LlmConfig::OpenAi {
            api_key,
            model,
            base_url,
            temperature,
            max_tokens,
        } => {
            let base = base_url.as_deref().unwrap_or(openai::HF_ROUTER_BASE);
            let client = openai::OpenAiClient::with_base_url(api_key.clone(), model.clone(), base)?
                .with_policy(policy)
                .with_defaults(*temperature, *max_tokens);
            tracing::info!(model = %model, base = %base, "llm.client.ready");
            Ok(Arc::new(client))
        }
        #[cfg(feature = "ollama")]
        LlmConfig::Ollama { base_url, model } => {
            let client = ollama::OllamaClient::new(base_url.clone(), model.clone()).await?;
            Ok(Arc::new(client))
        }
        LlmConfig::None => Err(ProspectError::Config("No LLM configured".to_string())),
        #[allow(unreachable_patterns)]
        _ => Err(ProspectError::Config("LLM provider not enabled".to_string())),
    }
}
