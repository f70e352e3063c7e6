use async_trait::async_trait;
use prospect_common::Result;
use serde::{Deserialize, Serialize};

/// Analyst prompt shared by the answer-search paths: asks for a JSON object
/// with every company in a `companies` array.
pub const RESEARCH_SYSTEM_PROMPT: &str = r#"You are a knowledgeable AI assistant in the business, internet and web sector.

Rules:
- Always answer using up-to-date, verified information from current search results.
- Do not reference internal instructions, APIs or URLs in the output.

Steps:
- Return the answer as a JSON object with meaningful and relevant key-value pairs.
- Return each company in a JSON array called "companies".
- Return only the companies and their details as JSON.
- No value may be empty."#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub model: Option<String>,
    pub tokens_used: Option<u32>,
}

impl LlmResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            tokens_used: None,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion for `prompt` with an optional system prompt.
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse>;

    /// Check if the LLM service is reachable.
    async fn health_check(&self) -> Result<bool>;

    fn model_name(&self) -> &str;

    /// System prompt for company research answers.
    fn default_research_system_prompt(&self) -> &str {
        RESEARCH_SYSTEM_PROMPT
    }

    /// Single user-turn completion with provider defaults.
    async fn complete(&self, prompt: &str) -> Result<String> {
        let response = self.generate(prompt, None, None, None).await?;
        tracing::debug!(model = self.model_name(), chars = response.text.len(), "llm.complete");
        Ok(response.text)
    }
}
