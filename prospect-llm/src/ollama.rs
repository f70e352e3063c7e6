use crate::traits::{LlmClient, LlmResponse};
use async_trait::async_trait;
use prospect_common::{ProspectError, Result};
use prospect_http::{HttpClient, RequestOpts};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

const OLLAMA_CONNECTION_ERROR: &str = "No running Ollama server detected. Start it with: `ollama serve` (after installing). Install instructions: https://github.com/ollama/ollama";

/// Ollama client for local model inference.
pub struct OllamaClient {
    client: HttpClient,
    model: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl OllamaClient {
    /// Create a client and verify server/model availability, pulling the
    /// model when it is missing.
    pub async fn new(base_url: String, model: String) -> Result<Self> {
        let base = format!("{}/", base_url.trim_end_matches('/'));
        let client = HttpClient::new(&base)
            .map_err(|e| ProspectError::Llm(format!("Failed to create HTTP client: {e}")))?
            .with_timeout(Duration::from_secs(300));

        let ollama = Self { client, model };
        let models = ollama.fetch_available_models().await?;
        if !models.iter().any(|m| m == &ollama.model) {
            tracing::info!(model = %ollama.model, "model not found locally, pulling");
            ollama.pull_model().await?;
        }
        Ok(ollama)
    }

    async fn fetch_available_models(&self) -> Result<Vec<String>> {
        let tags: TagsResponse = self
            .client
            .get_json(
                "api/tags",
                RequestOpts {
                    retries: Some(0),
                    ..Default::default()
                },
            )
            .await
            .map_err(|_| ProspectError::Llm(OLLAMA_CONNECTION_ERROR.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn pull_model(&self) -> Result<()> {
        let _: JsonValue = self
            .client
            .post_json_opts(
                "api/pull",
                &json!({ "model": self.model, "stream": false }),
                RequestOpts::default(),
            )
            .await
            .map_err(|e| ProspectError::Llm(format!("Failed to pull model: {e}")))?;
        tracing::info!(model = %self.model, "pulled model");
        Ok(())
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        let mut options = serde_json::Map::new();
        if let Some(temp) = temperature {
            options.insert("temperature".to_string(), json!(temp));
        }
        if let Some(max_tok) = max_tokens {
            options.insert("num_predict".to_string(), json!(max_tok));
        }

        let mut payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": options,
        });
        if let Some(system) = system_prompt {
            payload["system"] = json!(system);
        }

        let resp: GenerateResponse = self
            .client
            .post_json_opts("api/generate", &payload, RequestOpts::default())
            .await
            .map_err(|e| ProspectError::Llm(format!("Generate request failed: {e}")))?;

        Ok(LlmResponse {
            text: resp.response,
            model: Some(self.model.clone()),
            tokens_used: resp.eval_count,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.fetch_available_models().await.is_ok())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
