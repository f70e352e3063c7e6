//! Retrieval through search-backed models that answer with company lists
//! directly, as opposed to search + extraction.
use crate::recover::{RecoveryChain, recover_records};
use crate::record::CompanyRecord;
use async_trait::async_trait;
use prospect_common::Result;
use prospect_llm::SharedLlm;
use prospect_llm::traits::RESEARCH_SYSTEM_PROMPT;
use prospect_web::stream::StreamSearchClient;
use std::sync::Arc;

#[async_trait]
pub trait AnswerSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Companies the source reports for `query`. Unparseable answers yield
    /// an empty list.
    async fn companies(&self, query: &str) -> Result<Vec<CompanyRecord>>;
}

/// Chat completion against a search-grounded model (Perplexity `sonar-pro`).
pub struct ChatAnswer {
    llm: SharedLlm,
    chain: Arc<RecoveryChain>,
    temperature: f32,
    max_tokens: u32,
}

impl ChatAnswer {
    pub fn new(llm: SharedLlm) -> Self {
        Self {
            llm,
            chain: Arc::new(RecoveryChain::default()),
            temperature: 0.2,
            max_tokens: 1024,
        }
    }

    pub fn with_chain(mut self, chain: Arc<RecoveryChain>) -> Self {
        self.chain = chain;
        self
    }
}

#[async_trait]
impl AnswerSource for ChatAnswer {
    fn name(&self) -> &'static str {
        "chat_answer"
    }

    async fn companies(&self, query: &str) -> Result<Vec<CompanyRecord>> {
        let resp = self
            .llm
            .generate(
                query,
                Some(self.llm.default_research_system_prompt()),
                Some(self.max_tokens),
                Some(self.temperature),
            )
            .await?;
        let records = recover_records(&self.chain, &resp.text);
        tracing::info!(
            target: "pipeline.answer",
            source = self.name(),
            model = self.llm.model_name(),
            records = records.len(),
            "answer.done"
        );
        Ok(records)
    }
}

/// Streamed answer search; `llm` events are accumulated, then recovered.
pub struct StreamAnswer {
    client: StreamSearchClient,
    chain: Arc<RecoveryChain>,
}

impl StreamAnswer {
    pub fn new(client: StreamSearchClient) -> Self {
        Self {
            client,
            chain: Arc::new(RecoveryChain::default()),
        }
    }

    pub fn with_chain(mut self, chain: Arc<RecoveryChain>) -> Self {
        self.chain = chain;
        self
    }
}

pub fn stream_prompt(query: &str) -> String {
    format!("list of companies that: {query}")
}

#[async_trait]
impl AnswerSource for StreamAnswer {
    fn name(&self) -> &'static str {
        "stream_answer"
    }

    async fn companies(&self, query: &str) -> Result<Vec<CompanyRecord>> {
        let text = self
            .client
            .stream_text(RESEARCH_SYSTEM_PROMPT, &stream_prompt(query))
            .await?;
        let records = recover_records(&self.chain, &text);
        tracing::info!(target: "pipeline.answer", source = self.name(), records = records.len(), "answer.done");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospect_llm::traits::{LlmClient, LlmResponse};
    use std::sync::Mutex;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Answers every prompt with `reply` and keeps the system prompts seen.
    struct CannedLlm {
        reply: &'static str,
        systems: Mutex<Vec<Option<String>>>,
    }

    impl CannedLlm {
        fn shared(reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                reply,
                systems: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn generate(
            &self,
            _prompt: &str,
            system_prompt: Option<&str>,
            _max_tokens: Option<u32>,
            _temperature: Option<f32>,
        ) -> Result<LlmResponse> {
            self.systems
                .lock()
                .unwrap()
                .push(system_prompt.map(str::to_string));
            Ok(LlmResponse::text(self.reply))
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    fn names(records: &[CompanyRecord]) -> Vec<&str> {
        records.iter().filter_map(|r| r.name()).collect()
    }

    #[tokio::test]
    async fn chat_answer_reads_fenced_json_with_citations() {
        let llm = CannedLlm::shared(
            "Acme raised a seed round [1][2].\n```json\n{\"companies\": [{\"Company Name\": \"Acme\", \"Funding\": \"$1M\"}, {\"Company Name\": \"Globex\"}]}\n```\nSources: [1] techcrunch [2] crunchbase",
        );
        let answer = ChatAnswer::new(llm.clone());
        let records = answer.companies("seed fintech").await.unwrap();
        assert_eq!(names(&records), vec!["Acme", "Globex"]);
        assert_eq!(
            llm.systems.lock().unwrap()[0].as_deref(),
            Some(RESEARCH_SYSTEM_PROMPT)
        );
    }

    #[tokio::test]
    async fn chat_answer_skips_leading_citation_markers() {
        let llm = CannedLlm::shared(
            "Per [1], these match: [{\"Company Name\": \"Initech\"}, {\"Company Name\": \"Hooli\"}]",
        );
        let records = ChatAnswer::new(llm).companies("q").await.unwrap();
        assert_eq!(names(&records), vec!["Initech", "Hooli"]);
    }

    #[tokio::test]
    async fn chat_answer_without_json_is_empty() {
        let llm = CannedLlm::shared("I could not find companies matching [1].");
        assert!(ChatAnswer::new(llm).companies("q").await.unwrap().is_empty());
    }

    #[test]
    fn stream_prompt_prefixes_the_query() {
        assert_eq!(
            stream_prompt("funded $1M, under 50 employees"),
            "list of companies that: funded $1M, under 50 employees"
        );
    }

    #[tokio::test]
    async fn stream_answer_recovers_streamed_records() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"type\":\"llm\",\"text\":\"Found [3]: [{\\\"Company Name\\\": \\\"Acme\\\"},\"}\n\n",
            "data: {\"type\":\"sources\",\"data\":[]}\n\n",
            "data: {\"type\":\"llm\",\"text\":\" {\\\"Company Name\\\": \\\"Zürich Robotics\\\"}]\"}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "user_prompt": "list of companies that: robotics startups"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = StreamSearchClient::new("op-test".into(), &server.uri()).unwrap();
        let records = StreamAnswer::new(client)
            .companies("robotics startups")
            .await
            .unwrap();
        assert_eq!(names(&records), vec!["Acme", "Zürich Robotics"]);
    }
}
