use async_trait::async_trait;
use prospect_common::{ProspectError, Result};
use prospect_llm::traits::{LlmClient, LlmResponse};
use prospect_pipeline::{CompanyRecord, Notifier};
use prospect_web::{SearchHit, SearchProvider, SearchReport};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

static INIT: OnceLock<()> = OnceLock::new();

#[allow(dead_code)]
pub fn init_test_tracing() {
    INIT.get_or_init(|| {
        let config = prospect_common::observability::LogConfig {
            app_name: "prospect-pipeline-tests",
            emit_stderr: true,
            default_filter: "debug".to_string(),
            ..Default::default()
        };
        let _ = prospect_common::observability::init_logging(config);
    });
}

type Responder = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// In-memory model: answers each prompt through `responder` and records it.
/// Prompts containing `slow_marker` are answered after a short delay.
pub struct ScriptedLlm {
    responder: Responder,
    slow_marker: Option<&'static str>,
    pub prompts: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedLlm {
    pub fn new(responder: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            slow_marker: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_slow_marker(mut self, marker: &'static str) -> Self {
        self.slow_marker = Some(marker);
        self
    }

    pub fn prompts_containing(&self, needle: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(
        &self,
        prompt: &str,
        _system_prompt: Option<&str>,
        _max_tokens: Option<u32>,
        _temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.slow_marker.is_some_and(|m| prompt.contains(m)) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        (self.responder)(prompt).map(LlmResponse::text)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub fn is_interpret(prompt: &str) -> bool {
    prompt.contains("identify the most meaningful key name")
}

pub fn is_extract(prompt: &str) -> bool {
    prompt.contains("extract a JSON array")
}

#[allow(dead_code)]
pub fn is_enrich(prompt: &str) -> bool {
    prompt.contains("business information assistant")
}

/// Search provider returning a fixed report (or failing) and recording
/// queries.
pub struct FakeSearch {
    report: Option<SearchReport>,
    pub queries: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl FakeSearch {
    pub fn returning(report: SearchReport) -> Self {
        Self {
            report: Some(report),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn with_contents(contents: &[&str]) -> Self {
        Self::returning(SearchReport {
            answer: None,
            hits: contents
                .iter()
                .map(|c| SearchHit {
                    title: String::new(),
                    url: "https://example.com".into(),
                    content: c.to_string(),
                })
                .collect(),
        })
    }

    pub fn failing() -> Self {
        Self {
            report: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn search(&self, query: &str) -> Result<SearchReport> {
        self.queries.lock().unwrap().push(query.to_string());
        self.report
            .clone()
            .ok_or_else(|| ProspectError::Search("search backend down".into()))
    }
}

/// Records every notification; fails for names listed in `fail_for`.
#[derive(Default)]
pub struct RecordingNotifier {
    pub fail_for: Vec<&'static str>,
    pub attempts: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl RecordingNotifier {
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, record: &CompanyRecord) -> Result<()> {
        let name = record.name().unwrap_or_default().to_string();
        self.attempts.lock().unwrap().push(name.clone());
        if self.fail_for.iter().any(|f| *f == name) {
            return Err(ProspectError::Notify(format!("mailbox full for {name}")));
        }
        Ok(())
    }
}
