//! Fixtures for the chat-completions tests: a log sink and canned
//! OpenAI-compatible responses.
use prospect_common::observability::{LogConfig, init_logging};
use serde_json::{Value, json};
use std::sync::OnceLock;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

static INIT: OnceLock<()> = OnceLock::new();

/// Route client logs to a temp-dir file and stderr once per test binary.
#[allow(dead_code)]
pub fn init_test_tracing() {
    INIT.get_or_init(|| {
        let config = LogConfig {
            app_name: "prospect-llm-tests",
            log_dir: Some(std::env::temp_dir().join("prospect-llm-tests")),
            emit_stderr: true,
            default_filter: "prospect_llm=debug,prospect_http=debug,http=debug".to_string(),
            ..LogConfig::default()
        };
        let _ = init_logging(config);
    });
}

/// A chat-completions body whose only choice says `content`.
#[allow(dead_code)]
pub fn completion(model: &str, content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "model": model,
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

/// A server that answers every POST with `status` and `body`.
#[allow(dead_code)]
pub async fn serve_json(status: u16, body: Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(&server)
        .await;
    server
}
