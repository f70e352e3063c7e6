//! Streaming answer search over server-sent events.
//!
//! The endpoint accepts a JSON body with system and user prompts and answers
//! with `data: {"type": "...", "text": "..."}` events. Only `llm` events carry
//! answer text; `sources` and other event kinds are ignored. The stream ends
//! at EOF or `data: [DONE]`; nothing after `[DONE]` is read.

use futures::StreamExt;
use prospect_common::{ProspectError, Result};
use prospect_http::{HttpClient, RequestOpts, RetryPolicy};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables forwarded with every streamed search.
#[derive(Debug, Clone, Serialize)]
pub struct StreamOptions {
    pub model: String,
    pub location: String,
    pub search_type: String,
    pub temperature: f32,
    pub top_p: f32,
    pub recency_filter: String,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            model: "o3-mini-high".into(),
            location: "us".into(),
            search_type: "business".into(),
            temperature: 0.2,
            top_p: 0.9,
            recency_filter: "anytime".into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct StreamRequest<'a> {
    system_prompt: &'a str,
    user_prompt: &'a str,
    #[serde(flatten)]
    options: &'a StreamOptions,
    return_images: bool,
    return_sources: bool,
}

/// One decoded event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, PartialEq)]
enum Line {
    Event(StreamEvent),
    Done,
    Skip,
}

pub struct StreamSearchClient {
    http: HttpClient,
    api_key: String,
    options: StreamOptions,
}

impl StreamSearchClient {
    /// `endpoint` is the full URL of the streaming search route.
    pub fn new(api_key: String, endpoint: &str) -> Result<Self> {
        let http = HttpClient::new(endpoint)
            .map_err(|e| ProspectError::Search(format!("stream client init failed: {e}")))?
            .with_timeout(Duration::from_secs(300));
        Ok(Self {
            http,
            api_key,
            options: StreamOptions::default(),
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.http = self.http.with_policy(policy);
        self
    }

    pub fn with_options(mut self, options: StreamOptions) -> Self {
        self.options = options;
        self
    }

    /// Run one streamed search and return the concatenated `llm` text.
    pub async fn stream_text(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let body = StreamRequest {
            system_prompt,
            user_prompt,
            options: &self.options,
            return_images: false,
            return_sources: true,
        };
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&self.api_key)
            .map_err(|_| ProspectError::Config("stream api key is not a valid header".into()))?;
        headers.insert(HeaderName::from_static("x-api-key"), value);

        let resp = self
            .http
            .post_stream(
                "",
                &body,
                RequestOpts {
                    headers: Some(headers),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ProspectError::Search(format!("stream: {e}")))?;

        let mut bytes = resp.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut text = String::new();
        let mut events = 0usize;

        'read: loop {
            while let Some(line) = lines.next_line() {
                match parse_line(&line) {
                    Line::Event(ev) => {
                        events += 1;
                        accumulate(&mut text, ev);
                    }
                    Line::Done => break 'read,
                    Line::Skip => {}
                }
            }
            match bytes.next().await {
                Some(chunk) => {
                    let chunk = chunk.map_err(|e| ProspectError::Search(format!("stream read: {e}")))?;
                    lines.push(&chunk);
                }
                None => {
                    // Trailing event without a final newline.
                    if let Some(Line::Event(ev)) = lines.finish().map(|l| parse_line(&l)) {
                        events += 1;
                        accumulate(&mut text, ev);
                    }
                    break;
                }
            }
        }

        tracing::info!(target: "web.stream", events, chars = text.len(), "stream.search.done");
        Ok(text)
    }
}

/// Raw bytes split into lines. Only whole lines are decoded, so a character
/// split across network chunks survives.
#[derive(Debug, Default)]
struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.buf.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }

    /// Whatever is left once the body has ended.
    fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).trim().to_string())
    }
}

fn accumulate(out: &mut String, ev: StreamEvent) {
    if ev.kind == "llm" {
        if let Some(t) = ev.text {
            out.push_str(&t);
        }
    }
}

fn parse_line(line: &str) -> Line {
    let Some(data) = line.strip_prefix("data:") else {
        return Line::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Line::Done;
    }
    if data.is_empty() {
        return Line::Skip;
    }
    match serde_json::from_str::<StreamEvent>(data) {
        Ok(ev) => Line::Event(ev),
        Err(e) => {
            tracing::debug!(target: "web.stream", error = %e, "stream.event.unparsed");
            Line::Skip
        }
    }
}
