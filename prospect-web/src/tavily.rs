use crate::types::{SearchHit, SearchProvider, SearchReport};
use async_trait::async_trait;
use prospect_common::{ProspectError, Result};
use prospect_http::{Auth, HttpClient, RequestOpts, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const TAVILY_API_BASE: &str = "https://api.tavily.com/";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    Basic,
    Advanced,
}

impl SearchDepth {
    /// Anything other than `basic` means advanced.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("basic") {
            Self::Basic
        } else {
            Self::Advanced
        }
    }
}

/// Tavily `/search` client. Answers are requested alongside results.
pub struct TavilyClient {
    http: HttpClient,
    api_key: String,
    depth: SearchDepth,
    include_raw_content: bool,
    max_results: Option<u32>,
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    search_depth: SearchDepth,
    include_answer: bool,
    include_raw_content: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_results: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    raw_content: Option<String>,
}

impl TavilyClient {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, TAVILY_API_BASE)
    }

    pub fn with_base_url(api_key: String, base_url: &str) -> Result<Self> {
        let http = HttpClient::new(base_url)
            .map_err(|e| ProspectError::Search(format!("tavily client init failed: {e}")))?
            .with_timeout(Duration::from_secs(60));
        Ok(Self {
            http,
            api_key,
            depth: SearchDepth::Advanced,
            include_raw_content: true,
            max_results: None,
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.http = self.http.with_policy(policy);
        self
    }

    pub fn with_depth(mut self, depth: SearchDepth) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_raw_content(mut self, include: bool) -> Self {
        self.include_raw_content = include;
        self
    }

    pub fn with_max_results(mut self, max_results: Option<u32>) -> Self {
        self.max_results = max_results;
        self
    }
}

#[async_trait]
impl SearchProvider for TavilyClient {
    fn name(&self) -> &'static str {
        "tavily"
    }

    async fn search(&self, query: &str) -> Result<SearchReport> {
        let req = TavilyRequest {
            query,
            search_depth: self.depth,
            include_answer: true,
            include_raw_content: self.include_raw_content,
            max_results: self.max_results,
        };
        let opts = RequestOpts {
            auth: Some(Auth::Bearer(&self.api_key)),
            ..Default::default()
        };

        let resp: TavilyResponse = self
            .http
            .post_json_opts("search", &req, opts)
            .await
            .map_err(|e| ProspectError::Search(format!("tavily: {e}")))?;

        let hits: Vec<SearchHit> = resp
            .results
            .into_iter()
            .map(|r| {
                let content = match r.raw_content {
                    Some(raw) if !raw.trim().is_empty() => raw,
                    _ => r.content,
                };
                SearchHit {
                    title: r.title,
                    url: r.url,
                    content,
                }
            })
            .collect();

        tracing::info!(
            target: "web.tavily",
            query = %query,
            hit_count = hits.len(),
            has_answer = resp.answer.is_some(),
            "tavily.search"
        );

        Ok(SearchReport {
            answer: resp.answer,
            hits,
        })
    }
}
