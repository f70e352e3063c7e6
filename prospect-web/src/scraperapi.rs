use crate::types::{SearchHit, SearchProvider, SearchReport};
use async_trait::async_trait;
use prospect_common::{ProspectError, Result};
use prospect_http::{Auth, HttpClient, RequestOpts, RetryPolicy};
use serde::Deserialize;
use std::borrow::Cow;
use std::time::Duration;

pub const SCRAPERAPI_BASE: &str = "https://api.scraperapi.com/";

/// ScraperAPI structured Google search. Organic results become hits with the
/// result snippet as content.
pub struct ScraperApiClient {
    http: HttpClient,
    api_key: String,
    num: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GoogleSearchResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

impl ScraperApiClient {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, SCRAPERAPI_BASE)
    }

    pub fn with_base_url(api_key: String, base_url: &str) -> Result<Self> {
        let http = HttpClient::new(base_url)
            .map_err(|e| ProspectError::Search(format!("scraperapi client init failed: {e}")))?
            .with_timeout(Duration::from_secs(70));
        Ok(Self {
            http,
            api_key,
            num: None,
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.http = self.http.with_policy(policy);
        self
    }

    pub fn with_num(mut self, num: Option<u32>) -> Self {
        self.num = num;
        self
    }
}

#[async_trait]
impl SearchProvider for ScraperApiClient {
    fn name(&self) -> &'static str {
        "scraperapi"
    }

    async fn search(&self, query: &str) -> Result<SearchReport> {
        let mut params: Vec<(&str, Cow<'_, str>)> = vec![("query", Cow::Borrowed(query))];
        if let Some(n) = self.num {
            params.push(("num", Cow::Owned(n.to_string())));
        }
        let opts = RequestOpts {
            auth: Some(Auth::Query {
                name: "api_key",
                value: Cow::Borrowed(self.api_key.as_str()),
            }),
            query: Some(params),
            ..Default::default()
        };

        let resp: GoogleSearchResponse = self
            .http
            .get_json("structured/google/search", opts)
            .await
            .map_err(|e| ProspectError::Search(format!("scraperapi: {e}")))?;

        let hits: Vec<SearchHit> = resp
            .organic_results
            .into_iter()
            .map(|r| SearchHit {
                title: r.title,
                url: r.link,
                content: r.snippet,
            })
            .collect();
        tracing::info!(target: "web.scraperapi", query = %query, hit_count = hits.len(), "scraperapi.search");

        Ok(SearchReport { answer: None, hits })
    }
}
