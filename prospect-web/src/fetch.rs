use crate::browser::BrowserCapturer;
use crate::extract::{extract_title, html_to_text, is_challenge_page};
use crate::types::SearchHit;
use prospect_common::{ProspectError, Result};
use prospect_http::{HttpClient, HttpError, RequestOpts, RetryPolicy};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Statuses that usually mean "a real browser would get through".
const BLOCKED_STATUSES: &[StatusCode] = &[
    StatusCode::UNAUTHORIZED,
    StatusCode::FORBIDDEN,
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::SERVICE_UNAVAILABLE,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchVia {
    Http,
    Browser,
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: Url,
    pub html: String,
    pub via: FetchVia,
}

impl FetchedPage {
    /// Reduce to a hit the extractor can consume.
    pub fn into_hit(self) -> SearchHit {
        SearchHit {
            title: extract_title(&self.html).unwrap_or_default(),
            url: self.url.to_string(),
            content: html_to_text(&self.html),
        }
    }
}

/// Plain GET with a single browser fallback for blocked pages.
pub struct PageFetcher {
    http: HttpClient,
    browser: Option<Arc<dyn BrowserCapturer>>,
}

impl PageFetcher {
    pub fn new(policy: RetryPolicy, timeout: Duration) -> Result<Self> {
        // Every request carries an absolute URL; the base is never joined.
        let http = HttpClient::new("http://localhost/")
            .map_err(|e| ProspectError::Search(format!("fetch client init failed: {e}")))?
            .with_timeout(timeout)
            .with_policy(policy);
        Ok(Self {
            http,
            browser: None,
        })
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserCapturer>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let parsed =
            Url::parse(url).map_err(|e| ProspectError::Search(format!("invalid url {url}: {e}")))?;
        let opts = RequestOpts {
            allow_absolute: true,
            ..Default::default()
        };

        let reason = match self.http.get_text(parsed.as_str(), opts).await {
            Ok(resp) if !is_challenge_page(&resp.body) => {
                return Ok(FetchedPage {
                    url: resp.url,
                    html: resp.body,
                    via: FetchVia::Http,
                });
            }
            Ok(_) => "challenge page".to_string(),
            Err(HttpError::Api { status, .. }) if BLOCKED_STATUSES.contains(&status) => {
                format!("status {status}")
            }
            Err(HttpError::Network(msg)) => format!("network: {msg}"),
            Err(e) => return Err(ProspectError::Search(format!("fetch {url}: {e}"))),
        };

        let Some(browser) = &self.browser else {
            return Err(ProspectError::Search(format!(
                "fetch {url} blocked ({reason}) and no browser is configured"
            )));
        };
        tracing::info!(target: "web.fetch", url = %parsed, reason = %reason, "fetch.browser_fallback");
        let page = browser.capture(&parsed).await?;
        Ok(FetchedPage {
            url: page.url,
            html: page.html,
            via: FetchVia::Browser,
        })
    }
}
