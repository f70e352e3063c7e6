//! Minimal HTTP client with safe logging, a configurable retry policy, and
//! flexible auth.
//!
//! - Request options: headers, [`Auth`], query params, timeout, retry budget
//! - Redacts sensitive query params and never logs secret values
//! - [`RetryPolicy`]: exponential backoff for network faults, 429 and 5xx,
//!   `Retry-After` support, and a one-shot `Accept-Encoding: identity` retry
//!   when a compressed body cannot be decoded
//! - Optional *raw* request/response logging via `PROSPECT_HTTP_RAW=1`
//!
//! Example (no_run):
//! ```rust
//! # async fn demo() -> Result<(), prospect_http::HttpError> {
//! let client = prospect_http::HttpClient::new("https://api.example.com")?;
//! let got: serde_json::Value = client
//!     .get_json("v1/items", prospect_http::RequestOpts::default())
//!     .await?;
//! # Ok(()) }
//! ```

use reqwest::header::{ACCEPT_ENCODING, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

const RAW_ENV: &str = "PROSPECT_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024;

const SECRET_PARAMS: &[&str] = &[
    "access_token",
    "authorization",
    "auth",
    "key",
    "api_key",
    "apikey",
    "token",
    "secret",
    "client_secret",
    "bearer",
];

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

/// Render a curl command for repro/debug. Auth headers and secret query
/// params are redacted.
fn make_curl(method: &Method, url: &Url, headers: &HeaderMap, body: Option<&[u8]>) -> String {
    let mut parts = vec!["curl".to_string(), format!("-X{}", method)];
    for (name, val) in redact_headers(headers) {
        parts.push(format!("-H '{}: {}'", name, val.replace('\'', r"'\''")));
    }
    if let Some(bytes) = body {
        match std::str::from_utf8(bytes) {
            Ok(s) => {
                let mut s = s.to_string();
                if s.len() > RAW_MAX_BODY {
                    s.truncate(floor_char_boundary(&s, RAW_MAX_BODY));
                    s.push('…');
                }
                parts.push(format!("-d '{}'", s.replace('\'', r"'\''")));
            }
            Err(_) => parts.push(format!("--data-binary @- # ({} bytes)", bytes.len())),
        }
    }
    let mut shown = url.clone();
    let pairs: Vec<(String, String)> = redact_pairs(
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned())),
    );
    if pairs.is_empty() {
        shown.set_query(None);
    } else {
        shown.query_pairs_mut().clear().extend_pairs(pairs);
    }
    parts.push(format!("'{}'", shown.as_str()));
    parts.join(" ")
}

fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let lower = key.to_ascii_lowercase();
            let val = if lower == "authorization" {
                "Bearer <redacted>".to_string()
            } else if lower.contains("token") || lower.contains("api-key") {
                "<redacted>".to_string()
            } else {
                v.to_str().unwrap_or("").to_string()
            };
            (key, val)
        })
        .collect()
}

fn redact_pairs(pairs: impl Iterator<Item = (String, String)>) -> Vec<(String, String)> {
    pairs
        .map(|(k, v)| {
            let secret = SECRET_PARAMS.contains(&k.to_ascii_lowercase().as_str());
            (k, if secret { "<redacted>".to_string() } else { v })
        })
        .collect()
}

// ==============================
// Errors
// ==============================

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}, body_snippet: {1}")]
    Decode(String, String),
    #[error("server returned error {status}: {message}, request_id={request_id}")]
    Api {
        status: StatusCode,
        message: String,
        request_id: String,
    },
}

impl HttpError {
    /// HTTP status for API errors.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ==============================
// Retry policy
// ==============================

/// How a client reacts to transient failures.
///
/// ```
/// use prospect_http::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.backoff(1), Duration::from_millis(200));
/// assert_eq!(policy.backoff(2), Duration::from_millis(400));
/// assert!(RetryPolicy::none().max_retries == 0);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one for network faults, 429 and 5xx.
    pub max_retries: usize,
    /// Delay before the first retry; doubled for each further attempt.
    pub base_delay: Duration,
    /// Upper bound for any single backoff.
    pub max_delay: Duration,
    /// Minimum wait after a 429 without `Retry-After`.
    pub rate_limit_floor: Duration,
    /// After a body decoding failure, retry once with `Accept-Encoding:
    /// identity` and keep requesting identity for the client's lifetime.
    pub identity_on_decode: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            rate_limit_floor: Duration::from_millis(1100),
            identity_on_decode: true,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no decode workaround.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            identity_on_decode: false,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        let millis = (self.base_delay.as_millis() as u64).saturating_mul(1u64 << shift);
        Duration::from_millis(millis).min(self.max_delay)
    }

    fn status_backoff(&self, attempt: usize, status: StatusCode, headers: &HeaderMap) -> Duration {
        if let Some(secs) = retry_after_delay_secs(headers) {
            return Duration::from_secs(secs).min(self.max_delay);
        }
        let exp = self.backoff(attempt);
        if status == StatusCode::TOO_MANY_REQUESTS {
            exp.max(self.rate_limit_floor)
        } else {
            exp
        }
    }
}

// ==============================
// Auth & Request Options
// ==============================

/// Authentication strategies supported by the HTTP client helpers.
///
/// ```
/// use prospect_http::Auth;
///
/// let bearer = Auth::Bearer("token");
/// match bearer {
///     Auth::Bearer(value) => assert_eq!(value, "token"),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Clone, Debug)]
pub enum Auth<'a> {
    /// Authorization: Bearer <token>
    Bearer(&'a str),
    /// Custom header (e.g. `X-API-Key`)
    Header {
        name: HeaderName,
        value: HeaderValue,
    },
    /// Auth via query param (e.g. ScraperAPI `api_key`)
    Query {
        name: &'a str,
        value: Cow<'a, str>,
    },
    None,
}

impl Auth<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Auth::Bearer(_) => "bearer",
            Auth::Header { .. } => "header",
            Auth::Query { .. } => "query",
            Auth::None => "none",
        }
    }
}

/// Per-request tuning knobs.
///
/// ```
/// use prospect_http::{Auth, RequestOpts};
/// use std::borrow::Cow;
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(30)),
///     retries: Some(1),
///     auth: Some(Auth::Query {
///         name: "api_key",
///         value: Cow::Borrowed("demo"),
///     }),
///     ..Default::default()
/// };
///
/// assert_eq!(opts.timeout.unwrap().as_secs(), 30);
/// assert!(!opts.allow_absolute);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts<'a> {
    pub timeout: Option<Duration>,
    /// Overrides [`RetryPolicy::max_retries`] for this request.
    pub retries: Option<usize>,
    pub auth: Option<Auth<'a>>,
    pub headers: Option<HeaderMap>,
    pub query: Option<Vec<(&'a str, Cow<'a, str>)>>,
    /// If true and `path` is an absolute URL, use it as-is (ignore base).
    pub allow_absolute: bool,
}

/// Body of a successful text fetch.
#[derive(Debug, Clone)]
pub struct TextResponse {
    pub status: StatusCode,
    pub url: Url,
    pub content_type: Option<String>,
    pub body: String,
}

// ==============================
// Client
// ==============================

#[derive(Clone)]
pub struct HttpClient {
    base: Url,
    inner: Client,
    pub default_timeout: Duration,
    pub policy: RetryPolicy,
    force_identity: Arc<AtomicBool>,
}

impl HttpClient {
    /// Construct a client anchored to a base URL.
    ///
    /// ```no_run
    /// use prospect_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new("https://api.example.com")?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(30));
    /// assert_eq!(client.policy.max_retries, 2);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(base: &str) -> Result<Self, HttpError> {
        let base = Url::parse(base).map_err(|e| HttpError::Url(e.to_string()))?;
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("prospect/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            inner,
            default_timeout: Duration::from_secs(30),
            policy: RetryPolicy::default(),
            force_identity: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether the client has switched to `Accept-Encoding: identity`.
    pub fn identity_forced(&self) -> bool {
        self.force_identity.load(Ordering::Relaxed)
    }

    /// POST JSON with optional Bearer auth.
    pub async fn post_json<B, T>(
        &self,
        path: &str,
        bearer: Option<&str>,
        body: &B,
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let opts = RequestOpts {
            auth: bearer.map(Auth::Bearer),
            ..Default::default()
        };
        self.post_json_opts(path, body, opts).await
    }

    /// GET JSON with per-request options.
    pub async fn get_json<T>(&self, path: &str, opts: RequestOpts<'_>) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        let (exchange, _) = self.execute(Method::GET, path, None, opts).await?;
        exchange.decode()
    }

    /// POST JSON with per-request options.
    pub async fn post_json_opts<B, T>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOpts<'_>,
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let bytes = serde_json::to_vec(body).map_err(|e| HttpError::Build(e.to_string()))?;
        let (exchange, _) = self.execute(Method::POST, path, Some(bytes), opts).await?;
        exchange.decode()
    }

    /// GET a page as text (lossy UTF-8).
    pub async fn get_text(&self, path: &str, opts: RequestOpts<'_>) -> Result<TextResponse, HttpError> {
        let (exchange, url) = self.execute(Method::GET, path, None, opts).await?;
        let content_type = exchange
            .headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(TextResponse {
            status: exchange.status,
            url,
            content_type,
            body: String::from_utf8_lossy(&exchange.body).into_owned(),
        })
    }

    /// POST JSON and hand back the open response for incremental reading
    /// (server-sent events). Only the send is retried; the body is not
    /// buffered.
    pub async fn post_stream<B>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOpts<'_>,
    ) -> Result<Response, HttpError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.resolve(path, opts.allow_absolute)?;
        let bytes = serde_json::to_vec(body).map_err(|e| HttpError::Build(e.to_string()))?;
        let max_retries = opts.retries.unwrap_or(self.policy.max_retries);
        let mut attempt = 0usize;

        loop {
            let rb = self
                .build(&Method::POST, &url, Some(&bytes), &opts)?
                .header(reqwest::header::ACCEPT, "text/event-stream");
            match rb.send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    let headers = resp.headers().clone();
                    let body = resp.bytes().await.unwrap_or_default();
                    if (status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error())
                        && attempt < max_retries
                    {
                        attempt += 1;
                        let delay = self.policy.status_backoff(attempt, status, &headers);
                        tracing::warn!(%status, attempt, backoff_ms = delay.as_millis() as u64, "http.stream.retrying");
                        sleep(delay).await;
                        continue;
                    }
                    return Err(HttpError::Api {
                        status,
                        message: extract_error_message_multi(&body),
                        request_id: request_id_header(&headers),
                    });
                }
                Err(err) if attempt < max_retries => {
                    attempt += 1;
                    let delay = self.policy.backoff(attempt);
                    tracing::warn!(attempt, message = %err, "http.stream.retrying.network");
                    sleep(delay).await;
                }
                Err(err) => return Err(HttpError::Network(err.to_string())),
            }
        }
    }

    fn resolve(&self, path: &str, allow_absolute: bool) -> Result<Url, HttpError> {
        if allow_absolute {
            if let Ok(abs) = Url::parse(path) {
                return Ok(abs);
            }
        }
        self.base
            .join(path)
            .map_err(|e| HttpError::Url(e.to_string()))
    }

    fn build(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&Vec<u8>>,
        opts: &RequestOpts<'_>,
    ) -> Result<reqwest::RequestBuilder, HttpError> {
        let mut rb = self
            .inner
            .request(method.clone(), url.clone())
            .timeout(opts.timeout.unwrap_or(self.default_timeout));

        let mut query: Vec<(&str, &str)> = opts
            .query
            .as_ref()
            .map(|q| q.iter().map(|(k, v)| (*k, v.as_ref())).collect())
            .unwrap_or_default();

        if let Some(bytes) = body {
            rb = rb
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(bytes.clone());
        }
        if let Some(hdrs) = &opts.headers {
            rb = rb.headers(hdrs.clone());
        }
        if self.identity_forced() {
            rb = rb.header(ACCEPT_ENCODING, "identity");
        }

        match &opts.auth {
            Some(Auth::Bearer(tok)) => {
                rb = rb.bearer_auth(sanitize_api_key(tok)?);
            }
            Some(Auth::Header { name, value }) => {
                rb = rb.header(name, value);
            }
            Some(Auth::Query { name, value }) => {
                query.push((*name, value.as_ref()));
            }
            Some(Auth::None) | None => {}
        }
        if !query.is_empty() {
            rb = rb.query(&query);
        }
        Ok(rb)
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        opts: RequestOpts<'_>,
    ) -> Result<(Exchange, Url), HttpError> {
        let url = self.resolve(path, opts.allow_absolute)?;
        let max_retries = opts.retries.unwrap_or(self.policy.max_retries);
        let auth_kind = opts.auth.as_ref().map(Auth::kind).unwrap_or("none");
        let redacted_q = redact_pairs(
            opts.query
                .iter()
                .flatten()
                .map(|(k, v)| ((*k).to_string(), v.to_string())),
        );
        let req_id = format!("r{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);

        let mut attempt = 0usize;
        let mut identity_retry_used = false;

        loop {
            let rb = self.build(&method, &url, body.as_ref(), &opts)?;

            tracing::debug!(
                req_id = %req_id,
                attempt = attempt + 1,
                max_retries,
                method = %method,
                host_path = %format!("{}{}", url.host_str().unwrap_or("-"), url.path()),
                query = ?redacted_q,
                auth_kind,
                has_body = body.is_some(),
                identity = self.identity_forced(),
                "http.request.start"
            );

            if raw_enabled() {
                let merged = opts.headers.clone().unwrap_or_default();
                let curl = make_curl(&method, &url, &merged, body.as_deref());
                tracing::debug!(target: "http.raw", %req_id, %curl, "request");
            }

            let t0 = std::time::Instant::now();
            let resp = match rb.send().await {
                Ok(resp) => resp,
                Err(err) => {
                    if attempt < max_retries {
                        attempt += 1;
                        let delay = self.policy.backoff(attempt);
                        tracing::warn!(
                            req_id = %req_id,
                            attempt,
                            max_retries,
                            backoff_ms = delay.as_millis() as u64,
                            message = %err,
                            "http.retrying.network_send"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(req_id = %req_id, attempt, message = %err, "http.network_error.send");
                    return Err(HttpError::Network(err.to_string()));
                }
            };
            let status = resp.status();
            let final_url = resp.url().clone();
            let headers = resp.headers().clone();

            let bytes = match resp.bytes().await {
                Ok(bytes) => bytes,
                Err(err) => {
                    if (err.is_decode() || err.is_body())
                        && self.policy.identity_on_decode
                        && !identity_retry_used
                    {
                        identity_retry_used = true;
                        self.force_identity.store(true, Ordering::Relaxed);
                        tracing::warn!(
                            req_id = %req_id,
                            message = %err,
                            "http.retrying.identity_encoding"
                        );
                        continue;
                    }
                    if attempt < max_retries {
                        attempt += 1;
                        let delay = self.policy.backoff(attempt);
                        tracing::warn!(
                            req_id = %req_id,
                            attempt,
                            max_retries,
                            backoff_ms = delay.as_millis() as u64,
                            message = %err,
                            "http.retrying.network_body"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(req_id = %req_id, attempt, message = %err, "http.network_error.body");
                    return Err(HttpError::Network(err.to_string()));
                }
            };
            let dur_ms = t0.elapsed().as_millis() as u64;
            let request_id = request_id_header(&headers);

            tracing::debug!(
                req_id = %req_id,
                %status,
                duration_ms = dur_ms,
                body_len = bytes.len(),
                x_request_id = %request_id,
                "http.response.headers"
            );

            if raw_enabled() {
                let mut body_snip = bytes.to_vec();
                let truncated = body_snip.len() > RAW_MAX_BODY;
                body_snip.truncate(RAW_MAX_BODY);
                tracing::info!(
                    target: "http.raw",
                    %req_id,
                    status = %status,
                    duration_ms = dur_ms,
                    headers = ?redact_headers(&headers),
                    body = %String::from_utf8_lossy(&body_snip),
                    truncated
                );
            }

            if status.is_success() {
                return Ok((
                    Exchange {
                        status,
                        headers,
                        body: bytes.to_vec(),
                        req_id,
                    },
                    final_url,
                ));
            }

            let message = extract_error_message_multi(&bytes);
            let snippet = snip_body(&bytes);
            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();

            if retryable && attempt < max_retries {
                attempt += 1;
                let delay = self.policy.status_backoff(attempt, status, &headers);
                tracing::warn!(
                    req_id = %req_id,
                    %status,
                    attempt,
                    max_retries,
                    backoff_ms = delay.as_millis() as u64,
                    message = %message,
                    "http.retrying"
                );
                sleep(delay).await;
                continue;
            }

            tracing::warn!(
                req_id = %req_id,
                %status,
                message = %message,
                x_request_id = %request_id,
                body_snippet = %snippet,
                "http.error"
            );
            return Err(HttpError::Api {
                status,
                message,
                request_id,
            });
        }
    }
}

/// A buffered successful response.
struct Exchange {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    req_id: String,
}

impl Exchange {
    fn decode<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        serde_json::from_slice::<T>(&self.body).map_err(|e| {
            let snippet = snip_body(&self.body);
            tracing::warn!(
                req_id = %self.req_id,
                serde_line = e.line(),
                serde_col = e.column(),
                serde_err = %e,
                body_snippet = %snippet,
                "http.response.decode_error"
            );
            HttpError::Decode(e.to_string(), snippet)
        })
    }
}

// ==============================
// Helpers
// ==============================

fn request_id_header(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .or_else(|| headers.get("x-correlation-id"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string()
}

fn extract_error_message_multi(body: &[u8]) -> String {
    // OpenAI style: {"error":{"message":"..."}}
    #[derive(Deserialize)]
    struct OpenAiEnv {
        error: OpenAiDetail,
    }
    #[derive(Deserialize)]
    struct OpenAiDetail {
        message: String,
    }

    // Generic: {"message":"..."} or {"detail":"..."} or {"error":"..."}
    #[derive(Deserialize)]
    struct Msg {
        #[serde(default)]
        message: String,
        #[serde(default)]
        detail: String,
        #[serde(default)]
        error: String,
    }

    if let Ok(env) = serde_json::from_slice::<OpenAiEnv>(body) {
        return env.error.message;
    }
    if let Ok(m) = serde_json::from_slice::<Msg>(body) {
        for candidate in [m.message, m.detail, m.error] {
            if !candidate.is_empty() {
                return candidate;
            }
        }
    }
    snip_body(body)
}

fn retry_after_delay_secs(h: &HeaderMap) -> Option<u64> {
    h.get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())?
        .trim()
        .parse()
        .ok()
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn snip_body(body: &[u8]) -> String {
    let mut snip = String::from_utf8_lossy(body).to_string();
    if snip.len() > 500 {
        snip.truncate(floor_char_boundary(&snip, 500));
        snip.push_str("...");
    }
    snip
}

fn sanitize_api_key(raw: &str) -> Result<String, HttpError> {
    let mut s = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string();
    s.retain(|ch| !ch.is_ascii_whitespace());

    if !s.is_ascii() {
        return Err(HttpError::Build("API key contains non-ASCII bytes".into()));
    }
    if s.bytes().any(|b| b < 0x20 || b == 0x7F) {
        return Err(HttpError::Build(
            "API key contains control characters".into(),
        ));
    }
    HeaderValue::from_str(&format!("Bearer {}", s))
        .map_err(|e| HttpError::Build(format!("invalid Authorization header: {e}")))?;
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_quotes_and_whitespace() {
        assert_eq!(sanitize_api_key(" \"hf_abc\n123\" ").unwrap(), "hf_abc123");
        assert!(sanitize_api_key("kéy").is_err());
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_delay: Duration::from_millis(500),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(500));
        assert_eq!(policy.backoff(40), Duration::from_millis(500));
    }

    #[test]
    fn rate_limit_uses_floor_without_retry_after() {
        let policy = RetryPolicy::default();
        let delay = policy.status_backoff(1, StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new());
        assert_eq!(delay, Duration::from_millis(1100));

        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        let delay = policy.status_backoff(1, StatusCode::SERVICE_UNAVAILABLE, &headers);
        assert_eq!(delay, Duration::from_secs(3));
    }

    #[test]
    fn error_message_prefers_openai_envelope() {
        let body = br#"{"error":{"message":"model overloaded"}}"#;
        assert_eq!(extract_error_message_multi(body), "model overloaded");
        let body = br#"{"detail":"Unauthorized"}"#;
        assert_eq!(extract_error_message_multi(body), "Unauthorized");
    }

    #[test]
    fn curl_redacts_secrets() {
        let url = Url::parse("https://api.scraperapi.com/search?api_key=s3cr3t&query=saas").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("s3cr3t"));
        let curl = make_curl(&Method::GET, &url, &headers, None);
        assert!(!curl.contains("s3cr3t"));
        assert!(curl.contains("query=saas"));
    }
}
