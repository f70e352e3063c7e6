use async_trait::async_trait;
use prospect_http::RetryPolicy;
use prospect_web::browser::{BrowserCapturer, PageCapture};
use prospect_web::fetch::{FetchVia, PageFetcher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct CountingBrowser {
    calls: AtomicUsize,
}

#[async_trait]
impl BrowserCapturer for CountingBrowser {
    async fn capture(&self, url: &Url) -> anyhow::Result<PageCapture> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PageCapture {
            url: url.clone(),
            html: "<html><title>Rendered</title><body><p>Acme Corp</p></body></html>".into(),
        })
    }
}

fn fetcher(browser: Arc<CountingBrowser>) -> PageFetcher {
    PageFetcher::new(RetryPolicy::none(), Duration::from_secs(5))
        .unwrap()
        .with_browser(browser)
}

#[tokio::test]
async fn plain_pages_skip_the_browser() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body><li>Globex</li></body></html>"),
        )
        .mount(&server)
        .await;

    let browser = Arc::new(CountingBrowser::default());
    let page = fetcher(browser.clone())
        .fetch(&format!("{}/list", server.uri()))
        .await
        .unwrap();

    assert_eq!(page.via, FetchVia::Http);
    assert_eq!(browser.calls.load(Ordering::SeqCst), 0);
    assert_eq!(page.into_hit().content, "Globex");
}

#[tokio::test]
async fn forbidden_falls_back_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
        .expect(1)
        .mount(&server)
        .await;

    let browser = Arc::new(CountingBrowser::default());
    let page = fetcher(browser.clone())
        .fetch(&format!("{}/blocked", server.uri()))
        .await
        .unwrap();

    assert_eq!(page.via, FetchVia::Browser);
    assert_eq!(browser.calls.load(Ordering::SeqCst), 1);
    let hit = page.into_hit();
    assert_eq!(hit.title, "Rendered");
    assert_eq!(hit.content, "Rendered\nAcme Corp");
}

#[tokio::test]
async fn challenge_pages_fall_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><head><title>Just a moment...</title></head><body>checking</body></html>",
        ))
        .mount(&server)
        .await;

    let browser = Arc::new(CountingBrowser::default());
    let page = fetcher(browser.clone()).fetch(&server.uri()).await.unwrap();
    assert_eq!(page.via, FetchVia::Browser);
}

#[tokio::test]
async fn not_found_is_an_error_without_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let browser = Arc::new(CountingBrowser::default());
    let res = fetcher(browser.clone())
        .fetch(&format!("{}/missing", server.uri()))
        .await;
    assert!(res.is_err());
    assert_eq!(browser.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn blocked_without_browser_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let fetcher = PageFetcher::new(RetryPolicy::none(), Duration::from_secs(5)).unwrap();
    let err = fetcher.fetch(&server.uri()).await.unwrap_err();
    assert!(err.to_string().contains("no browser"));
}

#[tokio::test]
async fn background_challenge_script_does_not_trigger_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/saas"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><head><title>Top SaaS startups</title></head><body><li>Acme</li>\
             <script src=\"/cdn-cgi/challenge-platform/scripts/jsd/main.js\"></script></body></html>",
        ))
        .mount(&server)
        .await;

    let browser = Arc::new(CountingBrowser::default());
    let page = fetcher(browser.clone())
        .fetch(&format!("{}/saas", server.uri()))
        .await
        .unwrap();
    assert_eq!(page.via, FetchVia::Http);
    assert_eq!(browser.calls.load(Ordering::SeqCst), 0);
    assert_eq!(page.into_hit().content, "Top SaaS startups\nAcme");
}
