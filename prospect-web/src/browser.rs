use anyhow::Result;
use fantoccini::{Client, ClientBuilder};
use serde_json::json;
use url::Url;
use webdriver::capabilities::Capabilities;

#[derive(Debug, Clone)]
pub struct PageCapture {
    pub url: Url,
    pub html: String,
}

#[async_trait::async_trait]
pub trait BrowserCapturer: Send + Sync {
    async fn capture(&self, url: &Url) -> Result<PageCapture>;
}

/// Chrome via a running WebDriver service (chromedriver on
/// `http://localhost:9515` unless configured otherwise). One session per
/// capture.
pub struct FantocciniCapturer {
    webdriver_url: String,
    headless: bool,
}

impl FantocciniCapturer {
    pub fn new(webdriver_url: impl Into<String>, headless: bool) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            headless,
        }
    }

    fn capabilities(&self) -> Capabilities {
        let mut args = vec![
            json!("--no-sandbox"),
            json!("--disable-dev-shm-usage"),
            json!("--window-size=1366,900"),
        ];
        if self.headless {
            args.push(json!("--headless"));
            args.push(json!("--disable-gpu"));
        }
        let mut caps = Capabilities::new();
        caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
        caps
    }

    async fn connect(&self) -> Result<Client> {
        let client = ClientBuilder::native()
            .capabilities(self.capabilities())
            .connect(&self.webdriver_url)
            .await?;
        Ok(client)
    }
}

#[async_trait::async_trait]
impl BrowserCapturer for FantocciniCapturer {
    async fn capture(&self, url: &Url) -> Result<PageCapture> {
        let client = self.connect().await?;
        tracing::debug!(target: "web.browser", url = %url, "browser.capture.start");

        let outcome = async {
            client.goto(url.as_str()).await?;
            let html = client.source().await?;
            let landed = client.current_url().await.unwrap_or_else(|_| url.clone());
            Ok::<_, anyhow::Error>(PageCapture { url: landed, html })
        }
        .await;

        // Always attempt to close the session before returning
        let _ = client.close().await;
        if let Ok(page) = &outcome {
            tracing::info!(target: "web.browser", url = %page.url, html_len = page.html.len(), "browser.capture.done");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_adds_flags() {
        let caps = FantocciniCapturer::new("http://localhost:9515", true).capabilities();
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.contains(&json!("--headless")));

        let caps = FantocciniCapturer::new("http://localhost:9515", false).capabilities();
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(!args.contains(&json!("--headless")));
    }
}
