//! Turns a validated [`ProspectConfig`] into ready-to-run components.
use anyhow::{Context, Result, bail};
use prospect_common::LlmConfig;
use prospect_config::{HttpSettings, ProspectConfig};
use prospect_http::RetryPolicy;
use prospect_llm::openai::PERPLEXITY_API_BASE;
use prospect_llm::{SharedLlm, ensure_llm_ready};
use prospect_pipeline::pipeline::StoragePaths;
use prospect_pipeline::{ChatAnswer, Enricher, Extractor, Pipeline, SmtpNotifier, SmtpSettings, StreamAnswer};
use prospect_web::browser::FantocciniCapturer;
use prospect_web::fetch::PageFetcher;
use prospect_web::scraperapi::ScraperApiClient;
use prospect_web::stream::{StreamOptions, StreamSearchClient};
use prospect_web::tavily::{SearchDepth, TavilyClient};
use prospect_web::SearchProvider;
use std::sync::Arc;
use std::time::Duration;

pub fn retry_policy(http: &HttpSettings) -> RetryPolicy {
    RetryPolicy {
        max_retries: http.max_retries,
        base_delay: Duration::from_millis(http.base_delay_ms),
        max_delay: Duration::from_millis(http.max_delay_ms),
        identity_on_decode: http.identity_on_decode,
        ..RetryPolicy::default()
    }
}

/// Answer models are OpenAI-compatible; without an explicit base they talk
/// to Perplexity.
pub fn answer_llm_config(cfg: &LlmConfig) -> LlmConfig {
    match cfg.clone() {
        LlmConfig::OpenAi {
            api_key,
            model,
            base_url,
            temperature,
            max_tokens,
        } => LlmConfig::OpenAi {
            api_key,
            model,
            base_url: base_url.or_else(|| Some(PERPLEXITY_API_BASE.to_string())),
            temperature,
            max_tokens,
        },
        other => other,
    }
}

fn primary_search(cfg: &ProspectConfig, policy: &RetryPolicy) -> Result<Arc<dyn SearchProvider>> {
    if let Some(t) = &cfg.search.tavily {
        let client = TavilyClient::with_base_url(t.api_key.clone(), &t.endpoint)?
            .with_policy(policy.clone())
            .with_depth(SearchDepth::parse(&t.search_depth))
            .with_raw_content(t.include_raw_content)
            .with_max_results(t.max_results);
        return Ok(Arc::new(client));
    }
    if let Some(s) = &cfg.search.scraperapi {
        return Ok(Arc::new(scraperapi(s, policy)?));
    }
    bail!("no search provider configured: set `search.tavily` or `search.scraperapi`")
}

fn scraperapi(s: &prospect_config::ScraperApiSettings, policy: &RetryPolicy) -> Result<ScraperApiClient> {
    Ok(ScraperApiClient::with_base_url(s.api_key.clone(), &s.endpoint)?
        .with_policy(policy.clone())
        .with_num(s.num))
}

/// Assemble the pipeline from every configured section.
pub async fn build_pipeline(cfg: &ProspectConfig) -> Result<Pipeline> {
    let policy = retry_policy(&cfg.http);
    let llm: SharedLlm = ensure_llm_ready(&cfg.llm, policy.clone())
        .await
        .context("building the extraction model client")?;
    let search = primary_search(cfg, &policy)?;

    let extractor = Extractor::new(llm.clone()).with_chunk_chars(cfg.extraction.chunk_chars);
    let mut pipeline = Pipeline::new(llm.clone(), search)
        .with_extractor(extractor)
        .with_default_keys(&cfg.extraction.default_keys[..])
        .with_storage(StoragePaths {
            companies: cfg.storage.companies_path.clone(),
            seen: cfg.storage.seen_path.clone(),
        });

    if let Some(s) = &cfg.search.stream {
        let options = StreamOptions {
            model: s.model.clone(),
            location: s.location.clone(),
            search_type: s.search_type.clone(),
            temperature: s.temperature,
            top_p: s.top_p,
            recency_filter: s.recency_filter.clone(),
        };
        let client = StreamSearchClient::new(s.api_key.clone(), &s.endpoint)?
            .with_policy(policy.clone())
            .with_options(options);
        pipeline = pipeline.with_stream_answer(Arc::new(StreamAnswer::new(client)));
    }

    if let Some(answer) = &cfg.answer_llm {
        let answer_llm = ensure_llm_ready(&answer_llm_config(answer), policy.clone())
            .await
            .context("building the answer model client")?;
        pipeline = pipeline.with_chat_answer(Arc::new(ChatAnswer::new(answer_llm)));
    }

    if let Some(s) = &cfg.search.scraperapi {
        let people: Arc<dyn SearchProvider> = Arc::new(scraperapi(s, &policy)?);
        let enricher = Enricher::new(people, llm.clone()).with_extra_roles(&cfg.extraction.roles[..]);
        pipeline = pipeline.with_enricher(enricher);
    }

    let mut fetcher = PageFetcher::new(policy, Duration::from_secs(cfg.fetch.timeout_secs))?;
    if cfg.fetch.browser_fallback {
        fetcher = fetcher.with_browser(Arc::new(FantocciniCapturer::new(
            cfg.fetch.webdriver_url.clone(),
            cfg.fetch.headless,
        )));
    }
    pipeline = pipeline.with_fetcher(fetcher);

    tracing::info!(
        target: "app",
        model = llm.model_name(),
        stream = cfg.search.stream.is_some(),
        answer = cfg.answer_llm.is_some(),
        enrich = cfg.search.scraperapi.is_some(),
        browser = cfg.fetch.browser_fallback,
        "pipeline.ready"
    );
    Ok(pipeline)
}

pub fn build_notifier(cfg: &ProspectConfig) -> Result<SmtpNotifier> {
    let Some(n) = &cfg.notify else {
        bail!("`notify` section is required for watch mode");
    };
    Ok(SmtpNotifier::new(&SmtpSettings {
        host: n.smtp_host.clone(),
        port: n.smtp_port,
        sender: n.sender.clone(),
        password: n.password.clone(),
        receiver: n.receiver.clone(),
    })?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_follows_settings() {
        let policy = retry_policy(&HttpSettings {
            max_retries: 5,
            base_delay_ms: 50,
            max_delay_ms: 1_000,
            identity_on_decode: false,
        });
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(50));
        assert_eq!(policy.max_delay, Duration::from_secs(1));
        assert!(!policy.identity_on_decode);
    }

    #[test]
    fn answer_model_defaults_to_perplexity() {
        let cfg = LlmConfig::OpenAi {
            api_key: "pplx".into(),
            model: "sonar-pro".into(),
            base_url: None,
            temperature: None,
            max_tokens: None,
        };
        match answer_llm_config(&cfg) {
            LlmConfig::OpenAi { base_url, .. } => assert_eq!(base_url.as_deref(), Some(PERPLEXITY_API_BASE)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn explicit_answer_base_is_kept() {
        let cfg = LlmConfig::OpenAi {
            api_key: "k".into(),
            model: "m".into(),
            base_url: Some("https://api.together.xyz/v1/".into()),
            temperature: None,
            max_tokens: None,
        };
        assert_eq!(answer_llm_config(&cfg), cfg);
    }

    #[test]
    fn watch_needs_notify_settings() {
        let cfg = prospect_config::ProspectConfigLoader::new()
            .with_yaml_str("llm:\n  provider: ollama\n  model: llama3.2:3b\n")
            .load()
            .unwrap();
        assert!(build_notifier(&cfg).is_err());
    }
}
