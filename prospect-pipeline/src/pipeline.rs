//! The end-to-end flows: `run`, `ensemble`, `answer`, `scrape` and the watch
//! loop's `poll_once`.
use crate::answer::AnswerSource;
use crate::enrich::{Enricher, merge_roles};
use crate::extract::Extractor;
use crate::interpret::{FilterInterpreter, Interpretation, fallback_query};
use crate::merge::Merger;
use crate::notify::Notifier;
use crate::record::{CompanyRecord, DEFAULT_KEYS, FilterKeys};
use crate::store::{load_seen, save_records};
use prospect_common::{ProspectError, Result};
use prospect_llm::SharedLlm;
use prospect_web::fetch::PageFetcher;
use prospect_web::{SearchProvider, SearchReport};
use std::path::PathBuf;
use std::sync::Arc;

/// Where snapshots go.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub companies: PathBuf,
    pub seen: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self {
            companies: PathBuf::from("companies.json"),
            seen: PathBuf::from("seen_companies.json"),
        }
    }
}

/// Outcome of one watch cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub fetched: usize,
    pub novel: usize,
    pub notified: usize,
    pub seen_total: usize,
}

pub struct Pipeline {
    interpreter: FilterInterpreter,
    extractor: Extractor,
    search: Arc<dyn SearchProvider>,
    stream: Option<Arc<dyn AnswerSource>>,
    chat: Option<Arc<dyn AnswerSource>>,
    enricher: Option<Enricher>,
    fetcher: Option<PageFetcher>,
    storage: StoragePaths,
    default_keys: Vec<String>,
}

impl Pipeline {
    /// A pipeline that interprets and extracts with `llm` and retrieves with
    /// `search`. Other sources are opt-in.
    pub fn new(llm: SharedLlm, search: Arc<dyn SearchProvider>) -> Self {
        Self {
            interpreter: FilterInterpreter::new(llm.clone()),
            extractor: Extractor::new(llm),
            search,
            stream: None,
            chat: None,
            enricher: None,
            fetcher: None,
            storage: StoragePaths::default(),
            default_keys: DEFAULT_KEYS.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_interpreter(mut self, interpreter: FilterInterpreter) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_stream_answer(mut self, source: Arc<dyn AnswerSource>) -> Self {
        self.stream = Some(source);
        self
    }

    pub fn with_chat_answer(mut self, source: Arc<dyn AnswerSource>) -> Self {
        self.chat = Some(source);
        self
    }

    pub fn with_enricher(mut self, enricher: Enricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn with_fetcher(mut self, fetcher: PageFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_storage(mut self, storage: StoragePaths) -> Self {
        self.storage = storage;
        self
    }

    /// Keys used when the interpreter names none.
    pub fn with_default_keys<S: AsRef<str>>(mut self, keys: &[S]) -> Self {
        if !keys.is_empty() {
            self.default_keys = keys.iter().map(|k| k.as_ref().to_string()).collect();
        }
        self
    }

    pub fn storage(&self) -> &StoragePaths {
        &self.storage
    }

    /// Interpret, search, extract, save.
    pub async fn run(&self, filters: &[String]) -> Result<Vec<CompanyRecord>> {
        let interp = self.interpret(filters).await;
        let keys = interp.keys(&self.default_keys[..]);
        let records = self.search_and_extract(&interp.query, &keys).await;
        save_records(&self.storage.companies, &records)?;
        Ok(records)
    }

    /// Search+extract and the streaming answer side by side, merged with
    /// first-seen precedence, then enriched with CEO/CTO plus `extra_roles`.
    pub async fn ensemble(&self, filters: &[String], extra_roles: &[String]) -> Result<Vec<CompanyRecord>> {
        let interp = self.interpret(filters).await;
        let keys = interp.keys(&self.default_keys[..]);

        let answered = async {
            match &self.stream {
                Some(source) => self.answer_from(source.as_ref(), &interp.query).await,
                None => Vec::new(),
            }
        };
        let (extracted, answered) = tokio::join!(self.search_and_extract(&interp.query, &keys), answered);

        let extracted: Vec<CompanyRecord> = extracted.into_iter().filter(|r| !r.is_blank()).collect();
        let mut merged = Merger::default().merge([extracted, answered]);
        tracing::info!(target: "pipeline.run", flow = "ensemble", merged = merged.len(), "ensemble.merged");

        if let Some(enricher) = &self.enricher {
            let roles = merge_roles(enricher.roles(), extra_roles);
            merged = enricher.enrich_roles(merged, &roles).await;
        }
        if merged.is_empty() {
            merged.push(CompanyRecord::placeholder(&keys));
        }
        save_records(&self.storage.companies, &merged)?;
        Ok(merged)
    }

    /// Ask the search-grounded chat model directly.
    pub async fn answer(&self, filters: &[String]) -> Result<Vec<CompanyRecord>> {
        let source = self
            .chat
            .as_ref()
            .ok_or_else(|| ProspectError::Config("no answer model configured".into()))?;
        let interp = self.interpret(filters).await;
        let records = self.answer_from(source.as_ref(), &interp.query).await;
        save_records(&self.storage.companies, &records)?;
        Ok(records)
    }

    /// Fetch the pages the interpreter proposed and extract from them.
    pub async fn scrape(&self, filters: &[String]) -> Result<Vec<CompanyRecord>> {
        let fetcher = self
            .fetcher
            .as_ref()
            .ok_or_else(|| ProspectError::Config("page fetching is not configured".into()))?;
        let interp = self.interpret(filters).await;
        let keys = interp.keys(&self.default_keys[..]);

        let mut sources = Vec::with_capacity(interp.urls.len());
        for url in &interp.urls {
            match fetcher.fetch(url).await {
                Ok(page) => {
                    let hit = page.into_hit();
                    if !hit.content.trim().is_empty() {
                        sources.push(hit.content);
                    }
                }
                Err(e) => tracing::warn!(target: "pipeline.run", %url, error = %e, "scrape.fetch_failed"),
            }
        }
        tracing::info!(target: "pipeline.run", flow = "scrape", urls = interp.urls.len(), pages = sources.len(), "scrape.fetched");

        let records = self.extractor.extract(&sources[..], &keys).await;
        save_records(&self.storage.companies, &records)?;
        Ok(records)
    }

    /// One watch cycle: retrieve, notify for each company not in the seen
    /// snapshot, then persist the grown snapshot. A failed notification is
    /// logged and the company is still marked seen.
    pub async fn poll_once(&self, filters: &[String], notifier: &dyn Notifier) -> Result<PollSummary> {
        let mut seen = load_seen(&self.storage.seen)?;
        let interp = self.interpret(filters).await;
        let keys = interp.keys(&self.default_keys[..]);
        let fresh = self.search_and_extract(&interp.query, &keys).await;

        let novel = Merger::default().novel(&fresh, &seen);
        let mut notified = 0usize;
        for record in &novel {
            match notifier.notify(record).await {
                Ok(()) => notified += 1,
                Err(e) => tracing::warn!(
                    target: "pipeline.notify",
                    company = record.name().unwrap_or_default(),
                    error = %e,
                    "notify.failed"
                ),
            }
        }

        let summary = PollSummary {
            fetched: fresh.len(),
            novel: novel.len(),
            notified,
            seen_total: seen.len() + novel.len(),
        };
        seen.extend(novel);
        save_records(&self.storage.seen, &seen)?;
        tracing::info!(
            target: "pipeline.run",
            flow = "watch",
            fetched = summary.fetched,
            novel = summary.novel,
            notified = summary.notified,
            seen = summary.seen_total,
            "poll.done"
        );
        Ok(summary)
    }

    async fn interpret(&self, filters: &[String]) -> Interpretation {
        match self.interpreter.interpret(filters).await {
            Ok(interp) => interp,
            Err(e) => {
                tracing::warn!(target: "pipeline.interpret", error = %e, "interpret.failed");
                Interpretation {
                    query: fallback_query(filters),
                    ..Default::default()
                }
            }
        }
    }

    async fn search_and_extract(&self, query: &str, keys: &FilterKeys) -> Vec<CompanyRecord> {
        let report = match self.search.search(query).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(target: "pipeline.search", provider = self.search.name(), error = %e, "search.failed");
                SearchReport::default()
            }
        };
        tracing::info!(
            target: "pipeline.search",
            provider = self.search.name(),
            hits = report.hits.len(),
            answer = report.answer.is_some(),
            "search.done"
        );
        self.extractor.extract(&report.contents()[..], keys).await
    }

    async fn answer_from(&self, source: &dyn AnswerSource, query: &str) -> Vec<CompanyRecord> {
        match source.companies(query).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(target: "pipeline.answer", source = source.name(), error = %e, "answer.failed");
                Vec::new()
            }
        }
    }
}
