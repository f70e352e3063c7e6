//! Look up people (CEO, CTO, ...) for merged companies via web search
//! snippets and the LLM.
use crate::recover::RecoveryChain;
use crate::record::CompanyRecord;
use prospect_common::{ProspectError, Result};
use prospect_llm::SharedLlm;
use prospect_web::SearchProvider;
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Source recorded when the model answers a role with a bare name.
pub const DERIVED_SOURCE: &str = "LLM+Google Search";

pub fn default_roles() -> Vec<String> {
    vec!["CEO".to_string(), "CTO".to_string()]
}

/// `base` followed by `extra`, without case-insensitive duplicates or blanks.
pub fn merge_roles<S: AsRef<str>>(base: &[S], extra: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for r in base.iter().chain(extra).map(|r| r.as_ref().trim()) {
        if !r.is_empty() && !out.iter().any(|o| o.eq_ignore_ascii_case(r)) {
            out.push(r.to_string());
        }
    }
    out
}

pub fn enrichment_query(roles: &[String], name: &str) -> String {
    format!("{} of {}", roles.join(" and "), name)
}

pub fn build_enrich_prompt(name: &str, roles: &[String], snippets: &str) -> String {
    format!(
        "You are a business information assistant.\n\
Given the following web search snippets, extract the names of the following roles for the company '{name}': {roles}.\n\
Return a JSON object with each role as a key, and value as an object with 'name' and 'source' fields.\n\
If a role is not found, set its value to an empty string.\n\
Use only the information in the snippets.\n\
Snippets: {snippets}\n\
Example output: {{\"CEO\": {{\"name\": \"John Doe\", \"source\": \"snippet or url\"}}, \"CTO\": {{\"name\": \"Jane Smith\", \"source\": \"snippet or url\"}}}}\n\
Return only the JSON object.",
        roles = roles.join(", ")
    )
}

pub struct Enricher {
    search: Arc<dyn SearchProvider>,
    llm: SharedLlm,
    chain: Arc<RecoveryChain>,
    roles: Vec<String>,
}

impl Enricher {
    pub fn new(search: Arc<dyn SearchProvider>, llm: SharedLlm) -> Self {
        Self {
            search,
            llm,
            chain: Arc::new(RecoveryChain::default()),
            roles: default_roles(),
        }
    }

    /// Look up these roles in addition to CEO and CTO.
    pub fn with_extra_roles<S: AsRef<str>>(mut self, extra: &[S]) -> Self {
        let extra: Vec<&str> = extra.iter().map(|s| s.as_ref()).collect();
        let base: Vec<&str> = self.roles.iter().map(String::as_str).collect();
        self.roles = merge_roles(&base[..], &extra[..]);
        self
    }

    pub fn with_chain(mut self, chain: Arc<RecoveryChain>) -> Self {
        self.chain = chain;
        self
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Enrich each named record in place; failures are logged and skipped.
    pub async fn enrich(&self, records: Vec<CompanyRecord>) -> Vec<CompanyRecord> {
        self.enrich_roles(records, &self.roles).await
    }

    /// Like [`Enricher::enrich`], looking up `roles` instead of the
    /// configured set.
    pub async fn enrich_roles(&self, mut records: Vec<CompanyRecord>, roles: &[String]) -> Vec<CompanyRecord> {
        let mut enriched = 0usize;
        for record in records.iter_mut() {
            let Some(name) = record.name().map(str::to_string) else {
                continue;
            };
            match self.enrich_one(&name, roles, record).await {
                Ok(found) => {
                    if found > 0 {
                        enriched += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(target: "pipeline.enrich", company = %name, error = %e, "enrich.failed");
                }
            }
        }
        tracing::info!(target: "pipeline.enrich", records = records.len(), enriched, roles = ?roles, "enrich.done");
        records
    }

    async fn enrich_one(&self, name: &str, roles: &[String], record: &mut CompanyRecord) -> Result<usize> {
        let report = self.search.search(&enrichment_query(roles, name)).await?;
        let snippets = report
            .hits
            .iter()
            .map(|h| h.content.as_str())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let text = self
            .llm
            .complete(&build_enrich_prompt(name, roles, &snippets))
            .await?;
        let info = match self.chain.recover(&text) {
            Some(Value::Object(map)) => map,
            _ => {
                return Err(ProspectError::Llm(format!(
                    "no role object in answer for {name}"
                )));
            }
        };

        let mut found = 0usize;
        for role in roles {
            if let Some(value) = role_value(&info, role) {
                record.insert(role.clone(), value);
                found += 1;
            }
        }
        Ok(found)
    }
}

/// Normalise one role entry: an object with a non-empty `name` is kept, a
/// non-empty string becomes `{name, source}`.
fn role_value(info: &Map<String, Value>, role: &str) -> Option<Value> {
    let raw = info.get(role).or_else(|| {
        info.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(role))
            .map(|(_, v)| v)
    })?;
    match raw {
        Value::Object(o) if o.get("name").and_then(Value::as_str).is_some_and(|n| !n.trim().is_empty()) => {
            Some(raw.clone())
        }
        Value::String(s) if !s.trim().is_empty() => Some(json!({"name": s.trim(), "source": DERIVED_SOURCE})),
        _ => None,
    }
}
