use crate::recover::{RecoveryChain, holds_objects};
use crate::record::{FilterKeys, FilterRecord};
use prospect_common::Result;
use prospect_llm::SharedLlm;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// What the model made of the user's filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    pub filters: Vec<FilterRecord>,
    /// Search query; never empty.
    pub query: String,
    /// Pages the model expects to list matching companies.
    pub urls: Vec<String>,
}

impl Interpretation {
    /// Negotiated key set, falling back to `defaults` when no filter named a
    /// key.
    pub fn keys<S: AsRef<str>>(&self, defaults: &[S]) -> FilterKeys {
        FilterKeys::from_filters(&self.filters, defaults)
    }
}

/// `"list of companies that " + filters`.
pub fn fallback_query(filters: &[String]) -> String {
    format!("list of companies that {}", filters.join(", "))
}

pub fn build_interpret_prompt(filters: &[String]) -> String {
    format!(
        "For each of the following user-entered filters, identify the most meaningful key name \
(e.g., Funding, Employee size, Category, Revenue, Location, Funded By, etc.) and its value. \
Return a JSON object with three fields: \
'filters' (a JSON array of objects with 'key' and 'value'), \
'urls' (a JSON array of 3 to 5 URLs most likely to list companies matching all the filters), and \
'query' (a single efficient web search query to find companies matching all the filters). \
Filters: {filters}\n\
Example: {{\"filters\": [{{\"key\": \"Funding\", \"value\": \"1M\"}}, {{\"key\": \"Employee size\", \"value\": \"less than 50\"}}], \
\"urls\": [\"https://techcrunch.com/startups\", \"https://www.crunchbase.com/search/organization.companies\"], \
\"query\": \"B2B SaaS companies funded 1M with less than 50 employees\"}}\n\
Return only the JSON object.",
        filters = filters.join(", ")
    )
}

pub struct FilterInterpreter {
    llm: SharedLlm,
    chain: Arc<RecoveryChain>,
}

impl FilterInterpreter {
    pub fn new(llm: SharedLlm) -> Self {
        Self {
            llm,
            chain: Arc::new(RecoveryChain::default()),
        }
    }

    pub fn with_chain(mut self, chain: Arc<RecoveryChain>) -> Self {
        self.chain = chain;
        self
    }

    /// Ask the model for keys, a query and candidate URLs. Unparseable output
    /// degrades to no filters and the fallback query; transport errors
    /// propagate.
    pub async fn interpret(&self, filters: &[String]) -> Result<Interpretation> {
        let prompt = build_interpret_prompt(filters);
        let text = self.llm.complete(&prompt).await?;
        let parsed = self.chain.recover_where(&text, holds_objects);
        if parsed.is_none() {
            tracing::warn!(target: "pipeline.interpret", chars = text.len(), "interpret.unparsed");
        }
        let interp = parse_interpretation(parsed, filters);
        tracing::info!(
            target: "pipeline.interpret",
            filters = interp.filters.len(),
            urls = interp.urls.len(),
            query = %interp.query,
            "interpret.done"
        );
        Ok(interp)
    }
}

fn parse_interpretation(value: Option<Value>, raw: &[String]) -> Interpretation {
    let (filters, query, urls) = match value {
        Some(Value::Array(items)) => (filter_records(items), String::new(), Vec::new()),
        Some(Value::Object(mut obj)) => {
            let filters = match obj.remove("filters") {
                Some(Value::Array(items)) => filter_records(items),
                _ => Vec::new(),
            };
            let query = obj
                .get("query")
                .and_then(Value::as_str)
                .map(|q| q.trim().to_string())
                .unwrap_or_default();
            let urls = match obj.remove("urls") {
                Some(Value::Array(items)) => items
                    .into_iter()
                    .filter_map(|u| u.as_str().map(|s| s.trim().to_string()))
                    .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
                    .collect(),
                _ => Vec::new(),
            };
            (filters, query, urls)
        }
        _ => (Vec::new(), String::new(), Vec::new()),
    };
    let query = if query.is_empty() {
        fallback_query(raw)
    } else {
        query
    };
    Interpretation {
        filters,
        query,
        urls,
    }
}

fn filter_records(items: Vec<Value>) -> Vec<FilterRecord> {
    items
        .into_iter()
        .filter_map(|v| serde_json::from_value::<FilterRecord>(v).ok())
        .filter(|f| !f.key.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw() -> Vec<String> {
        vec!["funded $1M".into(), "employee size 50".into()]
    }

    #[test]
    fn full_object_is_read() {
        let v = json!({
            "filters": [{"key": "Funding", "value": "1M"}, {"key": "Employee size", "value": 50}],
            "urls": ["https://techcrunch.com/startups", "not a url"],
            "query": "startups funded 1M under 50 employees"
        });
        let i = parse_interpretation(Some(v), &raw());
        assert_eq!(i.filters.len(), 2);
        assert_eq!(i.filters[1].value, "50");
        assert_eq!(i.urls, vec!["https://techcrunch.com/startups"]);
        assert_eq!(i.query, "startups funded 1M under 50 employees");
        assert_eq!(
            i.keys(crate::record::DEFAULT_KEYS).as_slice(),
            ["Company Name", "Funding", "Employee size"]
        );
    }

    #[test]
    fn bare_array_is_the_filter_list() {
        let i = parse_interpretation(Some(json!([{"key": "Location", "value": "Berlin"}])), &raw());
        assert_eq!(i.filters[0].key, "Location");
        assert_eq!(i.query, "list of companies that funded $1M, employee size 50");
    }

    #[test]
    fn nothing_parsed_falls_back() {
        let i = parse_interpretation(None, &raw());
        assert!(i.filters.is_empty());
        assert_eq!(i.query, "list of companies that funded $1M, employee size 50");
        assert_eq!(i.keys(crate::record::DEFAULT_KEYS), FilterKeys::default());
    }

    #[test]
    fn citation_markers_do_not_hide_the_object() {
        let text = "Per [1] and [2]: {\"filters\": [{\"key\": \"Funding\", \"value\": \"1M\"}], \"query\": \"funded startups\"}";
        let parsed = RecoveryChain::default().recover_where(text, holds_objects);
        let i = parse_interpretation(parsed, &raw());
        assert_eq!(i.filters[0].key, "Funding");
        assert_eq!(i.query, "funded startups");
    }

    #[test]
    fn prompt_lists_filters() {
        let p = build_interpret_prompt(&raw());
        assert!(p.contains("Filters: funded $1M, employee size 50"));
        assert!(p.contains("Return only the JSON object."));
    }
}
