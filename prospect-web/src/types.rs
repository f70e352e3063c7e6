use async_trait::async_trait;
use prospect_common::Result;
use serde::{Deserialize, Serialize};

/// One retrieved document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// What a search provider returned for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    /// Provider-generated summary, when the provider offers one.
    pub answer: Option<String>,
    pub hits: Vec<SearchHit>,
}

impl SearchReport {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty() && self.answer.as_deref().is_none_or(|a| a.trim().is_empty())
    }

    /// Text blocks for extraction: the answer first (if any), then each hit's
    /// content. Empty blocks are skipped.
    pub fn contents(&self) -> Vec<&str> {
        self.answer
            .as_deref()
            .into_iter()
            .chain(self.hits.iter().map(|h| h.content.as_str()))
            .filter(|c| !c.trim().is_empty())
            .collect()
    }
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    async fn search(&self, query: &str) -> Result<SearchReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contents_put_answer_first_and_skip_blanks() {
        let report = SearchReport {
            answer: Some("Acme raised $1M".into()),
            hits: vec![
                SearchHit {
                    content: "Globex, 40 employees".into(),
                    ..Default::default()
                },
                SearchHit::default(),
            ],
        };
        assert_eq!(report.contents(), vec!["Acme raised $1M", "Globex, 40 employees"]);
        assert!(!report.is_empty());
        assert!(SearchReport::default().is_empty());
    }
}
