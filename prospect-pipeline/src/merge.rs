//! First-seen-wins merge of record lists.
//!
//! Identity comes from an injected [`IdentityKey`]. The default folds case
//! and surrounding whitespace only, so "Acme Inc." and "Acme, Inc" stay
//! distinct.
use crate::record::{CompanyRecord, NAME_KEYS};
use std::collections::HashSet;

pub trait IdentityKey: Send + Sync {
    /// Comparable identity, or `None` when the record has no usable name.
    fn identity(&self, record: &CompanyRecord) -> Option<String>;
}

/// First non-empty of the name keys, trimmed and lower-cased.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseInsensitiveName;

impl IdentityKey for CaseInsensitiveName {
    fn identity(&self, record: &CompanyRecord) -> Option<String> {
        NAME_KEYS
            .iter()
            .filter_map(|k| record.get_str(k))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_lowercase)
    }
}

impl<F> IdentityKey for F
where
    F: Fn(&CompanyRecord) -> Option<String> + Send + Sync,
{
    fn identity(&self, record: &CompanyRecord) -> Option<String> {
        self(record)
    }
}

pub struct Merger<I = CaseInsensitiveName> {
    identity: I,
    reference: HashSet<String>,
}

impl Default for Merger<CaseInsensitiveName> {
    fn default() -> Self {
        Self::new(CaseInsensitiveName)
    }
}

impl<I: IdentityKey> Merger<I> {
    pub fn new(identity: I) -> Self {
        Self {
            identity,
            reference: HashSet::new(),
        }
    }

    /// Also drop records whose identity appears in `reference`.
    pub fn excluding<'a>(mut self, reference: impl IntoIterator<Item = &'a CompanyRecord>) -> Self {
        let ids: Vec<String> = reference
            .into_iter()
            .filter_map(|r| self.identity.identity(r))
            .collect();
        self.reference.extend(ids);
        self
    }

    /// Concatenate `lists` in order, keeping the first record per identity.
    /// Records without an identity cannot be compared and are kept.
    ///
    /// ```
    /// use prospect_pipeline::merge::Merger;
    /// use prospect_pipeline::record::CompanyRecord;
    ///
    /// let a = vec![CompanyRecord::named("Acme"), CompanyRecord::named("Globex")];
    /// let b = vec![CompanyRecord::named("ACME "), CompanyRecord::named("Initech")];
    /// let merged = Merger::default().merge([a, b]);
    /// let names: Vec<_> = merged.iter().filter_map(|r| r.name()).collect();
    /// assert_eq!(names, ["Acme", "Globex", "Initech"]);
    /// ```
    pub fn merge<L>(&self, lists: impl IntoIterator<Item = L>) -> Vec<CompanyRecord>
    where
        L: IntoIterator<Item = CompanyRecord>,
    {
        let mut emitted: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        let mut dropped = 0usize;
        for record in lists.into_iter().flatten() {
            match self.identity.identity(&record) {
                Some(id) if self.reference.contains(&id) || emitted.contains(&id) => dropped += 1,
                Some(id) => {
                    emitted.insert(id);
                    out.push(record);
                }
                None => out.push(record),
            }
        }
        tracing::debug!(target: "pipeline.merge", kept = out.len(), dropped, "merge.done");
        out
    }

    /// Records whose identity is not in `seen` (nor repeated within
    /// `records`). Nameless records are never novel.
    pub fn novel(&self, records: &[CompanyRecord], seen: &[CompanyRecord]) -> Vec<CompanyRecord> {
        let mut known: HashSet<String> = seen
            .iter()
            .filter_map(|r| self.identity.identity(r))
            .collect();
        known.extend(self.reference.iter().cloned());
        records
            .iter()
            .filter(|r| match self.identity.identity(r) {
                Some(id) => known.insert(id),
                None => false,
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: serde_json::Value) -> CompanyRecord {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn overlapping_names_keep_first_seen() {
        let a = vec![
            rec(json!({"Company Name": "Acme", "Funding": "$1M"})),
            rec(json!({"Company Name": "Globex"})),
        ];
        let b = vec![
            rec(json!({"name": "acme", "Funding": "$5M"})),
            rec(json!({"name": "Initech"})),
        ];
        let merged = Merger::default().merge([a, b]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].get_str("Funding"), Some("$1M"));
        assert_eq!(merged[2].name(), Some("Initech"));
    }

    #[test]
    fn reference_set_excludes() {
        let seen = vec![CompanyRecord::named("Globex")];
        let merged = Merger::default()
            .excluding(&seen)
            .merge([vec![CompanyRecord::named("globex"), CompanyRecord::named("Hooli")]]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name(), Some("Hooli"));
    }

    #[test]
    fn nameless_records_survive_merge_but_are_not_novel() {
        let blank = rec(json!({"Company Name": "", "Funding": ""}));
        let merger = Merger::default();
        let merged = merger.merge([vec![blank.clone(), blank.clone()]]);
        assert_eq!(merged.len(), 2);
        assert!(merger.novel(&merged, &[]).is_empty());
    }

    #[test]
    fn near_duplicates_stay_distinct() {
        let merged = Merger::default().merge([vec![
            CompanyRecord::named("Acme Inc."),
            CompanyRecord::named("Acme, Inc"),
        ]]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn novel_against_seen_snapshot() {
        let seen = vec![CompanyRecord::named("Acme")];
        let fresh = vec![
            CompanyRecord::named("ACME"),
            CompanyRecord::named("Globex"),
            CompanyRecord::named("globex"),
        ];
        let novel = Merger::default().novel(&fresh, &seen);
        assert_eq!(novel.len(), 1);
        assert_eq!(novel[0].name(), Some("Globex"));
    }

    #[test]
    fn custom_identity_strategy() {
        let by_domain = |r: &CompanyRecord| r.get_str("Website").map(|w| w.trim_start_matches("www.").to_string());
        let merged = Merger::new(by_domain).merge([vec![
            rec(json!({"Company Name": "Acme", "Website": "www.acme.io"})),
            rec(json!({"Company Name": "Acme Corp", "Website": "acme.io"})),
        ]]);
        assert_eq!(merged.len(), 1);
    }
}
