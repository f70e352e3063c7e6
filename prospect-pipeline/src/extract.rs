use crate::recover::{RecoveryChain, recover_records};
use crate::record::{CompanyRecord, FilterKeys};
use prospect_llm::SharedLlm;
use std::sync::Arc;

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_CHARS: usize = 12_000;

pub fn build_extract_prompt(keys: &FilterKeys, source: &str) -> String {
    format!(
        "Given the following information about companies, extract a JSON array where each object \
has these keys: {keys}. For each company, always extract the company name and only fill keys for \
which data is available; set missing keys to empty string. Do not invent or guess missing data. \
Extract from tables and text. Only include companies that match the filters.\n\
Here is the data:\n\
Source: {source}\n\
Return only the JSON array.",
        keys = keys.joined()
    )
}

/// Join source blocks, each followed by a blank line.
pub fn join_sources<S: AsRef<str>>(sources: &[S]) -> String {
    let mut out = String::new();
    for s in sources {
        out.push_str(s.as_ref());
        out.push_str("\n\n");
    }
    out
}

/// Split `text` into chunks of at most `max_chars` characters, breaking on
/// line boundaries. A single line longer than the limit is split at char
/// boundaries. Whitespace-only chunks are dropped.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    let mut flush = |current: &mut String, current_chars: &mut usize| {
        if !current.trim().is_empty() {
            chunks.push(std::mem::take(current));
        } else {
            current.clear();
        }
        *current_chars = 0;
    };

    for line in text.split_inclusive('\n') {
        let line_chars = line.chars().count();
        if current_chars + line_chars > max_chars {
            flush(&mut current, &mut current_chars);
        }
        if line_chars > max_chars {
            let mut piece = String::new();
            let mut piece_chars = 0usize;
            for c in line.chars() {
                piece.push(c);
                piece_chars += 1;
                if piece_chars == max_chars {
                    flush(&mut piece, &mut piece_chars);
                }
            }
            current = piece;
            current_chars = piece_chars;
            continue;
        }
        current.push_str(line);
        current_chars += line_chars;
    }
    flush(&mut current, &mut current_chars);
    chunks
}

/// LLM-backed extraction of company records from source text.
pub struct Extractor {
    llm: SharedLlm,
    chain: Arc<RecoveryChain>,
    chunk_chars: usize,
}

impl Extractor {
    pub fn new(llm: SharedLlm) -> Self {
        Self {
            llm,
            chain: Arc::new(RecoveryChain::default()),
            chunk_chars: DEFAULT_CHUNK_CHARS,
        }
    }

    pub fn with_chunk_chars(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = chunk_chars.max(1);
        self
    }

    pub fn with_chain(mut self, chain: Arc<RecoveryChain>) -> Self {
        self.chain = chain;
        self
    }

    /// Extract records over `keys` from `sources`. Chunks run concurrently,
    /// one task each, and results keep chunk order. A failed chunk adds
    /// nothing; when no chunk yields a record the result is one placeholder.
    pub async fn extract<S: AsRef<str>>(&self, sources: &[S], keys: &FilterKeys) -> Vec<CompanyRecord> {
        let text = join_sources(sources);
        let chunks = chunk_text(&text, self.chunk_chars);
        tracing::info!(
            target: "pipeline.extract",
            sources = sources.len(),
            chunks = chunks.len(),
            keys = %keys.joined(),
            "extract.start"
        );

        let per_chunk: Vec<Vec<CompanyRecord>> = match chunks.len() {
            0 => Vec::new(),
            1 => vec![extract_chunk(&self.llm, &self.chain, keys, &chunks[0], 0).await],
            _ => {
                let handles: Vec<_> = chunks
                    .into_iter()
                    .enumerate()
                    .map(|(idx, chunk)| {
                        let llm = self.llm.clone();
                        let chain = self.chain.clone();
                        let keys = keys.clone();
                        tokio::spawn(async move { extract_chunk(&llm, &chain, &keys, &chunk, idx).await })
                    })
                    .collect();
                let mut out = Vec::with_capacity(handles.len());
                for (idx, joined) in futures::future::join_all(handles).await.into_iter().enumerate() {
                    match joined {
                        Ok(records) => out.push(records),
                        Err(e) => {
                            tracing::warn!(target: "pipeline.extract", chunk = idx, error = %e, "extract.chunk.join_failed");
                            out.push(Vec::new());
                        }
                    }
                }
                out
            }
        };

        let records: Vec<CompanyRecord> = per_chunk
            .into_iter()
            .flatten()
            .map(|r| r.conform(keys))
            .collect();
        if records.is_empty() {
            tracing::warn!(target: "pipeline.extract", "extract.placeholder");
            return vec![CompanyRecord::placeholder(keys)];
        }
        tracing::info!(target: "pipeline.extract", records = records.len(), "extract.done");
        records
    }
}

async fn extract_chunk(
    llm: &SharedLlm,
    chain: &RecoveryChain,
    keys: &FilterKeys,
    chunk: &str,
    idx: usize,
) -> Vec<CompanyRecord> {
    let prompt = build_extract_prompt(keys, chunk);
    match llm.complete(&prompt).await {
        Ok(text) => {
            let records = recover_records(chain, &text);
            tracing::debug!(target: "pipeline.extract", chunk = idx, records = records.len(), "extract.chunk.done");
            records
        }
        Err(e) => {
            tracing::warn!(target: "pipeline.extract", chunk = idx, error = %e, "extract.chunk.failed");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_break_on_lines() {
        let text = "aaaa\nbbbb\ncccc\n";
        let chunks = chunk_text(text, 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb\n", "cccc\n"]);
    }

    #[test]
    fn long_lines_are_split() {
        let chunks = chunk_text("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn chunking_counts_chars_not_bytes() {
        let chunks = chunk_text("ééé\nüü\n", 4);
        assert_eq!(chunks, vec!["ééé\n", "üü\n"]);
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(chunk_text("\n\n  \n", 10).is_empty());
    }

    #[test]
    fn prompt_names_every_key() {
        let keys = FilterKeys::from_keys(["Funding", "Employee size"]);
        let p = build_extract_prompt(&keys, "Acme raised $1M");
        assert!(p.contains("these keys: Company Name, Funding, Employee size."));
        assert!(p.contains("Source: Acme raised $1M"));
        assert!(p.ends_with("Return only the JSON array."));
    }
}
