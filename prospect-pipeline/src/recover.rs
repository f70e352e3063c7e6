//! Best-effort recovery of JSON from model output.
//!
//! Model text may wrap the payload in prose, markdown fences or reasoning
//! tokens, may be cut off mid-array, or may use pseudo-JSON (trailing commas,
//! smart or single quotes). A [`RecoveryChain`] runs its strategies in order
//! and stops at the first one that yields a value:
//!
//! 1. [`DirectParse`]
//! 2. [`SubstringExtract`]
//! 3. [`BracketRepair`]
//! 4. [`TokenStrip`] (cleans the text, then reruns 1-3)
//!
//! ```
//! use prospect_pipeline::recover::{RecoveryChain, recover_records};
//!
//! let chain = RecoveryChain::default();
//! let text = r#"Sure! Here are the companies: [{"Company Name": "Acme"}, {"Company Name": "Globex"}"#;
//! let records = recover_records(&chain, text);
//! assert_eq!(records.len(), 2);
//! assert_eq!(records[1].name(), Some("Globex"));
//! ```
use crate::record::{CompanyRecord, FilterKeys};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

/// Opening brackets tried by the substring scan before giving up.
const MAX_CANDIDATES: usize = 64;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecoveryError {
    #[error("no JSON-like span found")]
    NoCandidate,
    #[error("parse failed: {0}")]
    Parse(String),
    #[error("text is not truncated")]
    NotTruncated,
}

pub trait RecoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn attempt(&self, text: &str) -> Result<Value, RecoveryError>;
}

/// Parse the whole trimmed text.
pub struct DirectParse;

impl RecoveryStrategy for DirectParse {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn attempt(&self, text: &str) -> Result<Value, RecoveryError> {
        serde_json::from_str(text.trim()).map_err(|e| RecoveryError::Parse(e.to_string()))
    }
}

/// Parse a fenced ```json block, else the first balanced `{..}`/`[..]` span
/// that parses and holds an object. Citation markers such as `[1]` are
/// skipped.
pub struct SubstringExtract;

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").expect("static regex"));

impl RecoveryStrategy for SubstringExtract {
    fn name(&self) -> &'static str {
        "substring"
    }

    fn attempt(&self, text: &str) -> Result<Value, RecoveryError> {
        for caps in FENCE.captures_iter(text) {
            if let Some(body) = caps.get(1) {
                if let Ok(v) = serde_json::from_str(body.as_str()) {
                    return Ok(v);
                }
            }
        }

        let mut last_err = RecoveryError::NoCandidate;
        for start in openings(text).take(MAX_CANDIDATES) {
            let scan = scan(text, start);
            let Some(end) = scan.end else {
                if scan.mismatched {
                    continue;
                }
                // Runs to the end of the text: every later opening is nested
                // inside this truncated span.
                break;
            };
            match serde_json::from_str::<Value>(&text[start..end]) {
                Ok(v) if holds_objects(&v) => return Ok(v),
                Ok(_) => {}
                Err(e) => last_err = RecoveryError::Parse(e.to_string()),
            }
        }
        Err(last_err)
    }
}

/// Close a truncated array or object. The span repaired is the first one
/// that runs unclosed to the end of the text, so balanced prose brackets
/// before it are passed over. First every open bracket (and an open string)
/// is closed in place; if that does not parse, the text is cut back
/// to the last complete top-level element and only the outer container is
/// closed.
pub struct BracketRepair;

impl RecoveryStrategy for BracketRepair {
    fn name(&self) -> &'static str {
        "bracket_repair"
    }

    fn attempt(&self, text: &str) -> Result<Value, RecoveryError> {
        let mut found = None;
        let mut any = false;
        for start in openings(text).take(MAX_CANDIDATES) {
            any = true;
            let scan = scan(text, start);
            if scan.end.is_none() && !scan.mismatched && !scan.stack.is_empty() {
                found = Some((start, scan));
                break;
            }
        }
        let Some((start, scan)) = found else {
            return Err(if any {
                RecoveryError::NotTruncated
            } else {
                RecoveryError::NoCandidate
            });
        };
        let body = &text[start..];

        let mut closed = body.trim_end().to_string();
        if scan.in_string {
            closed.push('"');
        }
        let trimmed_len = closed.trim_end_matches([',', ':', ' ', '\n', '\r', '\t']).len();
        closed.truncate(trimmed_len);
        closed.extend(scan.stack.iter().rev());
        if let Ok(v) = serde_json::from_str(&closed) {
            return Ok(v);
        }

        let cut = &text[start..scan.last_top_complete];
        let mut shortened = cut
            .trim_end()
            .trim_end_matches(',')
            .trim_end()
            .to_string();
        shortened.push(scan.stack[0]);
        serde_json::from_str(&shortened).map_err(|e| RecoveryError::Parse(e.to_string()))
    }
}

/// Strip reasoning and channel tokens, fences, smart quotes and trailing
/// commas, then rerun the structural strategies. Single-quoted pseudo-JSON
/// is rewritten to double quotes as a last resort.
pub struct TokenStrip;

static THINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("static regex"));
static CHANNEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\|[^|>]{0,64}\|>").expect("static regex"));
static FENCE_MARK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z]*").expect("static regex"));
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("static regex"));

impl TokenStrip {
    pub fn clean(text: &str) -> String {
        // gpt-oss style output: keep only the final channel's message.
        let text = match text.rfind("<|message|>") {
            Some(pos) if text.contains("<|channel|>") => &text[pos + "<|message|>".len()..],
            _ => text,
        };
        let s = THINK.replace_all(text, "");
        let s = s.replace("<think>", "").replace("</think>", "");
        let s = CHANNEL.replace_all(&s, "");
        let s = FENCE_MARK.replace_all(&s, "");
        let s = s
            .replace(['\u{201C}', '\u{201D}'], "\"")
            .replace(['\u{2018}', '\u{2019}'], "'");
        TRAILING_COMMA.replace_all(&s, "$1").trim().to_string()
    }

    fn structural(text: &str) -> Result<Value, RecoveryError> {
        DirectParse
            .attempt(text)
            .or_else(|_| SubstringExtract.attempt(text))
            .or_else(|_| BracketRepair.attempt(text))
    }
}

impl RecoveryStrategy for TokenStrip {
    fn name(&self) -> &'static str {
        "token_strip"
    }

    fn attempt(&self, text: &str) -> Result<Value, RecoveryError> {
        let cleaned = Self::clean(text);
        Self::structural(&cleaned).or_else(|_| {
            let requoted = TRAILING_COMMA
                .replace_all(&cleaned.replace('\'', "\""), "$1")
                .into_owned();
            Self::structural(&requoted)
        })
    }
}

/// Ordered list of strategies.
pub struct RecoveryChain {
    strategies: Vec<Box<dyn RecoveryStrategy>>,
}

impl Default for RecoveryChain {
    fn default() -> Self {
        Self::new(vec![
            Box::new(DirectParse),
            Box::new(SubstringExtract),
            Box::new(BracketRepair),
            Box::new(TokenStrip),
        ])
    }
}

impl RecoveryChain {
    pub fn new(strategies: Vec<Box<dyn RecoveryStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// First value any strategy recovers; `None` when all fail.
    pub fn recover(&self, text: &str) -> Option<Value> {
        self.recover_where(text, |_| true)
    }

    /// First recovered value that `accept` takes. A strategy whose value is
    /// rejected counts as a miss and the next one runs.
    pub fn recover_where(&self, text: &str, accept: impl Fn(&Value) -> bool) -> Option<Value> {
        if text.trim().is_empty() {
            return None;
        }
        for s in &self.strategies {
            match s.attempt(text) {
                Ok(v) if accept(&v) => {
                    tracing::debug!(target: "pipeline.recover", strategy = s.name(), "recover.ok");
                    return Some(v);
                }
                Ok(_) => {
                    tracing::trace!(target: "pipeline.recover", strategy = s.name(), "recover.rejected");
                }
                Err(e) => {
                    tracing::trace!(target: "pipeline.recover", strategy = s.name(), error = %e, "recover.miss");
                }
            }
        }
        tracing::debug!(target: "pipeline.recover", chars = text.len(), "recover.failed");
        None
    }
}

/// Records carried by a recovered value: an array of objects, an object with
/// a `companies` array, or a single object.
pub fn records_from_value(value: Value) -> Vec<CompanyRecord> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) if !map.is_empty() => Some(CompanyRecord::from_map(map)),
                _ => None,
            })
            .collect(),
        Value::Object(mut map) => match map.remove("companies") {
            Some(companies @ Value::Array(_)) => records_from_value(companies),
            Some(other) => {
                map.insert("companies".into(), other);
                vec![CompanyRecord::from_map(map)]
            }
            None if map.is_empty() => Vec::new(),
            None => vec![CompanyRecord::from_map(map)],
        },
        _ => Vec::new(),
    }
}

/// True for an object, or an array with at least one object in it.
pub fn holds_objects(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => items.iter().any(Value::is_object),
        _ => false,
    }
}

fn holds_records(value: &Value) -> bool {
    match value {
        Value::Array(items) => items
            .iter()
            .any(|v| v.as_object().is_some_and(|m| !m.is_empty())),
        Value::Object(map) => match map.get("companies") {
            Some(companies @ Value::Array(_)) => holds_records(companies),
            _ => !map.is_empty(),
        },
        _ => false,
    }
}

/// Recovered records, or nothing. Strategies keep running while the value
/// found so far carries no records.
pub fn recover_records(chain: &RecoveryChain, text: &str) -> Vec<CompanyRecord> {
    chain
        .recover_where(text, holds_records)
        .map(records_from_value)
        .unwrap_or_default()
}

/// Recovered records, or a single placeholder over `keys`.
pub fn recover_or_placeholder(
    chain: &RecoveryChain,
    text: &str,
    keys: &FilterKeys,
) -> Vec<CompanyRecord> {
    let records = recover_records(chain, text);
    if records.is_empty() {
        vec![CompanyRecord::placeholder(keys)]
    } else {
        records
    }
}

fn openings(text: &str) -> impl Iterator<Item = usize> + '_ {
    text.char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .map(|(i, _)| i)
}

struct Scan {
    /// Expected closers still open at end of text.
    stack: Vec<char>,
    in_string: bool,
    /// Byte offset just past the last complete element of the outer
    /// container (or just past the opening bracket).
    last_top_complete: usize,
    /// Byte offset just past the outer closer, when it was reached.
    end: Option<usize>,
    mismatched: bool,
}

fn scan(text: &str, start: usize) -> Scan {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut last_top_complete = start + 1;

    for (off, c) in text[start..].char_indices() {
        let i = start + off;
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                if stack.len() == 1 {
                    last_top_complete = i + 1;
                }
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() != Some(&c) {
                    // Mismatched closer: treat as the end of what we can use.
                    return Scan {
                        stack,
                        in_string,
                        last_top_complete,
                        end: None,
                        mismatched: true,
                    };
                }
                stack.pop();
                if stack.is_empty() {
                    return Scan {
                        stack,
                        in_string,
                        last_top_complete,
                        end: Some(i + 1),
                        mismatched: false,
                    };
                }
                if stack.len() == 1 {
                    last_top_complete = i + 1;
                }
            }
            ',' if stack.len() == 1 => last_top_complete = i,
            _ => {}
        }
    }
    Scan {
        stack,
        in_string,
        last_top_complete,
        end: None,
        mismatched: false,
    }
}
