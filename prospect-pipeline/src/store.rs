//! Flat JSON snapshots (`companies.json`, `seen_companies.json`).
//!
//! Files are read fully and rewritten wholesale with a 4-space indent; there
//! is no atomic-write guarantee.
use crate::recover::records_from_value;
use crate::record::CompanyRecord;
use prospect_common::Result;
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::fs;
use std::path::Path;

/// Write `records` to `path`, creating parent directories.
pub fn save_records(path: &Path, records: &[CompanyRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut buf = Vec::with_capacity(records.len() * 128);
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    records.serialize(&mut ser)?;
    fs::write(path, buf)?;
    tracing::info!(target: "pipeline.store", path = %path.display(), records = records.len(), "store.saved");
    Ok(())
}

/// Records stored at `path`; a missing file is an empty list.
pub fn load_records(path: &Path) -> Result<Vec<CompanyRecord>> {
    match read_value(path)? {
        Some(v) => Ok(records_from_value(v)),
        None => Ok(Vec::new()),
    }
}

/// Seen snapshot at `path`. Besides record arrays this accepts the older
/// layout of a plain array of company names.
pub fn load_seen(path: &Path) -> Result<Vec<CompanyRecord>> {
    let Some(value) = read_value(path)? else {
        return Ok(Vec::new());
    };
    let records = match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(CompanyRecord::from_map(map)),
                Value::String(name) if !name.trim().is_empty() => Some(CompanyRecord::named(name)),
                _ => None,
            })
            .collect(),
        other => records_from_value(other),
    };
    Ok(records)
}

fn read_value(path: &Path) -> Result<Option<Value>> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&bytes)?))
}
