//! Company and filter records.
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Canonical name key; always first in a negotiated key set.
pub const NAME_KEY: &str = "Company Name";

/// Keys that may carry a company's name, in lookup order.
pub const NAME_KEYS: &[&str] = &["Company Name", "company_name", "name", "Company", "company"];

/// Key set used when interpretation yields no keys.
pub const DEFAULT_KEYS: &[&str] = &["Company Name", "Category", "Funding Type", "Funding", "Employee size"];

/// One company as an ordered key/value map. Values are normally strings;
/// enrichment stores role objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyRecord(Map<String, Value>);

impl CompanyRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Record with exactly `keys`, every value `""`.
    pub fn placeholder(keys: &FilterKeys) -> Self {
        Self(
            keys.iter()
                .map(|k| (k.clone(), Value::String(String::new())))
                .collect(),
        )
    }

    /// Record carrying only a name, as stored by legacy seen files.
    pub fn named(name: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert(NAME_KEY.to_string(), Value::String(name.into()));
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// First non-empty name-like value, trimmed.
    pub fn name(&self) -> Option<&str> {
        NAME_KEYS
            .iter()
            .filter_map(|k| self.get_str(k))
            .map(str::trim)
            .find(|v| !v.is_empty())
    }

    /// True when every value is empty (a placeholder or an all-blank row).
    pub fn is_blank(&self) -> bool {
        self.0.values().all(is_empty_value)
    }

    /// Bring the record onto `keys`: key-set entries first in key-set order
    /// (missing ones as `""`), then any extra keys the model returned.
    pub fn conform(self, keys: &FilterKeys) -> Self {
        let mut rest = self.0;
        let mut out = Map::with_capacity(rest.len().max(keys.len()));
        for k in keys.iter() {
            let v = rest
                .remove(k.as_str())
                .unwrap_or_else(|| Value::String(String::new()));
            out.insert(k.clone(), v);
        }
        out.extend(rest);
        Self(out)
    }
}

fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// A user filter normalised by the interpreter, e.g. `Funding = 1M`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub key: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,
}

/// Models sometimes answer `"value": 50` or `"value": null`.
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// The negotiated key set handed to every extraction call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterKeys(Vec<String>);

impl Default for FilterKeys {
    fn default() -> Self {
        Self::collect(DEFAULT_KEYS)
    }
}

impl FilterKeys {
    /// Normalise `keys`: trimmed, blanks and case-insensitive duplicates
    /// dropped, [`NAME_KEY`] first. An empty input yields the defaults.
    ///
    /// ```
    /// use prospect_pipeline::record::FilterKeys;
    ///
    /// let keys = FilterKeys::from_keys(["Funding", "Employee size", "funding"]);
    /// assert_eq!(keys.as_slice(), ["Company Name", "Funding", "Employee size"]);
    /// assert_eq!(FilterKeys::from_keys(Vec::<String>::new()), FilterKeys::default());
    /// ```
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = Self::collect(keys);
        if keys.len() > 1 { keys } else { Self::default() }
    }

    /// Keys of the interpreted filters, or `fallback` when there are none.
    pub fn from_filters<S: AsRef<str>>(filters: &[FilterRecord], fallback: &[S]) -> Self {
        let keys = Self::collect(filters.iter().map(|f| f.key.as_str()));
        if keys.len() > 1 {
            keys
        } else {
            Self::from_keys(fallback)
        }
    }

    fn collect<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = vec![NAME_KEY.to_string()];
        for k in keys {
            let k = k.as_ref().trim();
            if k.is_empty() || out.iter().any(|o| o.eq_ignore_ascii_case(k)) {
                continue;
            }
            out.push(k.to_string());
        }
        Self(out)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn joined(&self) -> String {
        self.0.join(", ")
    }
}
