//! Deterministic cache keys for searches and geocoded locations.
//!
//! Search keys are content-addressed: a SHA-256 over category, location and
//! the canonical JSON of the normalized filters. Location keys are the raw
//! location text under a separate prefix.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// Prefix of every search result key.
pub const SEARCH_KEY_PREFIX: &str = "search:";

/// Prefix of every geocoded location key.
pub const LOCATION_KEY_PREFIX: &str = "geo:";

/// Filters as supplied by a caller, in arbitrary order.
pub type RawFilters = HashMap<String, Value>;

/// Filters with null and empty-string values removed, ordered by key name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedFilters(BTreeMap<String, Value>);

impl NormalizedFilters {
    pub fn from_raw(raw: &RawFilters) -> Self {
        Self(
            raw.iter()
                .filter(|(_, v)| !is_absent(v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Canonical JSON encoding, stable across processes.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn price_min(&self) -> Option<u8> {
        self.get_u64("price_min").and_then(|v| u8::try_from(v).ok())
    }

    pub fn price_max(&self) -> Option<u8> {
        self.get_u64("price_max").and_then(|v| u8::try_from(v).ok())
    }

    /// Search radius in meters.
    pub fn radius(&self) -> Option<u32> {
        self.get_u64("radius").and_then(|v| u32::try_from(v).ok())
    }

    pub fn open_now(&self) -> Option<bool> {
        match self.0.get("open_now")? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Free-text term to search for in addition to the category.
    pub fn search_term(&self) -> Option<&str> {
        self.0.get("search_term").and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
    }

    fn get_u64(&self, name: &str) -> Option<u64> {
        match self.0.get(name)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<&RawFilters> for NormalizedFilters {
    fn from(raw: &RawFilters) -> Self {
        Self::from_raw(raw)
    }
}

fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Compute the cache key for a search.
///
/// Location is used verbatim, so `"Austin, TX"` and `"austin, tx"` are
/// different keys.
pub fn normalize_key(category: &str, location: &str, filters: &NormalizedFilters) -> String {
    let mut hasher = Sha256::new();
    hasher.update(category.as_bytes());
    hasher.update(b"\n");
    hasher.update(location.as_bytes());
    hasher.update(b"\n");
    hasher.update(filters.canonical_json().as_bytes());
    format!("{SEARCH_KEY_PREFIX}{}", hex::encode(hasher.finalize()))
}

/// Normalize raw filters and compute the search key in one step.
pub fn normalize_raw_key(category: &str, location: &str, filters: &RawFilters) -> String {
    normalize_key(category, location, &NormalizedFilters::from_raw(filters))
}

/// Cache key for a geocoded location. The raw text is the key.
pub fn location_key(location: &str) -> String {
    format!("{LOCATION_KEY_PREFIX}{location}")
}
