//! Multi-level cache for search results and geocoded locations.
//!
//! - Process-local layer with TTL expiry and approximate LRU eviction
//! - Optional shared layer (SQLite, WAL mode) with automatic migrations
//! - Tag-based bulk invalidation
//! - Hit/miss analytics
//! - Deterministic, order-independent search keys

pub mod entry;
pub mod key;
pub mod migrations;
pub mod remote;
pub mod sqlite;
pub mod store;

pub use crate::Error;

pub use entry::CacheEntry;
pub use key::{NormalizedFilters, RawFilters, location_key, normalize_key, normalize_raw_key};
pub use remote::RemoteLayer;
pub use sqlite::SqliteLayer;
pub use store::CacheStore;

use serde::{Deserialize, Serialize};

/// Cache statistics. Counters are process-wide and reset only by
/// [`CacheStore::clear`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    /// Entries currently in the local layer (including not-yet-swept expired ones).
    pub keys_count: usize,
    pub memory_usage_bytes: usize,
    pub memory_budget_bytes: usize,
}

impl CacheStats {
    /// hits / (hits + misses), 0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 { 0.0 } else { self.hits as f64 / lookups as f64 }
    }

    /// Local memory usage as a fraction of the budget.
    pub fn memory_ratio(&self) -> f64 {
        if self.memory_budget_bytes == 0 {
            0.0
        } else {
            self.memory_usage_bytes as f64 / self.memory_budget_bytes as f64
        }
    }
}
