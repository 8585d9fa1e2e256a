//! Two-level cache store.
//!
//! A process-local layer behind an async mutex, optionally backed by a shared
//! [`RemoteLayer`]. Reads check local first and promote remote hits; writes
//! go to local unconditionally and to remote best-effort. No operation here
//! returns an error: a cache fault is logged and treated as a miss.

use super::entry::CacheEntry;
use super::remote::RemoteLayer;
use super::CacheStats;
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Default)]
struct LocalLayer {
    entries: HashMap<String, CacheEntry<Value>>,
    memory_bytes: usize,
}

impl LocalLayer {
    fn insert(&mut self, key: String, entry: CacheEntry<Value>) {
        self.memory_bytes += entry.size_bytes;
        if let Some(old) = self.entries.insert(key, entry) {
            self.memory_bytes = self.memory_bytes.saturating_sub(old.size_bytes);
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<Value>> {
        let removed = self.entries.remove(key)?;
        self.memory_bytes = self.memory_bytes.saturating_sub(removed.size_bytes);
        Some(removed)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.memory_bytes = 0;
    }

    /// Drop least-recently-accessed entries until usage fits `budget`.
    fn evict_to_budget(&mut self, budget: usize) -> usize {
        if self.memory_bytes <= budget {
            return 0;
        }

        let mut by_access: Vec<(DateTime<Utc>, String)> =
            self.entries.iter().map(|(k, e)| (e.last_accessed_at, k.clone())).collect();
        by_access.sort();

        let mut evicted = 0;
        for (_, key) in by_access {
            if self.memory_bytes <= budget {
                break;
            }
            self.remove(&key);
            evicted += 1;
        }
        evicted
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
}

impl Counters {
    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
    }
}

/// Process-wide cache shared by the search engine, the location resolver and
/// the warmer. Construct once at the composition root and pass around in an
/// `Arc`.
#[derive(Debug)]
pub struct CacheStore {
    local: Mutex<LocalLayer>,
    remote: RwLock<Option<Arc<dyn RemoteLayer>>>,
    remote_degraded: AtomicBool,
    closed: AtomicBool,
    counters: Counters,
    clock: Arc<dyn Clock>,
    max_memory_bytes: usize,
    default_ttl_secs: u64,
}

impl CacheStore {
    pub fn new(config: &AppConfig, remote: Option<Arc<dyn RemoteLayer>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            local: Mutex::new(LocalLayer::default()),
            remote: RwLock::new(remote),
            remote_degraded: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            counters: Counters::default(),
            clock,
            max_memory_bytes: config.max_memory_bytes,
            default_ttl_secs: config.default_ttl_secs,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory_bytes
    }

    pub async fn has_remote(&self) -> bool {
        self.remote.read().await.is_some()
    }

    /// Look up a value.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_entry(key).await.map(|entry| entry.data)
    }

    /// Look up a value with its metadata (age, TTL, tags).
    ///
    /// Local layer first, then remote; a remote hit is promoted into the
    /// local layer. Counts one hit or one miss.
    pub async fn get_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }

        let now = self.clock.now();
        let local_hit = {
            let mut local = self.local.lock().await;
            match local.entries.get(key).map(|e| e.is_expired(now)) {
                Some(false) => local.entries.get_mut(key).map(|entry| {
                    entry.touch(now);
                    entry.clone()
                }),
                Some(true) => {
                    local.remove(key);
                    tracing::debug!(key, "cache entry expired in local layer");
                    None
                }
                None => None,
            }
        };

        let entry = match local_hit {
            Some(entry) => Some(entry),
            None => self.promote_from_remote(key, now).await,
        };

        let Some(entry) = entry else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key, "cache miss");
            return None;
        };

        let data = entry.data.clone();
        match serde_json::from_value::<T>(data) {
            Ok(data) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key, age_secs = entry.age_seconds(now), "cache hit");
                Some(entry.map(|_| data))
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "cached value has unexpected shape; treating as miss");
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn promote_from_remote(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry<Value>> {
        let mut entry = self.remote_entry(key, now).await?;
        entry.touch(now);

        let mut local = self.local.lock().await;
        local.insert(key.to_string(), entry.clone());
        self.evict(&mut local);
        tracing::debug!(key, "promoted remote cache entry to local layer");
        Some(entry)
    }

    /// Fetch and decode a live entry from the remote layer without counting
    /// or promoting.
    async fn remote_entry(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry<Value>> {
        let remote = self.remote.read().await.clone()?;
        let bytes = match remote.get(key).await {
            Ok(Some(bytes)) => {
                self.mark_remote_ok();
                bytes
            }
            Ok(None) => {
                self.mark_remote_ok();
                return None;
            }
            Err(e) => {
                self.mark_remote_failed("get", &e);
                return None;
            }
        };

        match serde_json::from_slice::<CacheEntry<Value>>(&bytes) {
            Ok(mut entry) if !entry.is_expired(now) => {
                entry.size_bytes = bytes.len();
                Some(entry)
            }
            Ok(_) => {
                if let Err(e) = remote.delete(key).await {
                    self.mark_remote_failed("delete", &e);
                }
                None
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "undecodable remote cache entry; treating as miss");
                None
            }
        }
    }

    /// Age of a live entry in seconds, without touching it or the stats.
    pub async fn peek_age_seconds(&self, key: &str) -> Option<u64> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let now = self.clock.now();
        {
            let local = self.local.lock().await;
            if let Some(entry) = local.entries.get(key)
                && !entry.is_expired(now)
            {
                return Some(entry.age_seconds(now));
            }
        }
        self.remote_entry(key, now).await.map(|entry| entry.age_seconds(now))
    }

    /// Store a value under `key` for `ttl_seconds`, replacing any previous
    /// entry wholesale. A TTL of 0 means the configured default.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_seconds: u64, tags: &[&str]) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let ttl_seconds = if ttl_seconds == 0 { self.default_ttl_secs } else { ttl_seconds };

        let data = match serde_json::to_value(value) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to serialize cache value; skipping set");
                return;
            }
        };

        let tags: BTreeSet<String> = tags.iter().map(|t| t.to_string()).collect();
        let mut entry = CacheEntry::new(data, self.clock.now(), ttl_seconds, tags, 0);
        let blob = match serde_json::to_vec(&entry) {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to encode cache entry; skipping set");
                return;
            }
        };
        entry.size_bytes = blob.len();

        {
            let mut local = self.local.lock().await;
            local.insert(key.to_string(), entry);
            self.evict(&mut local);
        }
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key, ttl_secs = ttl_seconds, size_bytes = blob.len(), "cache set");

        let remote = self.remote.read().await.clone();
        if let Some(remote) = remote {
            match remote.set(key, blob, ttl_seconds).await {
                Ok(()) => self.mark_remote_ok(),
                Err(e) => self.mark_remote_failed("set", &e),
            }
        }
    }

    /// Remove `key` from both layers.
    pub async fn delete(&self, key: &str) {
        self.local.lock().await.remove(key);
        self.delete_remote(key).await;
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
    }

    async fn delete_remote(&self, key: &str) {
        let remote = self.remote.read().await.clone();
        if let Some(remote) = remote
            && let Err(e) = remote.delete(key).await
        {
            self.mark_remote_failed("delete", &e);
        }
    }

    /// Delete every entry carrying at least one of `tags`, in both layers.
    ///
    /// Scans all keys; meant for rare bulk events such as "all vendor data
    /// changed". Returns the number of distinct keys removed.
    pub async fn invalidate_by_tags(&self, tags: &[&str]) -> usize {
        if tags.is_empty() {
            return 0;
        }

        let mut removed: HashSet<String> = HashSet::new();
        {
            let mut local = self.local.lock().await;
            let doomed: Vec<String> =
                local.entries.iter().filter(|(_, e)| e.has_any_tag(tags)).map(|(k, _)| k.clone()).collect();
            for key in doomed {
                local.remove(&key);
                removed.insert(key);
            }
        }

        let remote = self.remote.read().await.clone();
        if let Some(remote) = remote {
            match remote.scan_keys("").await {
                Ok(keys) => {
                    for key in keys {
                        let tagged = match remote.get(&key).await {
                            Ok(Some(bytes)) => serde_json::from_slice::<CacheEntry<Value>>(&bytes)
                                .map(|e| e.has_any_tag(tags))
                                .unwrap_or(false),
                            Ok(None) => false,
                            Err(e) => {
                                self.mark_remote_failed("get", &e);
                                false
                            }
                        };
                        if tagged {
                            match remote.delete(&key).await {
                                Ok(()) => {
                                    removed.insert(key);
                                }
                                Err(e) => self.mark_remote_failed("delete", &e),
                            }
                        }
                    }
                    self.mark_remote_ok();
                }
                Err(e) => self.mark_remote_failed("scan_keys", &e),
            }
        }

        let count = removed.len();
        self.counters.deletes.fetch_add(count as u64, Ordering::Relaxed);
        tracing::info!(?tags, removed = count, "invalidated cache entries by tag");
        count
    }

    /// Flush both layers and reset statistics.
    pub async fn clear(&self) {
        self.local.lock().await.clear();
        let remote = self.remote.read().await.clone();
        if let Some(remote) = remote
            && let Err(e) = remote.flush().await
        {
            self.mark_remote_failed("flush", &e);
        }
        self.counters.reset();
        tracing::info!("cache cleared");
    }

    /// Eagerly drop expired entries. Returns how many local entries went.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let purged = {
            let mut local = self.local.lock().await;
            let expired: Vec<String> =
                local.entries.iter().filter(|(_, e)| e.is_expired(now)).map(|(k, _)| k.clone()).collect();
            for key in &expired {
                local.remove(key);
            }
            expired.len()
        };

        let remote = self.remote.read().await.clone();
        let remote_purged = match remote {
            Some(remote) => match remote.purge_expired().await {
                Ok(n) => n,
                Err(e) => {
                    self.mark_remote_failed("purge_expired", &e);
                    0
                }
            },
            None => 0,
        };

        if purged > 0 || remote_purged > 0 {
            tracing::info!(local = purged, remote = remote_purged, "swept expired cache entries");
        }
        purged
    }

    pub async fn stats(&self) -> CacheStats {
        let (keys_count, memory_usage_bytes) = {
            let local = self.local.lock().await;
            (local.entries.len(), local.memory_bytes)
        };
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            keys_count,
            memory_usage_bytes,
            memory_budget_bytes: self.max_memory_bytes,
        }
    }

    /// Return the cached value for `key`, or run `f`, cache its `Ok` value
    /// and return it. Errors from `f` are returned and not cached.
    pub async fn cached_call<T, E, F, Fut>(&self, key: &str, ttl_seconds: u64, tags: &[&str], f: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get::<T>(key).await {
            return Ok(value);
        }
        let value = f().await?;
        self.set(key, &value, ttl_seconds, tags).await;
        Ok(value)
    }

    /// Detach the remote layer and drop local entries. Later reads miss and
    /// later writes are ignored.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let stats = self.stats().await;
        self.local.lock().await.clear();
        self.remote.write().await.take();
        tracing::info!(
            hits = stats.hits,
            misses = stats.misses,
            hit_rate = stats.hit_rate(),
            keys = stats.keys_count,
            "cache store closed"
        );
    }

    fn evict(&self, local: &mut LocalLayer) {
        let evicted = local.evict_to_budget(self.max_memory_bytes);
        if evicted > 0 {
            tracing::debug!(
                evicted,
                memory_bytes = local.memory_bytes,
                budget = self.max_memory_bytes,
                "evicted least-recently-used cache entries"
            );
        }
    }

    fn mark_remote_failed(&self, op: &str, err: &Error) {
        if !err.is_connectivity() {
            tracing::warn!(op, error = %err, "remote cache layer rejected an operation");
            return;
        }
        if !self.remote_degraded.swap(true, Ordering::AcqRel) {
            tracing::warn!(op, error = %err, "remote cache layer failed; serving from local layer only");
        } else {
            tracing::debug!(op, error = %err, "remote cache layer still failing");
        }
    }

    fn mark_remote_ok(&self) {
        if self.remote_degraded.swap(false, Ordering::AcqRel) {
            tracing::info!("remote cache layer recovered");
        }
    }

    pub fn is_remote_degraded(&self) -> bool {
        self.remote_degraded.load(Ordering::Acquire)
    }
}
