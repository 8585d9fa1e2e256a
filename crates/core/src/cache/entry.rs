//! Cache entry with TTL, tags and LRU tracking.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A cached value plus the metadata needed for expiry, eviction and
/// tag invalidation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry<T> {
    pub data: T,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    pub access_count: u64,
    pub last_accessed_at: DateTime<Utc>,
    pub tags: BTreeSet<String>,
    /// Approximate serialized size of `data`.
    pub size_bytes: usize,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, now: DateTime<Utc>, ttl_seconds: u64, tags: BTreeSet<String>, size_bytes: usize) -> Self {
        Self { data, created_at: now, ttl_seconds, access_count: 0, last_accessed_at: now, tags, size_bytes }
    }

    /// `None` when the TTL reaches past the representable calendar; such an
    /// entry never expires.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = i64::try_from(self.ttl_seconds).ok().and_then(TimeDelta::try_seconds)?;
        self.created_at.checked_add_signed(ttl)
    }

    /// An entry is expired strictly after `created_at + ttl_seconds`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expires_at| now > expires_at)
    }

    /// Whole seconds since creation, clamped at zero.
    pub fn age_seconds(&self, now: DateTime<Utc>) -> u64 {
        (now - self.created_at).num_seconds().max(0) as u64
    }

    /// Seconds left before expiry, zero once expired.
    pub fn remaining_ttl_seconds(&self, now: DateTime<Utc>) -> u64 {
        match self.expires_at() {
            Some(expires_at) => (expires_at - now).num_seconds().max(0) as u64,
            None => u64::MAX,
        }
    }

    pub fn has_any_tag<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter().any(|t| self.tags.contains(t.as_ref()))
    }

    /// Record a read.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed_at = now;
    }

    /// Swap the payload, keeping all metadata.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheEntry<U> {
        CacheEntry {
            data: f(self.data),
            created_at: self.created_at,
            ttl_seconds: self.ttl_seconds,
            access_count: self.access_count,
            last_accessed_at: self.last_accessed_at,
            tags: self.tags,
            size_bytes: self.size_bytes,
        }
    }
}
