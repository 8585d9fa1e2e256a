//! Periodic background loops: cache warming, analytics, and expiry sweeps.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use vendorsync_core::{CacheStats, CacheStore, NormalizedFilters, WarmPair};

use crate::orchestrator::{RefreshPayload, search_key};
use crate::queue::{Priority, SyncQueue, TaskKind};
use crate::strategy::category_id;

/// Hit rate below which the analytics loop warns.
pub const LOW_HIT_RATE: f64 = 0.5;

/// Memory usage ratio above which the analytics loop warns.
pub const HIGH_MEMORY_RATIO: f64 = 0.8;

/// Keeps popular searches fresh by queueing low-priority warm tasks.
pub struct CacheWarmer {
    cache: Arc<CacheStore>,
    queue: Arc<SyncQueue>,
    pairs: Vec<WarmPair>,
    fresh_threshold_secs: u64,
}

impl CacheWarmer {
    pub fn new(cache: Arc<CacheStore>, queue: Arc<SyncQueue>, pairs: Vec<WarmPair>, fresh_threshold_secs: u64) -> Self {
        Self { cache, queue, pairs, fresh_threshold_secs }
    }

    /// Queue a warm task for every configured pair that is missing or stale.
    /// Returns the number of tasks queued.
    pub async fn warm_once(&self) -> usize {
        let filters = NormalizedFilters::default();
        let mut queued = 0;

        for pair in &self.pairs {
            let key = search_key(&pair.category, &pair.location, &filters);
            if let Some(age) = self.cache.peek_age_seconds(&key).await
                && age < self.fresh_threshold_secs
            {
                continue;
            }

            let payload = RefreshPayload {
                category: category_id(&pair.category),
                location: pair.location.clone(),
                filters: filters.clone(),
            };
            let payload = match serde_json::to_value(&payload) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(category = %pair.category, error = %e, "failed to encode warm payload");
                    continue;
                }
            };
            if self.queue.enqueue_unique(TaskKind::PopularSearchWarm, Priority::Low, payload, &key).await.is_some() {
                queued += 1;
            }
        }

        if queued > 0 {
            tracing::debug!(queued, pairs = self.pairs.len(), "queued cache warm tasks");
        }
        queued
    }
}

/// One analytics sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub stats: CacheStats,
    pub low_hit_rate: bool,
    pub high_memory: bool,
}

/// Sample cache stats, log them, and flag unhealthy ratios.
pub async fn report_once(cache: &CacheStore) -> StatsReport {
    let stats = cache.stats().await;
    let lookups = stats.hits + stats.misses;
    let hit_rate = stats.hit_rate();
    let memory_ratio = stats.memory_ratio();

    tracing::info!(
        hits = stats.hits,
        misses = stats.misses,
        hit_rate,
        keys = stats.keys_count,
        memory_bytes = stats.memory_usage_bytes,
        "cache stats"
    );

    let low_hit_rate = lookups > 0 && hit_rate < LOW_HIT_RATE;
    if low_hit_rate {
        tracing::warn!(hit_rate, lookups, "cache hit rate is low");
    }

    let high_memory = memory_ratio > HIGH_MEMORY_RATIO;
    if high_memory {
        tracing::warn!(
            memory_bytes = stats.memory_usage_bytes,
            budget_bytes = stats.memory_budget_bytes,
            "cache memory usage is high"
        );
    }

    StatsReport { stats, low_hit_rate, high_memory }
}

/// Remove expired entries from both cache layers. Returns the local count.
pub async fn sweep_once(cache: &CacheStore) -> usize {
    cache.purge_expired().await
}

/// Run `tick` every `period` until `shutdown` flips to true. The first tick
/// fires one period after start.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!(loop_name = name, period_ms = period.as_millis() as u64, "background loop started");

        loop {
            tokio::select! {
                _ = interval.tick() => tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::debug!(loop_name = name, "background loop stopped");
    })
}
