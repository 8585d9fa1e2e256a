//! Composition root: wires the cache, resolver, queue, orchestrator and
//! background loops from one [`AppConfig`].

use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use vendorsync_client::{Geocoder, PlacesProvider};
use vendorsync_core::{AppConfig, CacheStats, CacheStore, Clock, RemoteLayer, SqliteLayer, SystemClock};

use crate::error::EngineError;
use crate::orchestrator::{SearchOrchestrator, SearchOutcome, SearchQuery};
use crate::queue::{Priority, QueueSettings, QueueStats, SyncQueue, TaskKind};
use crate::warmer::{CacheWarmer, report_once, spawn_periodic, sweep_once};

/// A running vendor search engine.
pub struct VendorSearchService {
    cache: Arc<CacheStore>,
    queue: Arc<SyncQueue>,
    orchestrator: Arc<SearchOrchestrator>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl VendorSearchService {
    /// Validate `config`, build every component, and start the queue worker
    /// plus the enabled loops.
    pub async fn start(
        config: AppConfig,
        provider: Arc<dyn PlacesProvider>,
        geocoder: Arc<dyn Geocoder>,
    ) -> Result<Self, EngineError> {
        Self::start_with_clock(config, provider, geocoder, Arc::new(SystemClock)).await
    }

    pub async fn start_with_clock(
        config: AppConfig,
        provider: Arc<dyn PlacesProvider>,
        geocoder: Arc<dyn Geocoder>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let remote = open_remote(&config, clock.clone()).await;
        let cache = Arc::new(CacheStore::new(&config, remote, clock));
        let queue = SyncQueue::new(QueueSettings::from_config(&config));
        let orchestrator =
            Arc::new(SearchOrchestrator::new(&config, cache.clone(), provider, geocoder, queue.clone()));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        if let Some(worker) = queue.start(orchestrator.clone()) {
            tasks.push(worker);
        }

        if config.warm_enabled {
            let warmer = Arc::new(CacheWarmer::new(
                cache.clone(),
                queue.clone(),
                config.warm_pairs.clone(),
                config.fresh_threshold_secs,
            ));
            tasks.push(spawn_periodic("warm", config.warm_interval(), shutdown_rx.clone(), move || {
                let warmer = warmer.clone();
                async move {
                    warmer.warm_once().await;
                }
            }));
        }

        if config.analytics_enabled {
            let cache = cache.clone();
            tasks.push(spawn_periodic("analytics", config.analytics_interval(), shutdown_rx.clone(), move || {
                let cache = cache.clone();
                async move {
                    report_once(&cache).await;
                }
            }));
        }

        let sweep_cache = cache.clone();
        tasks.push(spawn_periodic("sweep", config.sweep_interval(), shutdown_rx, move || {
            let cache = sweep_cache.clone();
            async move {
                sweep_once(&cache).await;
            }
        }));

        tracing::info!(
            shared_layer = cache.has_remote().await,
            warm = config.warm_enabled,
            warm_pairs = config.warm_pairs.len(),
            analytics = config.analytics_enabled,
            "vendor search service started"
        );

        Ok(Self { cache, queue, orchestrator, shutdown, tasks: Mutex::new(tasks) })
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchOutcome, EngineError> {
        self.orchestrator.search(query).await
    }

    /// Queue a high-priority invalidation of vendor data.
    pub async fn notify_vendor_update(&self, tags: &[&str]) -> String {
        self.queue.enqueue(TaskKind::VendorUpdate, Priority::High, serde_json::json!({ "tags": tags })).await
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn orchestrator(&self) -> &Arc<SearchOrchestrator> {
        &self.orchestrator
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub async fn queue_stats(&self) -> QueueStats {
        self.queue.stats().await
    }

    /// Stop the loops and the worker, then close the cache. Idempotent.
    pub async fn close(&self) {
        let _ = self.shutdown.send(true);
        self.queue.shutdown();

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }

        self.cache.close().await;
        tracing::info!("vendor search service closed");
    }
}

/// Open the shared SQLite layer when configured. Failure leaves the cache
/// local-only. Rows expire on the same clock as the local layer.
async fn open_remote(config: &AppConfig, clock: Arc<dyn Clock>) -> Option<Arc<dyn RemoteLayer>> {
    let path = config.remote_db_path.as_ref()?;
    match SqliteLayer::open(path).await {
        Ok(layer) => {
            tracing::info!(path = %path.display(), "shared cache layer opened");
            let layer: Arc<dyn RemoteLayer> = Arc::new(layer.with_clock(clock));
            Some(layer)
        }
        Err(e) => {
            let path = path.display();
            tracing::warn!(%path, error = %e, "shared cache layer unavailable; using local cache only");
            None
        }
    }
}
