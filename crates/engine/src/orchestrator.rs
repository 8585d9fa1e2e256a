//! Cache-aside vendor search with stale-while-revalidate.
//!
//! A search reads the cache first. Fresh hits return immediately; stale hits
//! return immediately and queue a background refresh; misses run the
//! category's query strategy against the provider, shape the results, and
//! cache them.

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use vendorsync_client::places::request::MAX_RADIUS_M;
use vendorsync_client::{
    Coordinates, Geocoder, NearbyRequest, PlaceRecord, PlacesPage, PlacesProvider, ProviderError, TextRequest,
};
use vendorsync_core::cache::normalize_key;
use vendorsync_core::{AppConfig, CacheStore, NormalizedFilters, RawFilters};

use crate::error::{EngineError, TaskError};
use crate::filter::{dedup_by_id, filter_relevant};
use crate::location::LocationResolver;
use crate::queue::{Priority, SyncQueue, SyncTask, TaskHandler, TaskKind};
use crate::strategy::{CategoryProfile, CategoryTable, Strategy, category_id};

/// Tags attached to every cached search result.
pub const SEARCH_TAGS: &[&str] = &["vendor", "catalog"];

/// Tag invalidated by a `VendorUpdate` task without explicit tags.
pub const DEFAULT_UPDATE_TAG: &str = "vendor";

/// A vendor search request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub category: String,
    pub location: String,
    #[serde(default)]
    pub filters: RawFilters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

impl SearchQuery {
    pub fn new(category: impl Into<String>, location: impl Into<String>) -> Self {
        Self { category: category.into(), location: location.into(), ..Default::default() }
    }

    pub fn with_filter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }

    pub fn with_page_token(mut self, token: impl Into<String>) -> Self {
        self.page_token = Some(token.into());
        self
    }
}

/// What a search returns to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub results: Vec<PlaceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    pub from_cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_age_seconds: Option<u64>,
    /// Set when the provider could not be reached; results are empty then.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchOutcome {
    fn cached(snapshot: SearchSnapshot, age_seconds: u64) -> Self {
        Self {
            results: snapshot.results,
            next_page_token: snapshot.next_page_token,
            from_cache: true,
            cache_age_seconds: Some(age_seconds),
            error: None,
        }
    }

    fn fetched(results: Vec<PlaceRecord>, next_page_token: Option<String>) -> Self {
        Self { results, next_page_token, from_cache: false, cache_age_seconds: None, error: None }
    }

    fn failed(message: String) -> Self {
        Self { error: Some(message), ..Default::default() }
    }
}

/// The cached value for a search key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSnapshot {
    pub category: String,
    pub location: String,
    #[serde(default)]
    pub filters: NormalizedFilters,
    pub results: Vec<PlaceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Payload of `CacheRefresh` and `PopularSearchWarm` tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshPayload {
    pub category: String,
    pub location: String,
    #[serde(default)]
    pub filters: NormalizedFilters,
}

/// Payload of `VendorUpdate` tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct VendorUpdatePayload {
    #[serde(default)]
    tags: Vec<String>,
}

/// Freshness, TTL and provider settings used by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPolicy {
    pub fresh_threshold_secs: u64,
    pub result_ttl_secs: u64,
    pub empty_result_ttl_secs: u64,
    pub provider_timeout: Duration,
    pub default_radius_m: u32,
}

impl SearchPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            fresh_threshold_secs: config.fresh_threshold_secs,
            result_ttl_secs: config.result_ttl_secs,
            empty_result_ttl_secs: config.empty_result_ttl_secs,
            provider_timeout: config.provider_timeout(),
            default_radius_m: config.search_radius_m,
        }
    }

    /// Empty results expire sooner so new vendors show up quickly.
    pub fn ttl_for(&self, result_count: usize) -> u64 {
        if result_count == 0 { self.empty_result_ttl_secs } else { self.result_ttl_secs }
    }
}

/// Cache key for a search. Category spelling is folded; location is not.
pub fn search_key(category: &str, location: &str, filters: &NormalizedFilters) -> String {
    normalize_key(&category_id(category), location, filters)
}

enum SubQuery {
    Nearby(NearbyRequest),
    Text(TextRequest),
}

impl SubQuery {
    fn describe(&self) -> String {
        match self {
            SubQuery::Nearby(req) => format!("nearby({})", req.type_hint.as_deref().unwrap_or("any")),
            SubQuery::Text(req) => format!("text({})", req.query),
        }
    }
}

/// Merged output of one strategy run, before shaping.
#[derive(Debug, Default)]
struct Fetched {
    records: Vec<PlaceRecord>,
    next_page_token: Option<String>,
    attempted: usize,
    failed: usize,
    last_error: Option<ProviderError>,
}

impl Fetched {
    fn all_failed(&self) -> bool {
        self.attempted > 0 && self.failed == self.attempted
    }

    fn error_message(&self) -> String {
        match &self.last_error {
            Some(e) => format!("vendor search unavailable: {e}"),
            None => "vendor search unavailable".to_string(),
        }
    }
}

pub struct SearchOrchestrator {
    cache: Arc<CacheStore>,
    provider: Arc<dyn PlacesProvider>,
    locations: LocationResolver,
    queue: Arc<SyncQueue>,
    categories: CategoryTable,
    policy: SearchPolicy,
}

impl SearchOrchestrator {
    pub fn new(
        config: &AppConfig,
        cache: Arc<CacheStore>,
        provider: Arc<dyn PlacesProvider>,
        geocoder: Arc<dyn Geocoder>,
        queue: Arc<SyncQueue>,
    ) -> Self {
        let locations =
            LocationResolver::new(cache.clone(), geocoder, config.location_ttl_secs, config.provider_timeout());
        Self {
            cache,
            provider,
            locations,
            queue,
            categories: CategoryTable::builtin(),
            policy: SearchPolicy::from_config(config),
        }
    }

    /// Replace the built-in category table.
    pub fn with_categories(mut self, categories: CategoryTable) -> Self {
        self.categories = categories;
        self
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn queue(&self) -> &Arc<SyncQueue> {
        &self.queue
    }

    pub fn policy(&self) -> &SearchPolicy {
        &self.policy
    }

    /// Run a vendor search.
    ///
    /// Returns `Err` only for blank category or location. Provider trouble is
    /// reported through [`SearchOutcome::error`].
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchOutcome, EngineError> {
        let category = query.category.trim();
        if category.is_empty() {
            return Err(EngineError::InvalidInput("category cannot be empty".to_string()));
        }
        if query.location.trim().is_empty() {
            return Err(EngineError::InvalidInput("location cannot be empty".to_string()));
        }

        let profile = self.categories.resolve(category);

        if let Some(token) = query.page_token.as_deref().filter(|t| !t.is_empty()) {
            return Ok(self.next_page(token, &profile).await);
        }

        let location = query.location.as_str();
        let filters = NormalizedFilters::from_raw(&query.filters);
        let key = search_key(category, location, &filters);

        if let Some(entry) = self.cache.get_entry::<SearchSnapshot>(&key).await {
            let age = entry.age_seconds(self.cache.now());
            if age >= self.policy.fresh_threshold_secs {
                tracing::debug!(category, location, age_seconds = age, "serving stale results");
                self.schedule_refresh(&key, &profile, location, &filters).await;
            }
            return Ok(SearchOutcome::cached(entry.data, age));
        }

        let fetched = self.fetch(&profile, location, &filters).await;
        if fetched.all_failed() {
            let message = fetched.error_message();
            let sub_queries = fetched.attempted;
            tracing::warn!(category, location, sub_queries, error = %message, "vendor search failed");
            return Ok(SearchOutcome::failed(message));
        }

        let snapshot = self.store(&key, &profile, location, filters, fetched).await;
        Ok(SearchOutcome::fetched(snapshot.results, snapshot.next_page_token))
    }

    /// Re-run the strategy for a search and overwrite its cache entry.
    /// Returns the number of cached results.
    pub async fn refresh(
        &self,
        category: &str,
        location: &str,
        filters: &NormalizedFilters,
    ) -> Result<usize, EngineError> {
        let profile = self.categories.resolve(category);
        let key = search_key(category, location, filters);

        let mut fetched = self.fetch(&profile, location, filters).await;
        if fetched.all_failed()
            && let Some(err) = fetched.last_error.take()
        {
            return Err(EngineError::ProviderUnavailable(err));
        }

        let snapshot = self.store(&key, &profile, location, filters.clone(), fetched).await;
        tracing::debug!(category, location, results = snapshot.results.len(), "search refreshed");
        Ok(snapshot.results.len())
    }

    async fn schedule_refresh(
        &self,
        key: &str,
        profile: &CategoryProfile,
        location: &str,
        filters: &NormalizedFilters,
    ) {
        let payload =
            RefreshPayload { category: profile.id.clone(), location: location.to_string(), filters: filters.clone() };
        match serde_json::to_value(&payload) {
            Ok(payload) => {
                self.queue.enqueue_unique(TaskKind::CacheRefresh, Priority::Medium, payload, key).await;
            }
            Err(e) => tracing::warn!(key, error = %e, "failed to encode refresh payload"),
        }
    }

    async fn next_page(&self, token: &str, profile: &CategoryProfile) -> SearchOutcome {
        let result = self.bounded(self.provider.continue_pagination(token)).await;
        match result {
            Ok(page) => {
                let results = filter_relevant(dedup_by_id(page.results), profile);
                SearchOutcome::fetched(results, page.next_page_token)
            }
            Err(e) => {
                tracing::warn!(category = %profile.id, error = %e, "pagination failed");
                SearchOutcome::failed(format!("vendor search unavailable: {e}"))
            }
        }
    }

    /// Dedup, filter and cache fetched records.
    async fn store(
        &self,
        key: &str,
        profile: &CategoryProfile,
        location: &str,
        filters: NormalizedFilters,
        fetched: Fetched,
    ) -> SearchSnapshot {
        let raw = fetched.records.len();
        let unique = dedup_by_id(fetched.records);
        let deduped = unique.len();
        let results = filter_relevant(unique, profile);

        tracing::debug!(
            category = %profile.id,
            location,
            raw,
            deduped,
            kept = results.len(),
            failed_sub_queries = fetched.failed,
            "search results shaped"
        );

        let ttl = self.policy.ttl_for(results.len());
        let snapshot = SearchSnapshot {
            category: profile.id.clone(),
            location: location.to_string(),
            filters,
            results,
            next_page_token: fetched.next_page_token,
        };
        self.cache.set(key, &snapshot, ttl, SEARCH_TAGS).await;
        snapshot
    }

    async fn fetch(&self, profile: &CategoryProfile, location: &str, filters: &NormalizedFilters) -> Fetched {
        let plan = self.plan(profile, location, filters).await;
        let labels: Vec<String> = plan.iter().map(SubQuery::describe).collect();
        let pages = join_all(plan.into_iter().map(|q| self.run(q))).await;

        let mut fetched = Fetched { attempted: pages.len(), ..Default::default() };
        for (label, page) in labels.iter().zip(pages) {
            match page {
                Ok(page) => {
                    if fetched.next_page_token.is_none() {
                        fetched.next_page_token = page.next_page_token;
                    }
                    fetched.records.extend(page.results);
                }
                Err(e) => {
                    let category = profile.id.as_str();
                    tracing::warn!(category, location, sub_query = %label, error = %e, "sub-query failed");
                    fetched.failed += 1;
                    fetched.last_error = Some(e);
                }
            }
        }
        fetched
    }

    /// Provider calls for one search, in result-priority order.
    async fn plan(&self, profile: &CategoryProfile, location: &str, filters: &NormalizedFilters) -> Vec<SubQuery> {
        let mut plan = Vec::new();

        let coordinates = match profile.strategy {
            Strategy::Venue => None,
            Strategy::Special | Strategy::Standard => self.locations.resolve(location).await,
        };
        if let Some(coordinates) = coordinates {
            plan.push(SubQuery::Nearby(self.nearby_request(coordinates, profile.type_hint.clone(), filters)));
        }

        match profile.strategy {
            Strategy::Venue | Strategy::Special => {
                for query in profile.render_queries(location) {
                    plan.push(SubQuery::Text(text_request(query, filters)));
                }
            }
            Strategy::Standard => {
                if let Some(term) = filters.search_term() {
                    plan.push(SubQuery::Text(text_request(format!("{term} in {location}"), filters)));
                }
                if coordinates.is_none() {
                    let query = format!("{} in {location}", profile.display_name());
                    plan.push(SubQuery::Text(text_request(query, filters)));
                }
            }
        }

        plan
    }

    fn nearby_request(
        &self,
        coordinates: Coordinates,
        type_hint: Option<String>,
        filters: &NormalizedFilters,
    ) -> NearbyRequest {
        let radius_m = filters.radius().unwrap_or(self.policy.default_radius_m).clamp(1, MAX_RADIUS_M);
        NearbyRequest {
            type_hint,
            price_min: filters.price_min(),
            price_max: filters.price_max(),
            open_now: filters.open_now(),
            ..NearbyRequest::new(coordinates, radius_m)
        }
    }

    async fn run(&self, query: SubQuery) -> Result<PlacesPage, ProviderError> {
        match query {
            SubQuery::Nearby(req) => self.bounded(self.provider.nearby_search(req)).await,
            SubQuery::Text(req) => self.bounded(self.provider.text_search(req)).await,
        }
    }

    async fn bounded<F>(&self, call: F) -> Result<PlacesPage, ProviderError>
    where
        F: Future<Output = Result<PlacesPage, ProviderError>>,
    {
        tokio::time::timeout(self.policy.provider_timeout, call)
            .await
            .unwrap_or_else(|elapsed| Err(elapsed.into()))
    }
}

fn text_request(query: String, filters: &NormalizedFilters) -> TextRequest {
    TextRequest {
        price_min: filters.price_min(),
        price_max: filters.price_max(),
        radius_m: filters.radius().map(|r| r.clamp(1, MAX_RADIUS_M)),
        open_now: filters.open_now(),
        ..TextRequest::new(query)
    }
}

#[async_trait]
impl TaskHandler for SearchOrchestrator {
    async fn handle(&self, task: &SyncTask) -> Result<(), TaskError> {
        match task.kind {
            TaskKind::CacheRefresh | TaskKind::PopularSearchWarm => {
                let payload: RefreshPayload = serde_json::from_value(task.payload.clone())?;
                match self.refresh(&payload.category, &payload.location, &payload.filters).await {
                    Ok(_) => {}
                    Err(EngineError::ProviderUnavailable(e)) => return Err(TaskError::Provider(e)),
                    Err(e) => return Err(e.into()),
                }
            }
            TaskKind::VendorUpdate => {
                let update: Option<VendorUpdatePayload> = serde_json::from_value(task.payload.clone())?;
                let tags = update.map(|u| u.tags).filter(|t| !t.is_empty());
                let tags = tags.unwrap_or_else(|| vec![DEFAULT_UPDATE_TAG.to_string()]);
                let tag_refs: Vec<&str> = tags.iter().map(String::as_str).collect();
                let removed = self.cache.invalidate_by_tags(&tag_refs).await;
                tracing::info!(task_id = %task.id, tags = ?tag_refs, removed, "vendor data invalidated");
            }
        }
        Ok(())
    }
}
