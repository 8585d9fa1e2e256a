//! Vendor search engine.
//!
//! Sits between an application and a rate-limited places provider:
//! - Cache-aside search with stale-while-revalidate
//! - Per-category query strategies with relevance filtering
//! - Cache-first geocoding
//! - Prioritized background queue with retry
//! - Warming, analytics and expiry sweep loops

pub mod error;
pub mod filter;
pub mod location;
pub mod orchestrator;
pub mod queue;
pub mod service;
pub mod strategy;
pub mod warmer;

#[cfg(test)]
mod testing;

pub use error::{EngineError, TaskError};
pub use location::LocationResolver;
pub use orchestrator::{RefreshPayload, SearchOrchestrator, SearchOutcome, SearchPolicy, SearchQuery, SearchSnapshot};
pub use queue::{Priority, QueueSettings, QueueStats, SyncQueue, SyncTask, TaskHandler, TaskKind};
pub use service::VendorSearchService;
pub use strategy::{CategoryProfile, CategoryTable, Strategy};
pub use warmer::{CacheWarmer, StatsReport};
