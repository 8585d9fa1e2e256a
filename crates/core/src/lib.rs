//! Core types and shared functionality for the vendor search engine.
//!
//! This crate provides:
//! - Two-level cache store with an optional SQLite shared layer
//! - Search and location key normalization
//! - Unified error types
//! - Configuration structures
//! - Injectable clock

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;

pub use cache::{CacheEntry, CacheStats, CacheStore, NormalizedFilters, RawFilters, RemoteLayer, SqliteLayer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, ConfigError, MAX_TTL_SECS, WarmPair};
pub use error::Error;
