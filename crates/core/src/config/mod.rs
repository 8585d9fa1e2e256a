//! Engine configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (VENDOR_CACHE_*)
//! 2. TOML config file (if VENDOR_CACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::{ConfigError, MAX_TTL_SECS};

/// A (category, location) pair kept warm by the cache warmer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmPair {
    pub category: String,
    pub location: String,
}

impl WarmPair {
    pub fn new(category: impl Into<String>, location: impl Into<String>) -> Self {
        Self { category: category.into(), location: location.into() }
    }
}

/// Engine configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (VENDOR_CACHE_*)
/// 2. TOML config file (if VENDOR_CACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path of the shared SQLite cache layer. Local-only when unset.
    ///
    /// Set via VENDOR_CACHE_REMOTE_DB_PATH environment variable.
    #[serde(default)]
    pub remote_db_path: Option<PathBuf>,

    /// TTL applied when `CacheStore::set` or `cached_call` is given a TTL of 0.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Local layer memory budget. Least-recently-used entries are evicted
    /// beyond it.
    ///
    /// Set via VENDOR_CACHE_MAX_MEMORY_BYTES environment variable.
    #[serde(default = "default_max_memory_bytes")]
    pub max_memory_bytes: usize,

    /// Cached searches younger than this are served without a refresh.
    #[serde(default = "default_fresh_threshold_secs")]
    pub fresh_threshold_secs: u64,

    /// TTL for non-empty search results.
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,

    /// TTL for empty search results.
    #[serde(default = "default_empty_result_ttl_secs")]
    pub empty_result_ttl_secs: u64,

    /// TTL for geocoded coordinates.
    #[serde(default = "default_location_ttl_secs")]
    pub location_ttl_secs: u64,

    /// Upper bound on any single provider or geocoder call.
    ///
    /// Set via VENDOR_CACHE_PROVIDER_TIMEOUT_MS environment variable.
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,

    /// Radius for nearby searches when the caller gives none.
    #[serde(default = "default_search_radius_m")]
    pub search_radius_m: u32,

    #[serde(default)]
    pub warm_enabled: bool,

    #[serde(default = "default_warm_interval_secs")]
    pub warm_interval_secs: u64,

    /// Searches kept warm. Usually set from the TOML file.
    #[serde(default)]
    pub warm_pairs: Vec<WarmPair>,

    #[serde(default = "default_true")]
    pub analytics_enabled: bool,

    #[serde(default = "default_analytics_interval_secs")]
    pub analytics_interval_secs: u64,

    /// Interval of the eager expired-entry sweep.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Retries after the first failed attempt of a background task.
    #[serde(default = "default_sync_max_retries")]
    pub sync_max_retries: u32,

    /// Backoff unit; retry `n` waits `n * sync_base_delay_ms`.
    #[serde(default = "default_sync_base_delay_ms")]
    pub sync_base_delay_ms: u64,

    /// Pause between two background tasks.
    #[serde(default = "default_sync_task_spacing_ms")]
    pub sync_task_spacing_ms: u64,
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_max_memory_bytes() -> usize {
    64 * 1024 * 1024 // 64MB
}

fn default_fresh_threshold_secs() -> u64 {
    30 * 60
}

fn default_result_ttl_secs() -> u64 {
    60 * 60
}

fn default_empty_result_ttl_secs() -> u64 {
    15 * 60
}

fn default_location_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_provider_timeout_ms() -> u64 {
    8_000
}

fn default_search_radius_m() -> u32 {
    40_000
}

fn default_warm_interval_secs() -> u64 {
    5 * 60
}

fn default_analytics_interval_secs() -> u64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    5 * 60
}

fn default_sync_max_retries() -> u32 {
    3
}

fn default_sync_base_delay_ms() -> u64 {
    1_000
}

fn default_sync_task_spacing_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            remote_db_path: None,
            default_ttl_secs: default_ttl_secs(),
            max_memory_bytes: default_max_memory_bytes(),
            fresh_threshold_secs: default_fresh_threshold_secs(),
            result_ttl_secs: default_result_ttl_secs(),
            empty_result_ttl_secs: default_empty_result_ttl_secs(),
            location_ttl_secs: default_location_ttl_secs(),
            provider_timeout_ms: default_provider_timeout_ms(),
            search_radius_m: default_search_radius_m(),
            warm_enabled: false,
            warm_interval_secs: default_warm_interval_secs(),
            warm_pairs: Vec::new(),
            analytics_enabled: true,
            analytics_interval_secs: default_analytics_interval_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sync_max_retries: default_sync_max_retries(),
            sync_base_delay_ms: default_sync_base_delay_ms(),
            sync_task_spacing_ms: default_sync_task_spacing_ms(),
        }
    }
}

impl AppConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn warm_interval(&self) -> Duration {
        Duration::from_secs(self.warm_interval_secs)
    }

    pub fn analytics_interval(&self) -> Duration {
        Duration::from_secs(self.analytics_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn sync_base_delay(&self) -> Duration {
        Duration::from_millis(self.sync_base_delay_ms)
    }

    pub fn sync_task_spacing(&self) -> Duration {
        Duration::from_millis(self.sync_task_spacing_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `VENDOR_CACHE_`
    /// 2. TOML file from `VENDOR_CACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("VENDOR_CACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("VENDOR_CACHE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.remote_db_path.is_none());
        assert_eq!(config.fresh_threshold_secs, 1800);
        assert_eq!(config.result_ttl_secs, 3600);
        assert_eq!(config.empty_result_ttl_secs, 900);
        assert_eq!(config.location_ttl_secs, 86_400);
        assert_eq!(config.sync_max_retries, 3);
        assert!(!config.warm_enabled);
        assert!(config.analytics_enabled);
        assert!(config.warm_pairs.is_empty());
    }

    #[test]
    fn test_duration_helpers() {
        let config = AppConfig::default();
        assert_eq!(config.provider_timeout(), Duration::from_millis(8_000));
        assert_eq!(config.warm_interval(), Duration::from_secs(300));
        assert_eq!(config.analytics_interval(), Duration::from_secs(60));
        assert_eq!(config.sync_base_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_from_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("VENDOR_CACHE_REMOTE_DB_PATH", "/tmp/vendor-cache.sqlite");
            jail.set_env("VENDOR_CACHE_MAX_MEMORY_BYTES", "1048576");
            jail.set_env("VENDOR_CACHE_WARM_ENABLED", "true");

            let config = AppConfig::load().expect("config should load");
            assert_eq!(config.remote_db_path, Some(PathBuf::from("/tmp/vendor-cache.sqlite")));
            assert_eq!(config.max_memory_bytes, 1_048_576);
            assert!(config.warm_enabled);
            Ok(())
        });
    }

    #[test]
    fn test_load_warm_pairs_from_toml() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "vendor-cache.toml",
                r#"
                warm_enabled = true
                warm_interval_secs = 120

                [[warm_pairs]]
                category = "florist"
                location = "Austin, TX"

                [[warm_pairs]]
                category = "dj"
                location = "Dallas, TX"
                "#,
            )?;
            jail.set_env("VENDOR_CACHE_CONFIG_FILE", "vendor-cache.toml");
            jail.set_env("VENDOR_CACHE_WARM_INTERVAL_SECS", "600");

            let config = AppConfig::load().expect("config should load");
            assert_eq!(config.warm_pairs.len(), 2);
            assert_eq!(config.warm_pairs[0], WarmPair::new("florist", "Austin, TX"));
            assert_eq!(config.warm_interval_secs, 600);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("VENDOR_CACHE_RESULT_TTL_SECS", "0");
            assert!(matches!(AppConfig::load(), Err(ConfigError::Invalid { .. })));
            Ok(())
        });
    }
}
