//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

/// Upper bound for every configured TTL: one year.
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - any TTL, interval or the memory budget is 0
    /// - any TTL exceeds [`MAX_TTL_SECS`]
    /// - `fresh_threshold_secs` is not below `result_ttl_secs`
    /// - `provider_timeout_ms` is below 100ms or above 60s
    /// - `warm_enabled` is set with an empty category or location in `warm_pairs`
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("default_ttl_secs", self.default_ttl_secs),
            ("result_ttl_secs", self.result_ttl_secs),
            ("empty_result_ttl_secs", self.empty_result_ttl_secs),
            ("location_ttl_secs", self.location_ttl_secs),
            ("fresh_threshold_secs", self.fresh_threshold_secs),
            ("warm_interval_secs", self.warm_interval_secs),
            ("analytics_interval_secs", self.analytics_interval_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(invalid(field, "must be greater than 0"));
            }
        }

        let ttls = [
            ("default_ttl_secs", self.default_ttl_secs),
            ("result_ttl_secs", self.result_ttl_secs),
            ("empty_result_ttl_secs", self.empty_result_ttl_secs),
            ("location_ttl_secs", self.location_ttl_secs),
        ];
        for (field, value) in ttls {
            if value > MAX_TTL_SECS {
                return Err(invalid(field, "must not exceed one year (31536000 seconds)"));
            }
        }

        if self.max_memory_bytes == 0 {
            return Err(invalid("max_memory_bytes", "must be greater than 0"));
        }

        if self.fresh_threshold_secs >= self.result_ttl_secs {
            return Err(invalid("fresh_threshold_secs", "must be lower than result_ttl_secs"));
        }

        if self.provider_timeout_ms < 100 {
            return Err(invalid("provider_timeout_ms", "must be at least 100ms"));
        }
        if self.provider_timeout_ms > 60_000 {
            return Err(invalid("provider_timeout_ms", "must not exceed 60 seconds (60000ms)"));
        }

        if self.search_radius_m == 0 || self.search_radius_m > 50_000 {
            return Err(invalid("search_radius_m", "must be between 1 and 50000 meters"));
        }

        if self.warm_enabled {
            if self.warm_pairs.iter().any(|p| p.category.trim().is_empty() || p.location.trim().is_empty()) {
                return Err(invalid("warm_pairs", "category and location must not be empty"));
            }
            if self.warm_pairs.is_empty() {
                tracing::warn!("warm_enabled is set but warm_pairs is empty; the warmer will idle");
            }
        }

        Ok(())
    }
}
