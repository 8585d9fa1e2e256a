//! Cache-first geocoding.

use std::sync::Arc;
use std::time::Duration;
use vendorsync_client::{Coordinates, Geocoder};
use vendorsync_core::CacheStore;
use vendorsync_core::cache::location_key;

/// Tag for geocoded entries; kept apart from vendor data so vendor
/// invalidation leaves coordinates alone.
pub const LOCATION_TAG: &str = "geo";

/// Resolves free-text locations to coordinates, caching successes.
///
/// Failures and "not found" are never cached, so a flaky geocoder does not
/// poison a location for a day.
pub struct LocationResolver {
    cache: Arc<CacheStore>,
    geocoder: Arc<dyn Geocoder>,
    ttl_secs: u64,
    timeout: Duration,
}

impl LocationResolver {
    pub fn new(cache: Arc<CacheStore>, geocoder: Arc<dyn Geocoder>, ttl_secs: u64, timeout: Duration) -> Self {
        Self { cache, geocoder, ttl_secs, timeout }
    }

    /// Coordinates for `location`, or `None` when it cannot be resolved.
    pub async fn resolve(&self, location: &str) -> Option<Coordinates> {
        let key = location_key(location);
        if let Some(coords) = self.cache.get::<Coordinates>(&key).await {
            return Some(coords);
        }

        match tokio::time::timeout(self.timeout, self.geocoder.geocode(location)).await {
            Ok(Ok(Some(coords))) => {
                self.cache.set(&key, &coords, self.ttl_secs, &[LOCATION_TAG]).await;
                Some(coords)
            }
            Ok(Ok(None)) => {
                tracing::debug!(location, "location not found");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(location, error = %e, "geocoding failed");
                None
            }
            Err(_) => {
                tracing::warn!(location, timeout_ms = self.timeout.as_millis() as u64, "geocoding timed out");
                None
            }
        }
    }
}
