//! Places provider and geocoder adapters.
//!
//! The engine talks to the outside world only through the two traits here.
//! Concrete HTTP adapters live with the application; this module supplies
//! the contracts plus a rate-limiting wrapper every adapter can sit behind.
//!
//! ### Contract
//!
//! - **Nearby search**: coordinates + radius, optional native type and
//!   price/open filters.
//! - **Text search**: free-text query with the same optional filters.
//! - **Pagination**: continue a previous search from its page token.
//! - **Geocoding**: free text to coordinates; `Ok(None)` means not found.
//! - **Rate limiting**: minimum interval between upstream calls, shared by
//!   every clone of a wrapper.

pub mod error;
pub mod request;
pub mod response;

pub use error::ProviderError;
pub use request::{NearbyRequest, TextRequest};
pub use response::{Coordinates, PlaceRecord, PlacesPage};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default minimum interval between upstream calls.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Business-directory search API.
#[async_trait]
pub trait PlacesProvider: Send + Sync {
    async fn nearby_search(&self, req: NearbyRequest) -> Result<PlacesPage, ProviderError>;

    async fn text_search(&self, req: TextRequest) -> Result<PlacesPage, ProviderError>;

    async fn continue_pagination(&self, token: &str) -> Result<PlacesPage, ProviderError>;
}

/// Free-text location to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, text: &str) -> Result<Option<Coordinates>, ProviderError>;
}

/// Rate limiter to enforce request intervals.
#[derive(Debug)]
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self { last_request: Mutex::new(None), min_interval }
    }

    /// Acquire permission to make a request, waiting if necessary.
    async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Validates requests and spaces out calls to the wrapped provider.
pub struct RateLimitedProvider<P> {
    inner: Arc<P>,
    rate_limiter: Arc<RateLimiter>,
}

impl<P> Clone for RateLimitedProvider<P> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), rate_limiter: self.rate_limiter.clone() }
    }
}

impl<P: PlacesProvider> RateLimitedProvider<P> {
    pub fn new(inner: P, min_interval: Duration) -> Self {
        Self { inner: Arc::new(inner), rate_limiter: Arc::new(RateLimiter::new(min_interval)) }
    }

    pub fn with_default_interval(inner: P) -> Self {
        Self::new(inner, DEFAULT_MIN_INTERVAL)
    }
}

#[async_trait]
impl<P: PlacesProvider> PlacesProvider for RateLimitedProvider<P> {
    async fn nearby_search(&self, req: NearbyRequest) -> Result<PlacesPage, ProviderError> {
        req.validate()?;
        self.rate_limiter.acquire().await;
        tracing::debug!(lat = req.coordinates.lat, lng = req.coordinates.lng, radius_m = req.radius_m, "nearby search");
        self.inner.nearby_search(req).await
    }

    async fn text_search(&self, req: TextRequest) -> Result<PlacesPage, ProviderError> {
        req.validate()?;
        self.rate_limiter.acquire().await;
        tracing::debug!(query = %req.query, "text search");
        self.inner.text_search(req).await
    }

    async fn continue_pagination(&self, token: &str) -> Result<PlacesPage, ProviderError> {
        if token.is_empty() {
            return Err(ProviderError::InvalidRequest("page token cannot be empty".to_string()));
        }
        self.rate_limiter.acquire().await;
        self.inner.continue_pagination(token).await
    }
}

/// Spaces out calls to the wrapped geocoder.
pub struct RateLimitedGeocoder<G> {
    inner: Arc<G>,
    rate_limiter: Arc<RateLimiter>,
}

impl<G> Clone for RateLimitedGeocoder<G> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), rate_limiter: self.rate_limiter.clone() }
    }
}

impl<G: Geocoder> RateLimitedGeocoder<G> {
    pub fn new(inner: G, min_interval: Duration) -> Self {
        Self { inner: Arc::new(inner), rate_limiter: Arc::new(RateLimiter::new(min_interval)) }
    }
}

#[async_trait]
impl<G: Geocoder> Geocoder for RateLimitedGeocoder<G> {
    async fn geocode(&self, text: &str) -> Result<Option<Coordinates>, ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::InvalidRequest("location cannot be empty".to_string()));
        }
        self.rate_limiter.acquire().await;
        tracing::debug!(location = text, "geocoding");
        self.inner.geocode(text).await
    }
}
