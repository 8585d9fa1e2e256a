//! Scripted provider and geocoder doubles shared by the engine tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vendorsync_client::{
    Coordinates, Geocoder, NearbyRequest, PlaceRecord, PlacesPage, PlacesProvider, ProviderError, TextRequest,
};

pub fn austin() -> Coordinates {
    Coordinates::new(30.2672, -97.7431)
}

pub fn place(id: &str, name: &str) -> PlaceRecord {
    PlaceRecord::new(id, name, austin())
}

/// Provider whose answers are keyed by text query; nearby calls share one
/// scripted answer. Unscripted calls return an empty page.
#[derive(Default)]
pub struct MockProvider {
    pub text: Mutex<HashMap<String, Result<PlacesPage, ProviderError>>>,
    pub nearby: Mutex<Option<Result<PlacesPage, ProviderError>>>,
    pub pages: Mutex<HashMap<String, Result<PlacesPage, ProviderError>>>,
    pub fail_all: Mutex<Option<ProviderError>>,
    pub delay: Mutex<Option<Duration>>,
    pub text_calls: AtomicUsize,
    pub nearby_calls: AtomicUsize,
    pub page_calls: AtomicUsize,
    pub text_queries: Mutex<Vec<String>>,
    pub nearby_requests: Mutex<Vec<NearbyRequest>>,
}

impl MockProvider {
    pub fn with_text(self, query: &str, results: Vec<PlaceRecord>) -> Self {
        self.text.lock().unwrap().insert(query.to_string(), Ok(PlacesPage::new(results)));
        self
    }

    pub fn with_text_page(self, query: &str, page: PlacesPage) -> Self {
        self.text.lock().unwrap().insert(query.to_string(), Ok(page));
        self
    }

    pub fn with_text_error(self, query: &str, err: ProviderError) -> Self {
        self.text.lock().unwrap().insert(query.to_string(), Err(err));
        self
    }

    pub fn with_nearby(self, results: Vec<PlaceRecord>) -> Self {
        *self.nearby.lock().unwrap() = Some(Ok(PlacesPage::new(results)));
        self
    }

    pub fn with_page(self, token: &str, page: PlacesPage) -> Self {
        self.pages.lock().unwrap().insert(token.to_string(), Ok(page));
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn fail_everything(&self, err: Option<ProviderError>) {
        *self.fail_all.lock().unwrap() = err;
    }

    pub fn total_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
            + self.nearby_calls.load(Ordering::SeqCst)
            + self.page_calls.load(Ordering::SeqCst)
    }

    async fn respond(&self, scripted: Option<Result<PlacesPage, ProviderError>>) -> Result<PlacesPage, ProviderError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.fail_all.lock().unwrap().clone() {
            return Err(err);
        }
        scripted.unwrap_or_else(|| Ok(PlacesPage::default()))
    }
}

#[async_trait]
impl PlacesProvider for MockProvider {
    async fn nearby_search(&self, req: NearbyRequest) -> Result<PlacesPage, ProviderError> {
        self.nearby_calls.fetch_add(1, Ordering::SeqCst);
        self.nearby_requests.lock().unwrap().push(req);
        let scripted = self.nearby.lock().unwrap().clone();
        self.respond(scripted).await
    }

    async fn text_search(&self, req: TextRequest) -> Result<PlacesPage, ProviderError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        self.text_queries.lock().unwrap().push(req.query.clone());
        let scripted = self.text.lock().unwrap().get(&req.query).cloned();
        self.respond(scripted).await
    }

    async fn continue_pagination(&self, token: &str) -> Result<PlacesPage, ProviderError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.pages.lock().unwrap().get(token).cloned();
        self.respond(scripted).await
    }
}

/// Geocoder returning fixed coordinates for known places.
#[derive(Default)]
pub struct MockGeocoder {
    pub known: Mutex<HashMap<String, Coordinates>>,
    pub failing: Mutex<bool>,
    pub calls: AtomicUsize,
}

impl MockGeocoder {
    pub fn knowing(location: &str, coords: Coordinates) -> Self {
        let geocoder = Self::default();
        geocoder.known.lock().unwrap().insert(location.to_string(), coords);
        geocoder
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn geocode(&self, text: &str) -> Result<Option<Coordinates>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock().unwrap() {
            return Err(ProviderError::Network("geocoder unreachable".to_string()));
        }
        Ok(self.known.lock().unwrap().get(text).copied())
    }
}
