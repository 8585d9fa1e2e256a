//! Places provider response types.

use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

/// A business record as returned by the provider.
///
/// Only the fields the engine relies on are typed; display mapping belongs
/// to the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    /// Provider-native unique id.
    pub id: String,
    pub name: String,
    /// Provider type tags, e.g. `["florist", "store"]`.
    #[serde(default)]
    pub types: Vec<String>,
    pub location: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_level: Option<u8>,
}

impl PlaceRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, location: Coordinates) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            types: Vec::new(),
            location,
            address: None,
            rating: None,
            price_level: None,
        }
    }

    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }
}

/// One page of provider results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlacesPage {
    pub results: Vec<PlaceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

impl PlacesPage {
    pub fn new(results: Vec<PlaceRecord>) -> Self {
        Self { results, next_page_token: None }
    }

    /// Check if there are more results available.
    pub fn has_more(&self) -> bool {
        self.next_page_token.is_some()
    }

    /// Get the number of results.
    pub fn result_count(&self) -> usize {
        self.results.len()
    }
}
