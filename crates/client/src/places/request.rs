//! Places search request types and validation.

use serde::{Deserialize, Serialize};

use super::response::Coordinates;
use crate::places::ProviderError;

/// Largest radius most places providers accept, in meters.
pub const MAX_RADIUS_M: u32 = 50_000;

/// Longest text query accepted.
pub const MAX_QUERY_CHARS: usize = 400;

/// Highest provider price level (0 = free, 4 = very expensive).
pub const MAX_PRICE_LEVEL: u8 = 4;

/// Coordinate-anchored search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyRequest {
    pub coordinates: Coordinates,

    /// Search radius in meters.
    pub radius_m: u32,

    /// Provider-native place type (e.g. `florist`), when the provider has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_min: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_max: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_now: Option<bool>,
}

/// Free-text search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextRequest {
    /// Search query (required, max 400 chars).
    pub query: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_min: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_max: Option<u8>,

    /// Radius bias in meters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius_m: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_now: Option<bool>,
}

fn validate_price(price_min: Option<u8>, price_max: Option<u8>) -> Result<(), ProviderError> {
    for level in [price_min, price_max].into_iter().flatten() {
        if level > MAX_PRICE_LEVEL {
            return Err(ProviderError::InvalidRequest(format!(
                "price level {level} out of range (0-{MAX_PRICE_LEVEL})"
            )));
        }
    }
    if let (Some(min), Some(max)) = (price_min, price_max)
        && min > max
    {
        return Err(ProviderError::InvalidRequest(format!("price_min {min} exceeds price_max {max}")));
    }
    Ok(())
}

fn validate_radius(radius_m: u32) -> Result<(), ProviderError> {
    if radius_m == 0 || radius_m > MAX_RADIUS_M {
        return Err(ProviderError::InvalidRequest(format!("radius {radius_m}m out of range (1-{MAX_RADIUS_M})")));
    }
    Ok(())
}

impl NearbyRequest {
    pub fn new(coordinates: Coordinates, radius_m: u32) -> Self {
        Self { coordinates, radius_m, type_hint: None, price_min: None, price_max: None, open_now: None }
    }

    /// Validate the request parameters.
    ///
    /// Returns an error if any parameters are out of range or malformed.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if !self.coordinates.is_valid() {
            return Err(ProviderError::InvalidRequest(format!(
                "coordinates out of range: {}, {}",
                self.coordinates.lat, self.coordinates.lng
            )));
        }
        validate_radius(self.radius_m)?;
        validate_price(self.price_min, self.price_max)
    }
}

impl TextRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Default::default() }
    }

    /// Validate the request parameters.
    ///
    /// Returns an error if any parameters are out of range or malformed.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.query.trim().is_empty() {
            return Err(ProviderError::InvalidRequest("query cannot be empty".to_string()));
        }

        let chars = self.query.chars().count();
        if chars > MAX_QUERY_CHARS {
            return Err(ProviderError::InvalidRequest(format!(
                "query too long: {chars} chars (max {MAX_QUERY_CHARS})"
            )));
        }

        if let Some(radius) = self.radius_m {
            validate_radius(radius)?;
        }
        validate_price(self.price_min, self.price_max)
    }
}
