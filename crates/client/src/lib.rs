//! Adapter contracts for the vendor search engine.
//!
//! This crate provides the places provider and geocoder traits, the record
//! types they exchange, request validation, and rate-limiting wrappers.

pub mod places;

pub use places::{
    Coordinates, Geocoder, NearbyRequest, PlaceRecord, PlacesPage, PlacesProvider, ProviderError, RateLimitedGeocoder,
    RateLimitedProvider, TextRequest,
};
