//! Core types and caching services for fieldroute.
//!
//! This crate provides:
//! - Two-tier cache (in-process tier in front of a shared SQLite tier)
//! - Geocoding, route and service-area boundary caches
//! - Route optimization with a heuristic fallback
//! - Background warming and configuration

pub mod batch;
pub mod boundary;
pub mod cache;
pub mod config;
pub mod error;
pub mod frequency;
pub mod geo;
pub mod geocode;
pub mod manager;
pub mod provider;
pub mod route;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheDb, TwoTierCache};
pub use config::AppConfig;
pub use error::Error;
pub use geo::{GeoPoint, TravelMode};
pub use manager::CacheManager;
pub use provider::{MapsProvider, ProviderError};
