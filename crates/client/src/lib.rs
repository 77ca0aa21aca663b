//! Client code for fieldroute.
//!
//! This crate provides the HTTP client for the external mapping provider
//! (geocoding and directions), implementing the core `MapsProvider` trait.

pub mod maps;

pub use maps::{MapsClient, MapsConfig, MapsError};
