//! Address geocoding cache.
//!
//! Addresses are cached under the hash of their normalized form; each
//! result is also kept permanently under its provider place id.

pub mod address;
pub mod cache;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

pub use address::Address;
pub use cache::{GeocodingCache, WarmReport};

/// Namespace of address-keyed results.
pub const GEO_NAMESPACE: &str = "geo";

/// Namespace of place-id-keyed results.
pub const PLACE_NAMESPACE: &str = "place";

/// How precisely the provider located an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    Rooftop,
    RangeInterpolated,
    GeometricCenter,
    Approximate,
}

impl Accuracy {
    /// Rooftop and interpolated matches pin the actual building.
    pub fn is_precise(&self) -> bool {
        matches!(self, Accuracy::Rooftop | Accuracy::RangeInterpolated)
    }
}

/// A resolved address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeocodeResult {
    pub location: GeoPoint,
    pub place_id: String,
    pub formatted_address: String,
    pub accuracy: Accuracy,
}
