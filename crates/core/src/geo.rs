//! Coordinates, travel modes and great-circle geometry.
//!
//! Everything in here is pure and cheap; it is what the optimizer falls back
//! to when the provider cannot be reached.

use std::fmt;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Decimal places kept when coordinates feed a cache key (~11 m).
pub const KEY_PRECISION: i32 = 4;

/// A validated latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Create a point, rejecting out-of-range or non-finite coordinates.
    pub fn new(lat: f64, lng: f64) -> Result<Self, Error> {
        let point = Self { lat, lng };
        point.validate()?;
        Ok(point)
    }

    /// Check the coordinate bounds.
    ///
    /// Points deserialized from callers bypass [`GeoPoint::new`], so entry
    /// points call this before using them.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(Error::InvalidInput(format!("latitude out of range: {}", self.lat)));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(Error::InvalidInput(format!("longitude out of range: {}", self.lng)));
        }
        Ok(())
    }

    /// Coordinates rounded to [`KEY_PRECISION`] decimals, as integers.
    ///
    /// Integers avoid `-0.0` vs `0.0` and float formatting drift in keys.
    pub fn key_parts(&self) -> (i64, i64) {
        let factor = 10f64.powi(KEY_PRECISION);
        ((self.lat * factor).round() as i64, (self.lng * factor).round() as i64)
    }

    /// Stable textual form used inside cache keys.
    pub fn key_string(&self) -> String {
        let (lat, lng) = self.key_parts();
        format!("{lat},{lng}")
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_meters(self, other)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lng)
    }
}

/// Haversine distance between two points in meters.
pub fn haversine_meters(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// Total haversine length of a path visiting `points` in order.
pub fn path_length_meters(points: &[GeoPoint]) -> f64 {
    points.windows(2).map(|w| haversine_meters(&w[0], &w[1])).sum()
}

/// Travel mode understood by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Driving,
    Walking,
    Bicycling,
    Transit,
}

impl TravelMode {
    /// Provider query value.
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
            TravelMode::Bicycling => "bicycling",
            TravelMode::Transit => "transit",
        }
    }

    /// Average urban speed used for geometric duration estimates.
    pub fn average_speed_kmh(&self) -> f64 {
        match self {
            TravelMode::Driving => 40.0,
            TravelMode::Walking => 5.0,
            TravelMode::Bicycling => 18.0,
            TravelMode::Transit => 25.0,
        }
    }

    /// Estimated travel time for a straight-line distance.
    pub fn estimate_duration(&self, distance_meters: f64) -> Duration {
        let meters_per_sec = self.average_speed_kmh() * 1000.0 / 3600.0;
        Duration::from_secs((distance_meters.max(0.0) / meters_per_sec).round() as u64)
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint::new(lat, lng).unwrap()
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(GeoPoint::new(90.1, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -180.5).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn test_haversine_known_distance() {
        // Maastricht Vrijthof -> Heerlen station, roughly 20 km apart.
        let maastricht = point(50.8489, 5.6888);
        let heerlen = point(50.8913, 5.9797);
        let d = haversine_meters(&maastricht, &heerlen);
        assert!((20_000.0..22_000.0).contains(&d), "got {d}");
        assert_eq!(haversine_meters(&maastricht, &maastricht), 0.0);
    }

    #[test]
    fn test_key_rounding_collapses_nearby_points() {
        let a = point(50.848_91, 5.688_81);
        let b = point(50.848_88, 5.688_84);
        assert_eq!(a.key_string(), b.key_string());

        let c = point(50.8495, 5.6888);
        assert_ne!(a.key_string(), c.key_string());
    }

    #[test]
    fn test_estimate_duration_by_mode() {
        assert_eq!(TravelMode::Driving.estimate_duration(40_000.0), Duration::from_secs(3600));
        assert_eq!(TravelMode::Walking.estimate_duration(5_000.0), Duration::from_secs(3600));
        assert_eq!(TravelMode::Bicycling.estimate_duration(18_000.0), Duration::from_secs(3600));
    }

    #[test]
    fn test_path_length() {
        let a = point(50.0, 5.0);
        let b = point(50.1, 5.0);
        let total = path_length_meters(&[a, b, a]);
        assert!((total - 2.0 * haversine_meters(&a, &b)).abs() < 1e-6);
        assert_eq!(path_length_meters(&[a]), 0.0);
    }
}
