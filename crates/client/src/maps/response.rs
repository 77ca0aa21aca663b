//! Maps API response types and normalization.

use serde::Deserialize;

use fieldroute_core::geocode::{Accuracy, GeocodeResult};
use fieldroute_core::route::{RouteLeg, RouteRequest, RouteResult};
use fieldroute_core::GeoPoint;

use crate::maps::MapsError;

/// Raw response from the geocoding endpoint.
#[derive(Debug, Deserialize)]
pub struct GeocodeApiResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<RawGeocodeResult>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawGeocodeResult {
    pub place_id: String,
    pub formatted_address: String,
    pub geometry: Geometry,
}

#[derive(Debug, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
    #[serde(default)]
    pub location_type: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl From<LatLng> for GeoPoint {
    fn from(p: LatLng) -> Self {
        GeoPoint { lat: p.lat, lng: p.lng }
    }
}

/// Raw response from the directions endpoint.
#[derive(Debug, Deserialize)]
pub struct DirectionsApiResponse {
    pub status: String,
    #[serde(default)]
    pub routes: Vec<RawRoute>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawRoute {
    pub legs: Vec<RawLeg>,
    #[serde(default)]
    pub overview_polyline: Option<Polyline>,
    #[serde(default)]
    pub waypoint_order: Vec<usize>,
}

#[derive(Debug, Deserialize)]
pub struct Polyline {
    pub points: String,
}

#[derive(Debug, Deserialize)]
pub struct RawLeg {
    pub distance: Measure,
    pub duration: Measure,
    #[serde(default)]
    pub duration_in_traffic: Option<Measure>,
    pub start_location: LatLng,
    pub end_location: LatLng,
}

/// A `{ "value": .., "text": .. }` pair; only the value is used.
#[derive(Debug, Deserialize)]
pub struct Measure {
    pub value: f64,
}

fn accuracy_of(location_type: Option<&str>) -> Accuracy {
    match location_type {
        Some("ROOFTOP") => Accuracy::Rooftop,
        Some("RANGE_INTERPOLATED") => Accuracy::RangeInterpolated,
        Some("GEOMETRIC_CENTER") => Accuracy::GeometricCenter,
        _ => Accuracy::Approximate,
    }
}

fn secs(measure: &Measure) -> u64 {
    measure.value.max(0.0).round() as u64
}

impl GeocodeApiResponse {
    /// The best match, or the error the body status stands for.
    pub fn into_result(self) -> Result<GeocodeResult, MapsError> {
        if let Some(err) = MapsError::from_status(&self.status, self.error_message) {
            return Err(err);
        }

        let best = self.results.into_iter().next().ok_or(MapsError::NoResults)?;
        let location = GeoPoint::from(best.geometry.location);
        location.validate().map_err(|e| MapsError::Parse(e.to_string()))?;

        Ok(GeocodeResult {
            location,
            place_id: best.place_id,
            formatted_address: best.formatted_address,
            accuracy: accuracy_of(best.geometry.location_type.as_deref()),
        })
    }
}

impl DirectionsApiResponse {
    /// The first route, with the waypoint order kept only for optimized requests.
    pub fn into_result(self, request: &RouteRequest) -> Result<RouteResult, MapsError> {
        if let Some(err) = MapsError::from_status(&self.status, self.error_message) {
            return Err(err);
        }

        let route = self.routes.into_iter().next().ok_or(MapsError::NoResults)?;
        let expected_legs = request.waypoints.len() + 1;
        if route.legs.len() != expected_legs {
            return Err(MapsError::Parse(format!(
                "expected {expected_legs} legs, got {}",
                route.legs.len()
            )));
        }

        let legs = route
            .legs
            .iter()
            .map(|leg| RouteLeg {
                from: leg.start_location.into(),
                to: leg.end_location.into(),
                distance_meters: leg.distance.value.max(0.0),
                duration_secs: secs(&leg.duration),
                traffic_duration_secs: leg.duration_in_traffic.as_ref().map(secs),
            })
            .collect();

        Ok(RouteResult {
            legs,
            polyline: route.overview_polyline.map(|p| p.points),
            waypoint_order: request.optimize.then_some(route.waypoint_order),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldroute_core::TravelMode;

    const GEOCODE_OK: &str = r#"{
        "status": "OK",
        "results": [{
            "place_id": "ChIJ-maastricht-markt",
            "formatted_address": "Markt 1, 6211 CK Maastricht, Netherlands",
            "geometry": {
                "location": { "lat": 50.8512, "lng": 5.6909 },
                "location_type": "ROOFTOP"
            }
        }]
    }"#;

    const DIRECTIONS_OK: &str = r#"{
        "status": "OK",
        "routes": [{
            "overview_polyline": { "points": "a~l~Fjk~uOwHJy@P" },
            "waypoint_order": [1, 0],
            "legs": [
                {
                    "distance": { "value": 4200, "text": "4.2 km" },
                    "duration": { "value": 600, "text": "10 mins" },
                    "duration_in_traffic": { "value": 720, "text": "12 mins" },
                    "start_location": { "lat": 50.85, "lng": 5.69 },
                    "end_location": { "lat": 50.8, "lng": 5.8 }
                },
                {
                    "distance": { "value": 9100, "text": "9.1 km" },
                    "duration": { "value": 1020, "text": "17 mins" },
                    "start_location": { "lat": 50.8, "lng": 5.8 },
                    "end_location": { "lat": 50.9, "lng": 5.7 }
                },
                {
                    "distance": { "value": 6000, "text": "6 km" },
                    "duration": { "value": 800, "text": "13 mins" },
                    "start_location": { "lat": 50.9, "lng": 5.7 },
                    "end_location": { "lat": 50.85, "lng": 5.69 }
                }
            ]
        }]
    }"#;

    fn request(optimize: bool) -> RouteRequest {
        let home = GeoPoint::new(50.85, 5.69).unwrap();
        let req = RouteRequest::new(home, home, TravelMode::Driving)
            .with_waypoints(vec![GeoPoint::new(50.9, 5.7).unwrap(), GeoPoint::new(50.8, 5.8).unwrap()]);
        if optimize { req.optimized() } else { req }
    }

    #[test]
    fn test_geocode_normalization() {
        let raw: GeocodeApiResponse = serde_json::from_str(GEOCODE_OK).unwrap();
        let result = raw.into_result().unwrap();

        assert_eq!(result.place_id, "ChIJ-maastricht-markt");
        assert_eq!(result.accuracy, Accuracy::Rooftop);
        assert!((result.location.lat - 50.8512).abs() < 1e-9);
    }

    #[test]
    fn test_geocode_zero_results() {
        let raw: GeocodeApiResponse = serde_json::from_str(r#"{"status": "ZERO_RESULTS", "results": []}"#).unwrap();
        assert!(matches!(raw.into_result(), Err(MapsError::NoResults)));
    }

    #[test]
    fn test_geocode_over_limit() {
        let raw: GeocodeApiResponse =
            serde_json::from_str(r#"{"status": "OVER_QUERY_LIMIT", "error_message": "slow down"}"#).unwrap();
        assert!(matches!(raw.into_result(), Err(MapsError::RateLimited)));
    }

    #[test]
    fn test_unknown_location_type_is_approximate() {
        assert_eq!(accuracy_of(Some("SOMETHING_NEW")), Accuracy::Approximate);
        assert_eq!(accuracy_of(None), Accuracy::Approximate);
    }

    #[test]
    fn test_directions_normalization() {
        let raw: DirectionsApiResponse = serde_json::from_str(DIRECTIONS_OK).unwrap();
        let result = raw.into_result(&request(true)).unwrap();

        assert_eq!(result.legs.len(), 3);
        assert_eq!(result.waypoint_order, Some(vec![1, 0]));
        assert_eq!(result.legs[0].traffic_duration_secs, Some(720));
        assert_eq!(result.legs[1].traffic_duration_secs, None);
        assert_eq!(result.total_distance_meters(), 19_300.0);
        assert_eq!(result.polyline.as_deref(), Some("a~l~Fjk~uOwHJy@P"));
    }

    #[test]
    fn test_directions_order_dropped_when_not_optimized() {
        let raw: DirectionsApiResponse = serde_json::from_str(DIRECTIONS_OK).unwrap();
        let result = raw.into_result(&request(false)).unwrap();
        assert_eq!(result.waypoint_order, None);
    }

    #[test]
    fn test_directions_leg_count_mismatch() {
        let raw: DirectionsApiResponse = serde_json::from_str(DIRECTIONS_OK).unwrap();
        let home = GeoPoint::new(50.85, 5.69).unwrap();
        let direct = RouteRequest::new(home, home, TravelMode::Driving);
        assert!(matches!(raw.into_result(&direct), Err(MapsError::Parse(_))));
    }
}
