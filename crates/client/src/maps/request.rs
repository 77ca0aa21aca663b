//! Query parameters for the geocoding and directions endpoints.

use fieldroute_core::route::RouteRequest;

use crate::maps::MapsError;

/// Longest address query the API accepts in practice.
const MAX_QUERY_LEN: usize = 2048;

/// Parameters for `GET /geocode/json`.
pub fn geocode_params(query: &str) -> Result<Vec<(&'static str, String)>, MapsError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(MapsError::InvalidRequest("address query cannot be empty".to_string()));
    }
    if query.len() > MAX_QUERY_LEN {
        return Err(MapsError::InvalidRequest(format!(
            "address query too long: {} chars (max {MAX_QUERY_LEN})",
            query.len()
        )));
    }
    Ok(vec![("address", query.to_string())])
}

/// Parameters for `GET /directions/json`.
///
/// Waypoints are sent as `lat,lng` pairs separated by `|`, prefixed with
/// `optimize:true` when the provider may reorder them.
pub fn directions_params(request: &RouteRequest) -> Result<Vec<(&'static str, String)>, MapsError> {
    request.validate().map_err(|e| MapsError::InvalidRequest(e.to_string()))?;

    let mut params = vec![
        ("origin", request.origin.to_string()),
        ("destination", request.destination.to_string()),
        ("mode", request.mode.as_str().to_string()),
    ];

    if !request.waypoints.is_empty() {
        let points = request.waypoints.iter().map(ToString::to_string).collect::<Vec<_>>().join("|");
        let waypoints = if request.optimize { format!("optimize:true|{points}") } else { points };
        params.push(("waypoints", waypoints));
    }

    if let Some(departure) = request.departure_time {
        params.push(("departure_time", departure.timestamp().to_string()));
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fieldroute_core::{GeoPoint, TravelMode};

    fn point(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint::new(lat, lng).unwrap()
    }

    fn param<'a>(params: &'a [(&'static str, String)], name: &str) -> Option<&'a str> {
        params.iter().find(|(k, _)| *k == name).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_geocode_params_trims() {
        let params = geocode_params("  Markt 1, Maastricht ").unwrap();
        assert_eq!(param(&params, "address"), Some("Markt 1, Maastricht"));
    }

    #[test]
    fn test_geocode_params_rejects_empty() {
        assert!(matches!(geocode_params("   "), Err(MapsError::InvalidRequest(_))));
        assert!(matches!(geocode_params(&"a".repeat(2049)), Err(MapsError::InvalidRequest(_))));
    }

    #[test]
    fn test_directions_params_plain() {
        let request = RouteRequest::new(point(50.85, 5.69), point(50.88, 5.98), TravelMode::Bicycling);
        let params = directions_params(&request).unwrap();

        assert_eq!(param(&params, "origin"), Some("50.850000,5.690000"));
        assert_eq!(param(&params, "destination"), Some("50.880000,5.980000"));
        assert_eq!(param(&params, "mode"), Some("bicycling"));
        assert!(param(&params, "waypoints").is_none());
        assert!(param(&params, "departure_time").is_none());
    }

    #[test]
    fn test_directions_params_optimized_with_departure() {
        let departure = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let request = RouteRequest::new(point(50.85, 5.69), point(50.85, 5.69), TravelMode::Driving)
            .with_waypoints(vec![point(50.9, 5.7), point(50.8, 5.8)])
            .with_departure_time(departure)
            .optimized();
        let params = directions_params(&request).unwrap();

        assert_eq!(
            param(&params, "waypoints"),
            Some("optimize:true|50.900000,5.700000|50.800000,5.800000")
        );
        assert_eq!(param(&params, "departure_time"), Some(departure.timestamp().to_string().as_str()));
    }

    #[test]
    fn test_directions_params_rejects_too_many_waypoints() {
        let request = RouteRequest::new(point(50.85, 5.69), point(50.85, 5.69), TravelMode::Driving)
            .with_waypoints(vec![point(50.9, 5.7); 26]);
        assert!(matches!(directions_params(&request), Err(MapsError::InvalidRequest(_))));
    }
}
