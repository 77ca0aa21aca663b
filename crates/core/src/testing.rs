//! Test doubles shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::boundary::{PostalRange, ServiceArea};
use crate::cache::TwoTierCache;
use crate::config::WarmingSettings;
use crate::geo::{GeoPoint, haversine_meters};
use crate::geocode::GeocodeResult;
use crate::provider::{MapsProvider, ProviderError};
use crate::route::{RouteLeg, RouteRequest, RouteResult, nearest_neighbor};

/// Scripted provider that counts its calls.
///
/// Geocoding answers with the first registered result whose needle occurs
/// in the lowercased query. Routing returns straight-line legs and, for
/// optimized requests, a nearest-neighbor order.
#[derive(Debug, Default)]
pub struct FakeProvider {
    geocodes: Vec<(String, GeocodeResult)>,
    geocode_failure: Option<ProviderError>,
    route_failure: Option<ProviderError>,
    waypoint_order: Option<Vec<usize>>,
    delay: Duration,
    geocode_calls: AtomicUsize,
    route_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_geocode(mut self, needle: &str, result: GeocodeResult) -> Self {
        self.geocodes.push((needle.to_lowercase(), result));
        self
    }

    pub fn failing_geocode(mut self, err: ProviderError) -> Self {
        self.geocode_failure = Some(err);
        self
    }

    pub fn failing_routes(mut self, err: ProviderError) -> Self {
        self.route_failure = Some(err);
        self
    }

    /// Force the waypoint order reported for optimized requests.
    pub fn with_waypoint_order(mut self, order: Vec<usize>) -> Self {
        self.waypoint_order = Some(order);
        self
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn geocode_calls(&self) -> usize {
        self.geocode_calls.load(Ordering::SeqCst)
    }

    pub fn route_calls(&self) -> usize {
        self.route_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MapsProvider for FakeProvider {
    async fn geocode(&self, query: &str) -> Result<GeocodeResult, ProviderError> {
        self.geocode_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(err) = &self.geocode_failure {
            return Err(err.clone());
        }

        let query = query.to_lowercase();
        self.geocodes
            .iter()
            .find(|(needle, _)| query.contains(needle.as_str()))
            .map(|(_, result)| result.clone())
            .ok_or(ProviderError::NoResults)
    }

    async fn compute_route(&self, request: &RouteRequest) -> Result<RouteResult, ProviderError> {
        self.route_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(err) = &self.route_failure {
            return Err(err.clone());
        }

        let order = match (&self.waypoint_order, request.optimize) {
            (Some(forced), true) => forced.clone(),
            (None, true) => nearest_neighbor(&request.origin, &request.waypoints),
            (_, false) => (0..request.waypoints.len()).collect(),
        };

        let mut points = vec![request.origin];
        points.extend(order.iter().filter_map(|&i| request.waypoints.get(i).copied()));
        points.push(request.destination);

        let legs = points
            .windows(2)
            .map(|w| {
                let distance = haversine_meters(&w[0], &w[1]);
                RouteLeg {
                    from: w[0],
                    to: w[1],
                    distance_meters: distance * 1.3,
                    duration_secs: (distance * 1.3 / 11.0).round() as u64,
                    traffic_duration_secs: request.departure_time.map(|_| (distance * 1.3 / 9.0).round() as u64),
                }
            })
            .collect();

        Ok(RouteResult { legs, polyline: None, waypoint_order: request.optimize.then_some(order) })
    }
}

/// In-process cache with the default namespace policy.
pub fn memory_cache() -> Arc<TwoTierCache> {
    Arc::new(TwoTierCache::memory_only(10_000, 16 * 1024 * 1024))
}

/// Postal codes 5800-6999, formatted addresses mentioning "Limburg".
pub fn sample_area() -> ServiceArea {
    ServiceArea {
        id: "limburg-south".into(),
        name: "South Limburg".into(),
        region_marker: "Limburg".into(),
        centroid: GeoPoint { lat: 50.85, lng: 5.69 },
        postal_ranges: vec![PostalRange::new(5800, 6999)],
    }
}

/// Warming settings without inter-batch pauses.
pub fn test_settings() -> WarmingSettings {
    WarmingSettings { batch_delay_ms: 0, ..Default::default() }
}
