//! Stop ordering with a geometric fallback.
//!
//! The provider's waypoint optimization is preferred. When it fails for any
//! reason, [`fallback_reason`] names the cause and a nearest-neighbor tour
//! with straight-line leg estimates is returned instead, so callers always
//! get a usable route.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::cache::RouteCache;
use super::{OptimizedRoute, RouteLeg, RouteRequest, RouteResult, RouteSource};
use crate::Error;
use crate::geo::{GeoPoint, TravelMode, haversine_meters, path_length_meters};
use crate::provider::{MapsProvider, ProviderError};

/// Efficiency reported for heuristic routes.
pub const FALLBACK_EFFICIENCY: u8 = 75;

const DISTANCE_WEIGHT: f64 = 0.6;
const UTILIZATION_WEIGHT: f64 = 0.4;

/// Why a route came from the heuristic instead of the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    RateLimited,
    QuotaExceeded,
    NoResults,
    ProviderUnavailable,
    ProviderError,
    /// The provider answered with an order or legs that do not fit the request.
    MalformedResponse,
}

/// Map a provider failure to the reason recorded on the fallback route.
///
/// Every provider failure leads to the fallback; this only names it.
pub fn fallback_reason(err: &ProviderError) -> FallbackReason {
    match err {
        ProviderError::RateLimited => FallbackReason::RateLimited,
        ProviderError::QuotaExceeded => FallbackReason::QuotaExceeded,
        ProviderError::NoResults => FallbackReason::NoResults,
        ProviderError::Unavailable(_) => FallbackReason::ProviderUnavailable,
        ProviderError::Provider(_) => FallbackReason::ProviderError,
    }
}

/// Greedy tour: from `origin`, repeatedly visit the closest unvisited
/// waypoint. Returns indices into `waypoints`; ties go to the lower index.
pub fn nearest_neighbor(origin: &GeoPoint, waypoints: &[GeoPoint]) -> Vec<usize> {
    let mut remaining: Vec<usize> = (0..waypoints.len()).collect();
    let mut order = Vec::with_capacity(waypoints.len());
    let mut current = *origin;

    while !remaining.is_empty() {
        let mut best = 0;
        let mut best_distance = f64::INFINITY;
        for (pos, &idx) in remaining.iter().enumerate() {
            let d = haversine_meters(&current, &waypoints[idx]);
            if d < best_distance {
                best = pos;
                best_distance = d;
            }
        }
        let idx = remaining.remove(best);
        current = waypoints[idx];
        order.push(idx);
    }

    order
}

/// Share of the naive (given-order) path length saved by `ordered`, in percent.
fn distance_saved_pct(origin: &GeoPoint, given: &[GeoPoint], ordered: &[GeoPoint], destination: &GeoPoint) -> f64 {
    let path = |stops: &[GeoPoint]| {
        let mut points = Vec::with_capacity(stops.len() + 2);
        points.push(*origin);
        points.extend_from_slice(stops);
        points.push(*destination);
        path_length_meters(&points)
    };

    let naive = path(given);
    if naive <= 0.0 {
        return 0.0;
    }
    ((naive - path(ordered)) / naive * 100.0).clamp(0.0, 100.0)
}

/// `round(0.6 × distance saved % + 0.4 × time utilization %)`.
pub fn efficiency_score(distance_saved_pct: f64, service_secs: u64, travel_secs: u64) -> u8 {
    let busy = service_secs + travel_secs;
    let utilization = if busy == 0 { 0.0 } else { service_secs as f64 / busy as f64 * 100.0 };
    (DISTANCE_WEIGHT * distance_saved_pct + UTILIZATION_WEIGHT * utilization)
        .round()
        .clamp(0.0, 100.0) as u8
}

/// Straight-line legs through `points` in order.
fn estimated_legs(points: &[GeoPoint], mode: TravelMode) -> Vec<RouteLeg> {
    points
        .windows(2)
        .map(|w| {
            let distance = haversine_meters(&w[0], &w[1]);
            RouteLeg {
                from: w[0],
                to: w[1],
                distance_meters: distance,
                duration_secs: mode.estimate_duration(distance).as_secs(),
                traffic_duration_secs: None,
            }
        })
        .collect()
}

/// A stop with the travel time needed to reach it from the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimedStop {
    pub location: GeoPoint,
    pub travel_secs: u64,
    pub duration_minutes: u32,
}

/// Arrival and departure at one stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimeWindow {
    pub location: GeoPoint,
    pub arrival: DateTime<Utc>,
    pub departure: DateTime<Utc>,
}

/// Walk the stops from `start`: arrive after travel, leave after the
/// service duration, then add `buffer_minutes` before setting off again.
pub fn calculate_time_windows(stops: &[TimedStop], start: DateTime<Utc>, buffer_minutes: u32) -> Vec<TimeWindow> {
    let buffer = chrono::Duration::minutes(i64::from(buffer_minutes));
    let mut cursor = start;

    stops
        .iter()
        .map(|stop| {
            let arrival = cursor + chrono::Duration::seconds(stop.travel_secs as i64);
            let departure = arrival + chrono::Duration::minutes(i64::from(stop.duration_minutes));
            cursor = departure + buffer;
            TimeWindow { location: stop.location, arrival, departure }
        })
        .collect()
}

/// Limits a technician's day must respect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RouteConstraints {
    pub max_distance_meters: Option<f64>,
    /// Travel plus service time.
    pub max_duration_secs: Option<u64>,
    pub max_stops: Option<usize>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub service_minutes_per_stop: u32,
}

/// One broken constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintViolation {
    DistanceExceeded { actual_meters: f64, limit_meters: f64 },
    DurationExceeded { actual_secs: u64, limit_secs: u64 },
    TooManyStops { actual: usize, limit: usize },
    FinishesAfterEnd { finish: DateTime<Utc>, end_time: DateTime<Utc> },
}

/// Every constraint `route` breaks; empty means the route is acceptable.
pub fn validate_route_constraints(route: &OptimizedRoute, constraints: &RouteConstraints) -> Vec<ConstraintViolation> {
    let mut violations = Vec::new();
    let stops = route.ordered_waypoints.len();
    let total_secs = route.total_duration_secs + stops as u64 * u64::from(constraints.service_minutes_per_stop) * 60;

    if let Some(limit) = constraints.max_distance_meters
        && route.total_distance_meters > limit
    {
        violations.push(ConstraintViolation::DistanceExceeded {
            actual_meters: route.total_distance_meters,
            limit_meters: limit,
        });
    }

    if let Some(limit) = constraints.max_duration_secs
        && total_secs > limit
    {
        violations.push(ConstraintViolation::DurationExceeded { actual_secs: total_secs, limit_secs: limit });
    }

    if let Some(limit) = constraints.max_stops
        && stops > limit
    {
        violations.push(ConstraintViolation::TooManyStops { actual: stops, limit });
    }

    if let (Some(start), Some(end_time)) = (constraints.start_time, constraints.end_time) {
        let finish = start + chrono::Duration::seconds(total_secs as i64);
        if finish > end_time {
            violations.push(ConstraintViolation::FinishesAfterEnd { finish, end_time });
        }
    }

    violations
}

/// Orders stops through the provider, falling back to the heuristic.
pub struct RouteOptimizer {
    routes: Arc<RouteCache>,
    provider: Arc<dyn MapsProvider>,
    service_minutes_per_stop: u32,
}

impl RouteOptimizer {
    pub fn new(routes: Arc<RouteCache>, provider: Arc<dyn MapsProvider>, service_minutes_per_stop: u32) -> Self {
        Self { routes, provider, service_minutes_per_stop }
    }

    /// Order `waypoints` between `origin` and `destination`.
    ///
    /// More than [`super::MAX_WAYPOINTS`] stops or an invalid coordinate is an input
    /// error and never reaches the provider. Provider failures are not errors:
    /// they produce a fallback route.
    pub async fn optimize_route(
        &self, origin: GeoPoint, waypoints: &[GeoPoint], destination: GeoPoint, mode: TravelMode,
    ) -> Result<OptimizedRoute, Error> {
        let request = RouteRequest::new(origin, destination, mode)
            .with_waypoints(waypoints.to_vec())
            .optimized();
        request.validate()?;

        if let Some(cached) = self.routes.get_optimized_route(&origin, waypoints, &destination, mode).await {
            tracing::debug!(stops = waypoints.len(), "optimized route cache hit");
            return Ok(cached);
        }

        let outcome = match self.provider.compute_route(&request).await {
            Ok(result) => self.route_from_provider(&request, result),
            Err(e) => Err(fallback_reason(&e)),
        };

        match outcome {
            Ok(route) => {
                if let Err(e) = self.routes.set_optimized_route(&origin, waypoints, &destination, mode, &route).await {
                    tracing::warn!(error = %e, "failed to cache optimized route");
                }
                Ok(route)
            }
            Err(reason) => {
                tracing::warn!(?reason, stops = waypoints.len(), "provider optimization failed, using nearest-neighbor");
                Ok(self.fallback_route(origin, waypoints, destination, mode, reason))
            }
        }
    }

    /// Heuristic route; never cached.
    pub fn fallback_route(
        &self, origin: GeoPoint, waypoints: &[GeoPoint], destination: GeoPoint, mode: TravelMode,
        reason: FallbackReason,
    ) -> OptimizedRoute {
        let order = nearest_neighbor(&origin, waypoints);
        let ordered: Vec<GeoPoint> = order.iter().map(|&i| waypoints[i]).collect();

        let mut points = Vec::with_capacity(ordered.len() + 2);
        points.push(origin);
        points.extend_from_slice(&ordered);
        points.push(destination);
        let legs = estimated_legs(&points, mode);

        OptimizedRoute {
            total_distance_meters: legs.iter().map(|l| l.distance_meters).sum(),
            total_duration_secs: legs.iter().map(|l| l.duration_secs).sum(),
            ordered_waypoints: ordered,
            waypoint_order: order,
            legs,
            efficiency: FALLBACK_EFFICIENCY,
            source: RouteSource::Fallback,
            fallback_reason: Some(reason),
        }
    }

    /// Rebuild the route from a provider answer, checking it fits the request.
    fn route_from_provider(&self, request: &RouteRequest, result: RouteResult) -> Result<OptimizedRoute, FallbackReason> {
        let n = request.waypoints.len();
        let order = result.waypoint_order.clone().unwrap_or_else(|| (0..n).collect());

        let mut seen = vec![false; n];
        for &i in &order {
            if i >= n || std::mem::replace(&mut seen[i], true) {
                return Err(FallbackReason::MalformedResponse);
            }
        }
        if order.len() != n || result.legs.len() != n + 1 {
            return Err(FallbackReason::MalformedResponse);
        }

        let ordered: Vec<GeoPoint> = order.iter().map(|&i| request.waypoints[i]).collect();
        let travel_secs = result.total_duration_secs();
        let service_secs = n as u64 * u64::from(self.service_minutes_per_stop) * 60;
        let saved = distance_saved_pct(&request.origin, &request.waypoints, &ordered, &request.destination);

        Ok(OptimizedRoute {
            total_distance_meters: result.total_distance_meters(),
            total_duration_secs: travel_secs,
            efficiency: efficiency_score(saved, service_secs, travel_secs),
            ordered_waypoints: ordered,
            waypoint_order: order,
            legs: result.legs,
            source: RouteSource::Provider,
            fallback_reason: None,
        })
    }
}
