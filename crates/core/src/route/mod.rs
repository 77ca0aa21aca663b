//! Routes, distance matrices, clusters and the route optimizer.

pub mod cache;
pub mod optimizer;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::cache::{compute_cache_key, plain_key};
use crate::geo::{GeoPoint, TravelMode};

pub use cache::{RouteCache, RouteWarmReport};
pub use optimizer::{
    ConstraintViolation, FallbackReason, RouteConstraints, RouteOptimizer, TimeWindow, TimedStop,
    calculate_time_windows, fallback_reason, nearest_neighbor, validate_route_constraints,
};

/// The provider's per-request waypoint limit.
pub const MAX_WAYPOINTS: usize = 25;

pub const ROUTE_NAMESPACE: &str = "route";
pub const ROUTE_TRAFFIC_NAMESPACE: &str = "route_traffic";
pub const ROUTE_OPT_NAMESPACE: &str = "route_opt";
pub const MATRIX_NAMESPACE: &str = "matrix";
pub const CLUSTER_NAMESPACE: &str = "cluster";

/// Departure times inside the same window share a traffic-aware cache entry.
const DEPARTURE_BUCKET_MINUTES: u32 = 15;

fn points_key(points: &[GeoPoint]) -> String {
    points.iter().map(GeoPoint::key_string).collect::<Vec<_>>().join(";")
}

/// A routing query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RouteRequest {
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    #[serde(default)]
    pub waypoints: Vec<GeoPoint>,
    #[serde(default)]
    pub mode: TravelMode,
    /// Set for traffic-aware routing.
    #[serde(default)]
    pub departure_time: Option<DateTime<Utc>>,
    /// Let the provider reorder the waypoints.
    #[serde(default)]
    pub optimize: bool,
}

impl RouteRequest {
    pub fn new(origin: GeoPoint, destination: GeoPoint, mode: TravelMode) -> Self {
        Self { origin, destination, waypoints: Vec::new(), mode, departure_time: None, optimize: false }
    }

    pub fn with_waypoints(mut self, waypoints: Vec<GeoPoint>) -> Self {
        self.waypoints = waypoints;
        self
    }

    pub fn with_departure_time(mut self, at: DateTime<Utc>) -> Self {
        self.departure_time = Some(at);
        self
    }

    pub fn optimized(mut self) -> Self {
        self.optimize = true;
        self
    }

    pub fn is_traffic_aware(&self) -> bool {
        self.departure_time.is_some()
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.waypoints.len() > MAX_WAYPOINTS {
            return Err(Error::TooManyWaypoints { count: self.waypoints.len(), max: MAX_WAYPOINTS });
        }
        self.origin.validate()?;
        self.destination.validate()?;
        self.waypoints.iter().try_for_each(GeoPoint::validate)
    }

    /// Hash of the rounded request; traffic-aware requests live in their own
    /// short-lived namespace.
    pub fn cache_key(&self) -> String {
        let namespace = if self.is_traffic_aware() { ROUTE_TRAFFIC_NAMESPACE } else { ROUTE_NAMESPACE };
        let departure = self
            .departure_time
            .map(|t| {
                let bucket = t.minute() / DEPARTURE_BUCKET_MINUTES * DEPARTURE_BUCKET_MINUTES;
                format!("{}{:02}", t.format("%Y-%m-%dT%H:"), bucket)
            })
            .unwrap_or_default();
        let origin = self.origin.key_string();
        let destination = self.destination.key_string();
        let waypoints = points_key(&self.waypoints);
        let optimize = if self.optimize { "opt" } else { "" };
        compute_cache_key(
            namespace,
            &[&origin, &destination, &waypoints, self.mode.as_str(), &departure, optimize],
        )
    }
}

/// One segment between consecutive points of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RouteLeg {
    pub from: GeoPoint,
    pub to: GeoPoint,
    pub distance_meters: f64,
    pub duration_secs: u64,
    /// Duration under current traffic, when the provider reported it.
    #[serde(default)]
    pub traffic_duration_secs: Option<u64>,
}

impl RouteLeg {
    /// Traffic-aware duration when known, otherwise the static one.
    pub fn effective_duration_secs(&self) -> u64 {
        self.traffic_duration_secs.unwrap_or(self.duration_secs)
    }
}

/// A provider route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RouteResult {
    pub legs: Vec<RouteLeg>,
    #[serde(default)]
    pub polyline: Option<String>,
    /// Visiting order of the request's waypoints, when the provider reordered them.
    #[serde(default)]
    pub waypoint_order: Option<Vec<usize>>,
}

impl RouteResult {
    pub fn total_distance_meters(&self) -> f64 {
        self.legs.iter().map(|l| l.distance_meters).sum()
    }

    pub fn total_duration_secs(&self) -> u64 {
        self.legs.iter().map(RouteLeg::effective_duration_secs).sum()
    }
}

/// Where an optimized route came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    Provider,
    Fallback,
}

/// An ordered visiting plan for a set of stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OptimizedRoute {
    pub ordered_waypoints: Vec<GeoPoint>,
    /// `ordered_waypoints[i] == waypoints[waypoint_order[i]]` of the input.
    pub waypoint_order: Vec<usize>,
    pub legs: Vec<RouteLeg>,
    pub total_distance_meters: f64,
    pub total_duration_secs: u64,
    /// 0..=100
    pub efficiency: u8,
    pub source: RouteSource,
    /// Why the heuristic was used, for fallback routes.
    #[serde(default)]
    pub fallback_reason: Option<FallbackReason>,
}

impl OptimizedRoute {
    /// Cache key for an optimization query.
    pub fn cache_key(origin: &GeoPoint, waypoints: &[GeoPoint], destination: &GeoPoint, mode: TravelMode) -> String {
        let origin = origin.key_string();
        let destination = destination.key_string();
        let waypoints = points_key(waypoints);
        compute_cache_key(ROUTE_OPT_NAMESPACE, &[&origin, &waypoints, &destination, mode.as_str()])
    }

    /// Stops with their inbound travel time, ready for [`calculate_time_windows`].
    pub fn timed_stops(&self, duration_minutes: &[u32]) -> Vec<TimedStop> {
        self.ordered_waypoints
            .iter()
            .enumerate()
            .map(|(i, location)| TimedStop {
                location: *location,
                travel_secs: self.legs.get(i).map(RouteLeg::effective_duration_secs).unwrap_or(0),
                duration_minutes: duration_minutes.get(i).copied().unwrap_or(0),
            })
            .collect()
    }
}

/// A single origin/destination cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MatrixElement {
    pub distance_meters: f64,
    pub duration_secs: u64,
    /// True when the provider failed and the cell is a straight-line estimate.
    #[serde(default)]
    pub estimated: bool,
}

/// Travel distances and times between every origin and destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DistanceMatrix {
    pub origins: Vec<GeoPoint>,
    pub destinations: Vec<GeoPoint>,
    pub mode: TravelMode,
    /// `rows[i][j]` is origin `i` to destination `j`.
    pub rows: Vec<Vec<Option<MatrixElement>>>,
}

impl DistanceMatrix {
    pub fn cache_key(origins: &[GeoPoint], destinations: &[GeoPoint], mode: TravelMode) -> String {
        let origins = points_key(origins);
        let destinations = points_key(destinations);
        compute_cache_key(MATRIX_NAMESPACE, &[&origins, &destinations, mode.as_str()])
    }

    pub fn element(&self, origin: usize, destination: usize) -> Option<&MatrixElement> {
        self.rows.get(origin)?.get(destination)?.as_ref()
    }

    pub fn has_estimates(&self) -> bool {
        self.rows.iter().flatten().flatten().any(|e| e.estimated)
    }
}

/// The optimized visiting plan for one area on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RouteCluster {
    pub area_id: String,
    pub date: NaiveDate,
    pub appointment_ids: Vec<String>,
    pub stops: Vec<GeoPoint>,
    pub route: OptimizedRoute,
    /// Located appointments left off the route by the waypoint limit.
    #[serde(default)]
    pub dropped_appointment_ids: Vec<String>,
}

impl RouteCluster {
    pub fn cache_key(area_id: &str, date: NaiveDate) -> String {
        plain_key(CLUSTER_NAMESPACE, &format!("{area_id}:{date}"))
    }
}
