//! optimize_route tool implementation.
//!
//! Orders a technician's stops, through the provider when it answers and
//! with a nearest-neighbor fallback otherwise.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use fieldroute_core::route::{ConstraintViolation, OptimizedRoute, RouteConstraints, validate_route_constraints};
use fieldroute_core::{CacheManager, GeoPoint, TravelMode};

use super::json_result;

/// Input parameters for optimize_route tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OptimizeRouteParams {
    /// Start of the day's route.
    pub origin: GeoPoint,

    /// Stops to visit, at most 25.
    pub waypoints: Vec<GeoPoint>,

    /// End of the route. Defaults to the origin (round trip).
    #[serde(default)]
    pub destination: Option<GeoPoint>,

    /// Travel mode (default driving).
    #[serde(default)]
    pub mode: TravelMode,

    /// Limits to check the optimized route against.
    #[serde(default)]
    pub constraints: Option<RouteConstraints>,
}

/// Output structure for optimize_route tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OptimizeRouteOutput {
    pub route: OptimizedRoute,
    /// Broken constraints; empty when none were given or all hold.
    pub violations: Vec<ConstraintViolation>,
}

/// Implementation of the optimize_route tool.
pub async fn optimize_route_impl(manager: &CacheManager, params: OptimizeRouteParams) -> Result<CallToolResult, McpError> {
    let destination = params.destination.unwrap_or(params.origin);
    let route = manager
        .optimize_route(params.origin, &params.waypoints, destination, params.mode)
        .await?;

    let violations = params
        .constraints
        .as_ref()
        .map(|c| validate_route_constraints(&route, c))
        .unwrap_or_default();

    json_result(&OptimizeRouteOutput { route, violations })
}
