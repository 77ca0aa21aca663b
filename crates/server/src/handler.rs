//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use fieldroute_core::CacheManager;
use fieldroute_core::store::MemoryStore;

use crate::tools::cache::{CacheInvalidateParams, invalidate_impl, stats_impl, warm_impl};
use crate::tools::{
    OptimizeRouteParams, RecordAppointmentParams, SlotsContextParams, ValidateAddressParams, ValidateAddressesParams,
    optimize_route_impl, record_appointment_impl, slots_context_impl, validate_address_impl, validate_addresses_impl,
};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for fieldroute.
#[derive(Clone)]
pub struct FieldrouteServer {
    manager: Arc<CacheManager>,
    store: Arc<MemoryStore>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl FieldrouteServer {
    /// Create a new server handler over an already-built cache manager.
    pub fn new(manager: Arc<CacheManager>, store: Arc<MemoryStore>) -> Self {
        Self { manager, store, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Check whether an address is inside a service area. Combines a postal-code range check with geocoding and returns validity, area id and a 0-100 confidence."
    )]
    async fn validate_address(&self, params: Parameters<ValidateAddressParams>) -> Result<CallToolResult, McpError> {
        validate_address_impl(&self.manager, params.0).await
    }

    #[tool(description = "Validate several addresses at once. Returns one result or error per address, in input order.")]
    async fn validate_addresses(
        &self, params: Parameters<ValidateAddressesParams>,
    ) -> Result<CallToolResult, McpError> {
        validate_addresses_impl(&self.manager, params.0).await
    }

    #[tool(
        description = "Order up to 25 stops into an efficient route. Uses the maps provider when available and a nearest-neighbor estimate otherwise; optional constraints are checked against the result."
    )]
    async fn optimize_route(&self, params: Parameters<OptimizeRouteParams>) -> Result<CallToolResult, McpError> {
        optimize_route_impl(&self.manager, params.0).await
    }

    #[tool(
        description = "Scheduling context for a date: per service area, the booked appointments, centroid distances, the optimized day route and planned arrival times."
    )]
    async fn slots_context(&self, params: Parameters<SlotsContextParams>) -> Result<CallToolResult, McpError> {
        slots_context_impl(&self.manager, params.0).await
    }

    #[tool(description = "Record or replace a booked appointment so warming and slot planning include it.")]
    async fn record_appointment(
        &self, params: Parameters<RecordAppointmentParams>,
    ) -> Result<CallToolResult, McpError> {
        record_appointment_impl(&self.manager, &self.store, params.0).await
    }

    #[tool(description = "Cache hit rates, tier usage and connectivity, warming state and the last warm run.")]
    async fn cache_stats(&self) -> Result<CallToolResult, McpError> {
        stats_impl(&self.manager).await
    }

    #[tool(description = "Invalidate cache entries by key prefix (e.g. \"geo:\") and/or purge expired entries.")]
    async fn cache_invalidate(&self, params: Parameters<CacheInvalidateParams>) -> Result<CallToolResult, McpError> {
        invalidate_impl(&self.manager, params.0).await
    }

    #[tool(description = "Run one cache warming pass now: geocode upcoming and frequent addresses, then routes and clusters.")]
    async fn warm_caches(&self) -> Result<CallToolResult, McpError> {
        warm_impl(&self.manager).await
    }
}

impl ServerHandler for FieldrouteServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "fieldroute".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::manager;

    #[tokio::test]
    async fn test_all_tools_registered() {
        let (manager, store) = manager().await;
        let server = FieldrouteServer::new(manager, store);

        let mut names: Vec<String> = server.tool_router.list_all().into_iter().map(|t| t.name.to_string()).collect();
        names.sort();

        assert_eq!(
            names,
            vec![
                "cache_invalidate",
                "cache_stats",
                "optimize_route",
                "record_appointment",
                "slots_context",
                "validate_address",
                "validate_addresses",
                "warm_caches",
            ]
        );
    }
}
