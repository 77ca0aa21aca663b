//! MCP tool implementations.
//!
//! This module contains all tools exposed by the fieldroute server.

pub mod appointment;
pub mod cache;
pub mod optimize_route;
pub mod slots_context;
pub mod validate;

pub use appointment::{RecordAppointmentParams, record_appointment_impl};
pub use optimize_route::{OptimizeRouteParams, optimize_route_impl};
pub use slots_context::{SlotsContextParams, slots_context_impl};
pub use validate::{ValidateAddressParams, ValidateAddressesParams, validate_address_impl, validate_addresses_impl};

use chrono::NaiveDate;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use crate::error::ToolError;

/// Pretty JSON text content, the shape every tool answers with.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| ToolError::Serialization(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// A calendar date given as YYYY-MM-DD.
pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, ToolError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| ToolError::InvalidInput(format!("date must be YYYY-MM-DD, got {raw:?}: {e}")))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use fieldroute_core::boundary::{PostalRange, ServiceArea};
    use fieldroute_core::provider::UnavailableProvider;
    use fieldroute_core::store::MemoryStore;
    use fieldroute_core::{AppConfig, CacheManager, GeoPoint, TwoTierCache};
    use rmcp::model::CallToolResult;

    pub fn sample_area() -> ServiceArea {
        ServiceArea {
            id: "limburg-south".into(),
            name: "South Limburg".into(),
            region_marker: "Limburg".into(),
            centroid: GeoPoint { lat: 50.85, lng: 5.69 },
            postal_ranges: vec![PostalRange::new(5800, 6999)],
        }
    }

    /// A manager with no provider, an in-process cache and one service area.
    pub async fn manager() -> (Arc<CacheManager>, Arc<MemoryStore>) {
        let mut config = AppConfig::default();
        config.warming.batch_delay_ms = 0;
        config.warming.enabled = false;

        let cache = Arc::new(TwoTierCache::memory_only(1000, 4 * 1024 * 1024));
        let store = Arc::new(MemoryStore::new(vec![sample_area()]));
        let provider = Arc::new(UnavailableProvider::new("tests"));
        let manager = CacheManager::build(&config, cache, provider, store.clone()).await.unwrap();
        (Arc::new(manager), store)
    }

    /// The JSON payload of a successful tool call.
    pub fn output_json(result: &CallToolResult) -> serde_json::Value {
        let content_val = serde_json::to_value(&result.content[0]).unwrap();
        let text = content_val
            .get("text")
            .and_then(|v| v.as_str())
            .expect("Expected text field in content");
        serde_json::from_str(text).unwrap()
    }
}
