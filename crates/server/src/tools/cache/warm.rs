//! warm_caches tool implementation.
//!
//! Runs one geocoding and route warm pass immediately.

use rmcp::{ErrorData as McpError, model::CallToolResult};

use fieldroute_core::CacheManager;

use crate::tools::json_result;

/// Implementation of the warm_caches tool.
pub async fn warm_impl(manager: &CacheManager) -> Result<CallToolResult, McpError> {
    let summary = manager.warm_all().await;
    json_result(&summary)
}
