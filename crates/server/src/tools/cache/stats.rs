//! cache_stats tool implementation.
//!
//! Reports hit rates, tier usage, warming state and the last warm run.

use rmcp::{ErrorData as McpError, model::CallToolResult};

use fieldroute_core::CacheManager;

use crate::tools::json_result;

/// Implementation of the cache_stats tool.
pub async fn stats_impl(manager: &CacheManager) -> Result<CallToolResult, McpError> {
    let health = manager.health().await;
    json_result(&health)
}
