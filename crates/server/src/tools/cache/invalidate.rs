//! cache_invalidate tool implementation.
//!
//! Drops entries by key prefix, or purges expired persistent entries.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use fieldroute_core::{CacheManager, Error};

use crate::tools::json_result;

/// Parameters for the cache_invalidate tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheInvalidateParams {
    /// Drop every entry whose key starts with this prefix, e.g. "geo:" or
    /// "cluster:limburg-south:".
    #[serde(default)]
    pub prefix: Option<String>,

    /// Purge expired entries from the shared tier.
    #[serde(default)]
    pub expired: bool,
}

/// Output from the cache_invalidate tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheInvalidateOutput {
    /// Number of entries deleted.
    pub deleted: u64,
}

/// Implementation of the cache_invalidate tool.
pub async fn invalidate_impl(manager: &CacheManager, params: CacheInvalidateParams) -> Result<CallToolResult, McpError> {
    let prefix = params.prefix.as_deref().map(str::trim).filter(|p| !p.is_empty());
    if prefix.is_none() && !params.expired {
        return Err(Error::InvalidInput("At least one of prefix or expired must be specified".to_string()).into());
    }

    let mut deleted = 0u64;

    if let Some(prefix) = prefix {
        deleted += manager.invalidate(prefix).await;
        tracing::info!(prefix, deleted, "cache entries invalidated");
    }

    if params.expired {
        deleted += manager.purge_expired().await;
    }

    json_result(&CacheInvalidateOutput { deleted })
}
