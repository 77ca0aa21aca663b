//! fieldroute server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

use fieldroute_client::{MapsClient, MapsConfig};
use fieldroute_core::cache::{MemoryTier, NamespacePolicy, PersistentStore};
use fieldroute_core::provider::UnavailableProvider;
use fieldroute_core::store::MemoryStore;
use fieldroute_core::{AppConfig, CacheDb, CacheManager, MapsProvider, TwoTierCache};

mod error;
mod handler;
mod tools;

/// Open the shared tier, or run in-process only when it is disabled or broken.
async fn open_cache(config: &AppConfig) -> TwoTierCache {
    let settings = &config.cache;
    let memory = MemoryTier::new(settings.memory_max_entries, settings.memory_max_bytes);

    let persistent: Option<Arc<dyn PersistentStore>> = if !settings.persistent_enabled {
        tracing::info!("persistent cache disabled, using in-process cache only");
        None
    } else {
        match CacheDb::open(&settings.db_path).await {
            Ok(db) => {
                tracing::info!(path = %settings.db_path.display(), "persistent cache opened");
                Some(Arc::new(db))
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %settings.db_path.display(), "persistent cache unavailable, using in-process cache only");
                None
            }
        }
    };

    TwoTierCache::new(memory, persistent)
        .with_persistent_timeout(settings.persistent_timeout())
        .with_default_policy(NamespacePolicy { size_threshold: settings.compression_threshold, ..Default::default() })
}

fn build_provider(config: &AppConfig) -> Arc<dyn MapsProvider> {
    if let Err(e) = config.require_maps_api_key() {
        tracing::warn!(error = %e, "no maps provider, every lookup takes its fallback path");
        return Arc::new(UnavailableProvider::new(e.to_string()));
    }

    match MapsConfig::from_settings(&config.provider).and_then(MapsClient::new) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!(error = %e, "maps client could not be built, every lookup takes its fallback path");
            Arc::new(UnavailableProvider::new(e.to_string()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    tracing::info!("Starting fieldroute server on stdio transport");

    let config = AppConfig::load()?;
    let cache = Arc::new(open_cache(&config).await);
    let provider = build_provider(&config);
    let store = Arc::new(MemoryStore::new(config.service_areas.clone()));

    let manager = Arc::new(CacheManager::build(&config, cache, provider, store.clone()).await?);
    let _warming = manager.clone().spawn();

    let handler = handler::FieldrouteServer::new(manager, store);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
