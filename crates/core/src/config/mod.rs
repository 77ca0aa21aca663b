//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (FIELDROUTE_*, nested keys split on `__`)
//! 2. TOML config file (if FIELDROUTE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::boundary::{BOUNDARY_NAMESPACE, ServiceArea};
use crate::cache::NamespacePolicy;
use crate::geocode::{GEO_NAMESPACE, PLACE_NAMESPACE};
use crate::route::{CLUSTER_NAMESPACE, MATRIX_NAMESPACE, ROUTE_NAMESPACE, ROUTE_OPT_NAMESPACE, ROUTE_TRAFFIC_NAMESPACE};

mod validation;

pub use validation::ConfigError;

const HOUR: u64 = 3600;
const DAY: u64 = 24 * HOUR;

/// Mapping provider connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Provider API key. Without one every provider call fails over to the
    /// heuristic and postal-code paths.
    ///
    /// Set via FIELDROUTE_PROVIDER__MAPS_API_KEY or FIELDROUTE_MAPS_API_KEY.
    pub maps_api_key: Option<String>,

    pub maps_base_url: String,

    /// HTTP request timeout in milliseconds.
    pub timeout_ms: u64,

    /// Minimum spacing between provider requests in milliseconds.
    pub min_request_interval_ms: u64,

    pub user_agent: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            maps_api_key: None,
            maps_base_url: "https://maps.googleapis.com/maps/api".into(),
            timeout_ms: 10_000,
            min_request_interval_ms: 50,
            user_agent: "fieldroute/0.1".into(),
        }
    }
}

impl ProviderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Per-namespace TTLs in seconds. `None` keeps entries until invalidated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceTtls {
    pub route_secs: u64,
    pub route_traffic_secs: u64,
    pub route_opt_secs: u64,
    pub matrix_secs: u64,
    pub cluster_secs: u64,
    pub boundary_secs: u64,
    pub geo_secs: u64,
    pub place_secs: Option<u64>,
}

impl Default for NamespaceTtls {
    fn default() -> Self {
        Self {
            route_secs: 7 * DAY,
            route_traffic_secs: HOUR,
            route_opt_secs: DAY,
            matrix_secs: DAY,
            cluster_secs: 12 * HOUR,
            boundary_secs: DAY,
            geo_secs: 30 * DAY,
            place_secs: None,
        }
    }
}

/// Two-tier cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Path to the shared SQLite cache database.
    pub db_path: PathBuf,

    /// Use the shared tier at all; off means in-process only.
    pub persistent_enabled: bool,

    pub memory_max_entries: usize,

    pub memory_max_bytes: usize,

    /// Bound on each persistent-tier operation in milliseconds.
    pub persistent_timeout_ms: u64,

    /// Payloads above this many bytes are stored compressed.
    pub compression_threshold: usize,

    pub ttl: NamespaceTtls,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./fieldroute-cache.sqlite"),
            persistent_enabled: true,
            memory_max_entries: 10_000,
            memory_max_bytes: 64 * 1024 * 1024,
            persistent_timeout_ms: 500,
            compression_threshold: 4096,
            ttl: NamespaceTtls::default(),
        }
    }
}

impl CacheSettings {
    pub fn persistent_timeout(&self) -> Duration {
        Duration::from_millis(self.persistent_timeout_ms)
    }

    /// Policy for every namespace the services write to.
    pub fn namespace_policies(&self) -> Vec<(&'static str, NamespacePolicy)> {
        let threshold = self.compression_threshold;
        let ttl = &self.ttl;
        vec![
            (ROUTE_NAMESPACE, NamespacePolicy::new(ttl.route_secs, threshold)),
            (ROUTE_TRAFFIC_NAMESPACE, NamespacePolicy::new(ttl.route_traffic_secs, threshold)),
            (ROUTE_OPT_NAMESPACE, NamespacePolicy::new(ttl.route_opt_secs, threshold)),
            (MATRIX_NAMESPACE, NamespacePolicy::new(ttl.matrix_secs, threshold)),
            (CLUSTER_NAMESPACE, NamespacePolicy::new(ttl.cluster_secs, threshold)),
            (BOUNDARY_NAMESPACE, NamespacePolicy::new(ttl.boundary_secs, threshold)),
            (GEO_NAMESPACE, NamespacePolicy::new(ttl.geo_secs, threshold)),
            (PLACE_NAMESPACE, NamespacePolicy { ttl_secs: ttl.place_secs, size_threshold: threshold }),
        ]
    }
}

/// Background warming settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmingSettings {
    pub enabled: bool,

    /// Hours between periodic warm runs.
    pub interval_hours: u64,

    /// Local wall-clock times ("07:00") that trigger an extra run.
    pub peak_times: Vec<String>,

    /// How far ahead appointments are considered, in days.
    pub lookahead_days: u32,

    /// How many days ahead route clusters are pre-built.
    pub cluster_days: u32,

    pub batch_size: usize,

    pub batch_delay_ms: u64,

    pub frequent_address_cap: usize,

    pub frequent_route_cap: usize,

    pub ungeocoded_limit: usize,

    pub postal_prefix_limit: usize,
}

impl Default for WarmingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: 4,
            peak_times: vec!["07:00".into(), "12:00".into()],
            lookahead_days: 7,
            cluster_days: 2,
            batch_size: 5,
            batch_delay_ms: 200,
            frequent_address_cap: 1000,
            frequent_route_cap: 100,
            ungeocoded_limit: 100,
            postal_prefix_limit: 50,
        }
    }
}

impl WarmingSettings {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours * HOUR)
    }

    /// Parsed peak times.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for an entry that is not `HH:MM` or `HH:MM:SS`.
    pub fn parsed_peak_times(&self) -> Result<Vec<NaiveTime>, ConfigError> {
        self.peak_times
            .iter()
            .map(|raw| {
                NaiveTime::parse_from_str(raw, "%H:%M")
                    .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
                    .map_err(|e| ConfigError::Invalid {
                        field: "warming.peak_times".into(),
                        reason: format!("{raw:?}: {e}"),
                    })
            })
            .collect()
    }
}

/// Route optimizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    /// Service time assumed per stop when scoring efficiency.
    pub service_minutes_per_stop: u32,

    /// Slack added between consecutive stops when planning time windows.
    pub buffer_minutes: u32,

    /// Hour of day (0-23) the first stop's travel starts from.
    pub day_start_hour: u32,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self { service_minutes_per_stop: 45, buffer_minutes: 15, day_start_hour: 8 }
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (FIELDROUTE_*)
/// 2. TOML config file (if FIELDROUTE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub warming: WarmingSettings,

    #[serde(default)]
    pub optimizer: OptimizerSettings,

    /// Served regions. Usually supplied by the TOML file.
    #[serde(default)]
    pub service_areas: Vec<ServiceArea>,
}

impl AppConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `FIELDROUTE_`
    /// 2. TOML file from `FIELDROUTE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("FIELDROUTE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("FIELDROUTE_")
                .ignore(&["CONFIG_FILE", "MAPS_API_KEY"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let mut config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        if config.provider.maps_api_key.is_none()
            && let Ok(key) = std::env::var("FIELDROUTE_MAPS_API_KEY")
            && !key.trim().is_empty()
        {
            config.provider.maps_api_key = Some(key);
        }

        config.validate()?;

        Ok(config)
    }

    /// Check if the maps API key is available (for deferred validation).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the maps API key is not set.
    pub fn require_maps_api_key(&self) -> Result<&str, ConfigError> {
        self.provider
            .maps_api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing {
                field: "provider.maps_api_key".into(),
                hint: "Set FIELDROUTE_MAPS_API_KEY environment variable".into(),
            })
    }
}
