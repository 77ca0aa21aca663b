//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use std::collections::HashSet;

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `provider.timeout_ms` is below 100ms or above 5 minutes
    /// - in-process cache limits are 0
    /// - `warming.batch_size` or `warming.interval_hours` is 0
    /// - a peak time does not parse or `optimizer.day_start_hour` is above 23
    /// - a service area has an empty id, a bad centroid or an inverted postal range
    /// - two service areas share an id
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.timeout_ms < 100 {
            return Err(invalid("provider.timeout_ms", "must be at least 100ms"));
        }
        if self.provider.timeout_ms > 300_000 {
            return Err(invalid("provider.timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }
        if self.provider.maps_base_url.trim().is_empty() {
            return Err(invalid("provider.maps_base_url", "must not be empty"));
        }

        if self.cache.memory_max_entries == 0 {
            return Err(invalid("cache.memory_max_entries", "must be greater than 0"));
        }
        if self.cache.memory_max_bytes == 0 {
            return Err(invalid("cache.memory_max_bytes", "must be greater than 0"));
        }
        if self.cache.persistent_timeout_ms == 0 {
            return Err(invalid("cache.persistent_timeout_ms", "must be greater than 0"));
        }

        if self.warming.batch_size == 0 {
            return Err(invalid("warming.batch_size", "must be greater than 0"));
        }
        if self.warming.interval_hours == 0 {
            return Err(invalid("warming.interval_hours", "must be at least 1 hour"));
        }
        self.warming.parsed_peak_times()?;

        if self.optimizer.day_start_hour > 23 {
            return Err(invalid("optimizer.day_start_hour", "must be between 0 and 23"));
        }

        let mut ids = HashSet::new();
        for area in &self.service_areas {
            if area.id.trim().is_empty() {
                return Err(invalid("service_areas.id", "must not be empty"));
            }
            if !ids.insert(area.id.as_str()) {
                return Err(invalid("service_areas.id", format!("duplicate id {:?}", area.id)));
            }
            area.centroid
                .validate()
                .map_err(|e| invalid("service_areas.centroid", e.to_string()))?;
            if let Some(range) = area.postal_ranges.iter().find(|r| r.start > r.end) {
                return Err(invalid(
                    "service_areas.postal_ranges",
                    format!("{}: start {} is after end {}", area.id, range.start, range.end),
                ));
            }
            if area.region_marker.trim().is_empty() {
                tracing::warn!(area = %area.id, "service area has no region marker; geocoded checks will never match it");
            }
        }

        if self.service_areas.is_empty() {
            tracing::warn!("no service areas configured; every address will validate as outside");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{PostalRange, ServiceArea};
    use crate::config::{CacheSettings, ProviderSettings, WarmingSettings};
    use crate::geo::GeoPoint;

    fn area(id: &str) -> ServiceArea {
        ServiceArea {
            id: id.into(),
            name: id.into(),
            region_marker: "Limburg".into(),
            centroid: GeoPoint { lat: 50.85, lng: 5.69 },
            postal_ranges: vec![PostalRange::new(5800, 6999)],
        }
    }

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_timeout_bounds() {
        let low = AppConfig {
            provider: ProviderSettings { timeout_ms: 50, ..Default::default() },
            ..Default::default()
        };
        assert!(matches!(low.validate(), Err(ConfigError::Invalid { field, .. }) if field == "provider.timeout_ms"));

        let high = AppConfig {
            provider: ProviderSettings { timeout_ms: 301_000, ..Default::default() },
            ..Default::default()
        };
        assert!(matches!(high.validate(), Err(ConfigError::Invalid { field, .. }) if field == "provider.timeout_ms"));
    }

    #[test]
    fn test_validate_memory_limits() {
        let config = AppConfig {
            cache: CacheSettings { memory_max_bytes: 0, ..Default::default() },
            ..Default::default()
        };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "cache.memory_max_bytes"));
    }

    #[test]
    fn test_validate_batch_size_zero() {
        let config = AppConfig {
            warming: WarmingSettings { batch_size: 0, ..Default::default() },
            ..Default::default()
        };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "warming.batch_size"));
    }

    #[test]
    fn test_validate_bad_peak_time() {
        let config = AppConfig {
            warming: WarmingSettings { peak_times: vec!["25:00".into()], ..Default::default() },
            ..Default::default()
        };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "warming.peak_times"));
    }

    #[test]
    fn test_validate_duplicate_area_ids() {
        let config = AppConfig { service_areas: vec![area("south"), area("south")], ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_inverted_postal_range() {
        let mut bad = area("south");
        bad.postal_ranges = vec![PostalRange::new(6999, 5800)];
        let config = AppConfig { service_areas: vec![bad], ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "service_areas.postal_ranges"));
    }

    #[test]
    fn test_validate_bad_centroid() {
        let mut bad = area("south");
        bad.centroid = GeoPoint { lat: 120.0, lng: 0.0 };
        let config = AppConfig { service_areas: vec![bad], ..Default::default() };
        assert!(config.validate().is_err());
    }
}
