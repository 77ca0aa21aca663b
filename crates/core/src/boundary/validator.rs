//! Postal, geocoded and merged boundary checks.

use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::area::{PostalCode, ServiceArea};
use crate::Error;
use crate::batch::run_batched;
use crate::cache::TwoTierCache;
use crate::geocode::{Address, GeocodeResult, GeocodingCache};
use crate::store::BookingStore;

/// Namespace of cached validation results.
pub const BOUNDARY_NAMESPACE: &str = "boundary";

/// Confidence of a postal-code verdict, inside or outside.
pub const POSTAL_CODE_CONFIDENCE: u8 = 85;

/// Below this the geocoded check runs; at or above it a geocoded
/// agreement is treated as certain.
pub const HIGH_CONFIDENCE_THRESHOLD: u8 = 90;

/// Confidence of a geocoded verdict from a precise match.
pub const GEOCODING_CONFIDENCE: u8 = 90;

/// Confidence of a geocoded verdict from an approximate match.
pub const APPROXIMATE_GEOCODING_CONFIDENCE: u8 = 60;

pub const AGREEMENT_CONFIDENCE: u8 = 100;

pub const DISAGREEMENT_CONFIDENCE: u8 = 75;

/// Which check produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMethod {
    PostalCode,
    Geocoding,
    Cache,
}

/// Verdict on whether an address is inside a service area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationResult {
    pub valid: bool,
    pub service_area_id: Option<String>,
    /// 0..=100
    pub confidence: u8,
    pub method: ValidationMethod,
    pub message: String,
}

/// Range check of a postal code against every area.
pub fn check_postal_code(areas: &[ServiceArea], postal_code: &str) -> ValidationResult {
    let Some(code) = PostalCode::parse(postal_code) else {
        return ValidationResult {
            valid: false,
            service_area_id: None,
            confidence: 0,
            method: ValidationMethod::PostalCode,
            message: format!("postal code {postal_code:?} not recognised"),
        };
    };

    match areas.iter().find(|area| area.covers_postal_code(&code)) {
        Some(area) => ValidationResult {
            valid: true,
            service_area_id: Some(area.id.clone()),
            confidence: POSTAL_CODE_CONFIDENCE,
            method: ValidationMethod::PostalCode,
            message: format!("postal code {} is served by {}", code.canonical(), area.name),
        },
        None => ValidationResult {
            valid: false,
            service_area_id: None,
            confidence: POSTAL_CODE_CONFIDENCE,
            method: ValidationMethod::PostalCode,
            message: format!("postal code {} is outside every service area", code.canonical()),
        },
    }
}

/// Region check of a geocoded address against every area.
pub fn check_geocoded(areas: &[ServiceArea], geocoded: &GeocodeResult) -> ValidationResult {
    let confidence = if geocoded.accuracy.is_precise() {
        GEOCODING_CONFIDENCE
    } else {
        APPROXIMATE_GEOCODING_CONFIDENCE
    };

    match areas.iter().find(|area| area.matches_formatted_address(&geocoded.formatted_address)) {
        Some(area) => ValidationResult {
            valid: true,
            service_area_id: Some(area.id.clone()),
            confidence,
            method: ValidationMethod::Geocoding,
            message: format!("geocoded into {}", area.name),
        },
        None => ValidationResult {
            valid: false,
            service_area_id: None,
            confidence,
            method: ValidationMethod::Geocoding,
            message: format!("{} is outside every service area", geocoded.formatted_address),
        },
    }
}

/// Combine the postal and geocoded verdicts.
///
/// On disagreement geocoding wins, capped at [`DISAGREEMENT_CONFIDENCE`] and
/// never above its own confidence.
pub fn merge_results(postal: ValidationResult, geocoded: Option<ValidationResult>) -> ValidationResult {
    let Some(geocoded) = geocoded else {
        return postal;
    };

    if postal.valid != geocoded.valid {
        return ValidationResult {
            confidence: DISAGREEMENT_CONFIDENCE.min(geocoded.confidence),
            message: format!("{} (postal code check disagreed)", geocoded.message),
            ..geocoded
        };
    }

    let service_area_id = geocoded.service_area_id.clone().or(postal.service_area_id);
    if geocoded.confidence >= HIGH_CONFIDENCE_THRESHOLD {
        return ValidationResult {
            valid: geocoded.valid,
            service_area_id,
            confidence: AGREEMENT_CONFIDENCE,
            method: ValidationMethod::Geocoding,
            message: format!("{} (confirmed by postal code)", geocoded.message),
        };
    }

    let mean = (u16::from(postal.confidence) + u16::from(geocoded.confidence)).div_ceil(2);
    ValidationResult {
        valid: postal.valid && geocoded.valid,
        service_area_id,
        confidence: mean.min(100) as u8,
        method: ValidationMethod::Geocoding,
        message: geocoded.message,
    }
}

/// Validates addresses against the configured service areas.
pub struct BoundaryValidator {
    cache: Arc<TwoTierCache>,
    geocoding: Arc<GeocodingCache>,
    store: Arc<dyn BookingStore>,
    batch_size: usize,
    batch_delay: Duration,
}

impl BoundaryValidator {
    pub fn new(cache: Arc<TwoTierCache>, geocoding: Arc<GeocodingCache>, store: Arc<dyn BookingStore>) -> Self {
        Self { cache, geocoding, store, batch_size: 5, batch_delay: Duration::ZERO }
    }

    pub fn with_batching(mut self, batch_size: usize, batch_delay: Duration) -> Self {
        self.batch_size = batch_size;
        self.batch_delay = batch_delay;
        self
    }

    /// Validate one address. A blank address is an input error.
    pub async fn validate_address(&self, address: &Address) -> Result<ValidationResult, Error> {
        address.validate()?;
        let areas = self.store.service_areas().await?;
        Ok(self.validate_with_areas(address, &areas).await)
    }

    /// Validate several addresses with the same rule as [`Self::validate_address`].
    ///
    /// Results are aligned with `addresses`.
    pub async fn validate_batch(&self, addresses: &[Address]) -> Result<Vec<Result<ValidationResult, Error>>, Error> {
        let areas = self.store.service_areas().await?;
        let areas = &areas;
        let results = run_batched(addresses.to_vec(), self.batch_size, self.batch_delay, |address| async move {
            address.validate()?;
            Ok::<_, Error>(self.validate_with_areas(&address, areas).await)
        })
        .await;
        Ok(results)
    }

    async fn validate_with_areas(&self, address: &Address, areas: &[ServiceArea]) -> ValidationResult {
        let key = address.cache_key(BOUNDARY_NAMESPACE);
        if let Some(cached) = self.cache.get_json::<ValidationResult>(&key).await {
            return ValidationResult { method: ValidationMethod::Cache, ..cached };
        }

        let postal = check_postal_code(areas, &address.postal_code);

        let geocoded = if postal.confidence < HIGH_CONFIDENCE_THRESHOLD {
            match self.geocoding.resolve(address).await {
                Ok(result) => Some(check_geocoded(areas, &result)),
                Err(e) => {
                    tracing::warn!(error = %e, "geocoding unavailable for boundary check, using postal code only");
                    None
                }
            }
        } else {
            None
        };

        let settled = geocoded.is_some() || postal.confidence >= HIGH_CONFIDENCE_THRESHOLD;
        let merged = merge_results(postal, geocoded);

        if settled && let Err(e) = self.cache.set_json(&key, &merged, None).await {
            tracing::warn!(error = %e, "failed to cache boundary result");
        }

        tracing::debug!(valid = merged.valid, confidence = merged.confidence, "validated address");
        merged
    }
}
