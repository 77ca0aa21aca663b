//! Boundary to the external mapping/geocoding provider.
//!
//! The provider is a black box with quota limits and transient failures.
//! Every failure mode is one of the [`ProviderError`] variants and is absorbed
//! by the caller's fallback path.

use async_trait::async_trait;

use crate::geocode::GeocodeResult;
use crate::route::{RouteRequest, RouteResult};

/// Failures reported by the mapping provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Too many requests in the current window.
    #[error("rate limited")]
    RateLimited,

    /// Daily or billing quota exhausted.
    #[error("quota exceeded")]
    QuotaExceeded,

    /// The provider answered but found nothing for the query.
    #[error("no results")]
    NoResults,

    /// No provider is configured for this process.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Any other provider failure (network, HTTP status, malformed response).
    #[error("provider failure: {0}")]
    Provider(String),
}

/// Geocoding and routing operations consumed from the provider.
#[async_trait]
pub trait MapsProvider: Send + Sync {
    /// Resolve a free-form address query to a single best match.
    async fn geocode(&self, query: &str) -> Result<GeocodeResult, ProviderError>;

    /// Compute a route, reordering waypoints when `request.optimize` is set.
    async fn compute_route(&self, request: &RouteRequest) -> Result<RouteResult, ProviderError>;
}

/// Provider used when no API key is configured.
///
/// Every call fails, so callers always take their degraded path.
#[derive(Debug, Clone)]
pub struct UnavailableProvider {
    reason: String,
}

impl UnavailableProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl MapsProvider for UnavailableProvider {
    async fn geocode(&self, _query: &str) -> Result<GeocodeResult, ProviderError> {
        Err(ProviderError::Unavailable(self.reason.clone()))
    }

    async fn compute_route(&self, _request: &RouteRequest) -> Result<RouteResult, ProviderError> {
        Err(ProviderError::Unavailable(self.reason.clone()))
    }
}
