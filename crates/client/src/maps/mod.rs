//! Maps API client.
//!
//! Provides a client for the provider's geocoding and directions endpoints
//! with rate limiting, request validation, and response normalization.
//!
//! ### API
//!
//! - **Endpoints**: `{base}/geocode/json` and `{base}/directions/json`
//! - **Authentication**: `key` query parameter.
//! - **Rate Limiting**: minimum spacing between requests (default 50ms).
//! - **Errors**: HTTP and body statuses map onto [`MapsError`], which converts
//!   into the core `ProviderError` so callers can take their fallback path.

pub mod error;
pub mod request;
pub mod response;

pub use error::MapsError;
pub use response::{DirectionsApiResponse, GeocodeApiResponse};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;

use fieldroute_core::config::ProviderSettings;
use fieldroute_core::geocode::GeocodeResult;
use fieldroute_core::route::{RouteRequest, RouteResult};
use fieldroute_core::{MapsProvider, ProviderError};

/// Default base URL for the maps API.
const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = "fieldroute/0.1";

/// Default minimum interval between requests.
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(50);

/// Maps API client configuration.
#[derive(Debug, Clone)]
pub struct MapsConfig {
    /// API key from FIELDROUTE_MAPS_API_KEY.
    pub api_key: String,
    /// Base URL (default: https://maps.googleapis.com/maps/api).
    pub base_url: String,
    /// Request timeout (default: 10s).
    pub timeout: Duration,
    pub user_agent: String,
    /// Minimum spacing between requests (default: 50ms).
    pub min_interval: Duration,
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            min_interval: DEFAULT_MIN_INTERVAL,
        }
    }
}

impl MapsConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads FIELDROUTE_MAPS_API_KEY from environment. Returns error if not set.
    pub fn from_env() -> Result<Self, MapsError> {
        let api_key = std::env::var("FIELDROUTE_MAPS_API_KEY").map_err(|_| MapsError::MissingApiKey)?;

        Ok(Self { api_key, ..Default::default() })
    }

    /// Build from the loaded application settings.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, MapsError> {
        let api_key = settings
            .maps_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(MapsError::MissingApiKey)?;

        Ok(Self {
            api_key,
            base_url: settings.maps_base_url.trim_end_matches('/').to_string(),
            timeout: settings.timeout(),
            user_agent: settings.user_agent.clone(),
            min_interval: Duration::from_millis(settings.min_request_interval_ms),
        })
    }
}

/// Rate limiter to enforce request intervals.
#[derive(Debug)]
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self { last_request: Mutex::new(None), min_interval }
    }

    /// Acquire permission to make a request, waiting if necessary.
    async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Maps API client.
#[derive(Debug, Clone)]
pub struct MapsClient {
    http: reqwest::Client,
    config: MapsConfig,
    rate_limiter: Arc<RateLimiter>,
}

impl MapsClient {
    /// Create a new client with the given configuration.
    pub fn new(config: MapsConfig) -> Result<Self, MapsError> {
        if config.api_key.is_empty() {
            return Err(MapsError::MissingApiKey);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MapsError::Network(Arc::new(e)))?;

        let rate_limiter = Arc::new(RateLimiter::new(config.min_interval));
        Ok(Self { http, config, rate_limiter })
    }

    /// Create a new client from environment variables.
    pub fn from_env() -> Result<Self, MapsError> {
        Self::new(MapsConfig::from_env()?)
    }

    /// Resolve an address query to its best match.
    pub async fn geocode(&self, query: &str) -> Result<GeocodeResult, MapsError> {
        let params = request::geocode_params(query)?;
        let start = Instant::now();

        let raw: GeocodeApiResponse = self.get_json("geocode/json", &params).await?;
        let result = raw.into_result();

        tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, ok = result.is_ok(), "geocode completed");
        result
    }

    /// Compute a route for the request.
    pub async fn directions(&self, req: &RouteRequest) -> Result<RouteResult, MapsError> {
        let params = request::directions_params(req)?;
        let start = Instant::now();

        let raw: DirectionsApiResponse = self.get_json("directions/json", &params).await?;
        let result = raw.into_result(req);

        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            waypoints = req.waypoints.len(),
            ok = result.is_ok(),
            "directions completed"
        );
        result
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T, MapsError> {
        self.rate_limiter.acquire().await;

        let url = format!("{}/{path}", self.config.base_url);
        tracing::debug!("calling maps API: {url}");

        let http_response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .header(header::USER_AGENT, &self.config.user_agent)
            .query(params)
            .query(&[("key", self.config.api_key.as_str())])
            .send()
            .await?;

        let status = http_response.status();
        tracing::debug!("maps API response status: {}", status);

        if status == 401 || status == 403 {
            return Err(MapsError::AuthError(format!("HTTP {}", status.as_u16())));
        }

        if status == 429 {
            return Err(MapsError::RateLimited);
        }

        if status.is_client_error() || status.is_server_error() {
            return Err(MapsError::HttpError { status: status.as_u16() });
        }

        let bytes = http_response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| MapsError::Parse(e.to_string()))
    }
}

#[async_trait]
impl MapsProvider for MapsClient {
    async fn geocode(&self, query: &str) -> Result<GeocodeResult, ProviderError> {
        Ok(MapsClient::geocode(self, query).await?)
    }

    async fn compute_route(&self, request: &RouteRequest) -> Result<RouteResult, ProviderError> {
        Ok(self.directions(request).await?)
    }
}
