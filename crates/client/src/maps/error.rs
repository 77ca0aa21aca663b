//! Maps API client error types.

use std::sync::Arc;

use fieldroute_core::ProviderError;

/// Errors from the maps API client.
#[derive(Debug, thiserror::Error)]
pub enum MapsError {
    /// No API key configured.
    #[error("missing API key: FIELDROUTE_MAPS_API_KEY not set")]
    MissingApiKey,

    /// The request was rejected before it was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication failed (invalid or restricted API key).
    #[error("authentication failed: {0}")]
    AuthError(String),

    /// Too many requests in the current window.
    #[error("rate limited: too many requests")]
    RateLimited,

    /// Daily or billing quota exhausted.
    #[error("quota exceeded")]
    QuotaExceeded,

    /// The API found nothing for the query.
    #[error("no results")]
    NoResults,

    /// The API answered with a non-OK status we do not map specifically.
    #[error("API status {status}: {message}")]
    ApiStatus { status: String, message: String },

    /// HTTP error response.
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),
}

impl MapsError {
    /// Map an API body status to an error. `OK` is not an error.
    pub fn from_status(status: &str, message: Option<String>) -> Option<Self> {
        let message = message.unwrap_or_default();
        match status {
            "OK" => None,
            "ZERO_RESULTS" | "NOT_FOUND" => Some(MapsError::NoResults),
            "OVER_QUERY_LIMIT" => Some(MapsError::RateLimited),
            "OVER_DAILY_LIMIT" => Some(MapsError::QuotaExceeded),
            "REQUEST_DENIED" => Some(MapsError::AuthError(message)),
            "INVALID_REQUEST" | "MAX_WAYPOINTS_EXCEEDED" | "MAX_ROUTE_LENGTH_EXCEEDED" => {
                Some(MapsError::InvalidRequest(format!("{status}: {message}")))
            }
            other => Some(MapsError::ApiStatus { status: other.to_string(), message }),
        }
    }
}

impl From<reqwest::Error> for MapsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { MapsError::Timeout } else { MapsError::Network(Arc::new(err)) }
    }
}

impl From<MapsError> for ProviderError {
    fn from(err: MapsError) -> Self {
        match err {
            MapsError::RateLimited => ProviderError::RateLimited,
            MapsError::QuotaExceeded => ProviderError::QuotaExceeded,
            MapsError::NoResults => ProviderError::NoResults,
            MapsError::MissingApiKey => ProviderError::Unavailable("no maps API key configured".into()),
            other => ProviderError::Provider(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MapsError::MissingApiKey;
        assert!(err.to_string().contains("API key"));

        let err = MapsError::InvalidRequest("empty address".to_string());
        assert!(err.to_string().contains("invalid request"));
    }

    #[test]
    fn test_status_mapping() {
        assert!(MapsError::from_status("OK", None).is_none());
        assert!(matches!(MapsError::from_status("ZERO_RESULTS", None), Some(MapsError::NoResults)));
        assert!(matches!(MapsError::from_status("OVER_QUERY_LIMIT", None), Some(MapsError::RateLimited)));
        assert!(matches!(MapsError::from_status("OVER_DAILY_LIMIT", None), Some(MapsError::QuotaExceeded)));
        assert!(matches!(
            MapsError::from_status("REQUEST_DENIED", Some("key restricted".into())),
            Some(MapsError::AuthError(msg)) if msg == "key restricted"
        ));
        assert!(matches!(MapsError::from_status("UNKNOWN_ERROR", None), Some(MapsError::ApiStatus { .. })));
    }

    #[test]
    fn test_provider_error_conversion() {
        assert_eq!(ProviderError::from(MapsError::RateLimited), ProviderError::RateLimited);
        assert_eq!(ProviderError::from(MapsError::QuotaExceeded), ProviderError::QuotaExceeded);
        assert_eq!(ProviderError::from(MapsError::NoResults), ProviderError::NoResults);
        assert!(matches!(ProviderError::from(MapsError::MissingApiKey), ProviderError::Unavailable(_)));
        assert!(matches!(ProviderError::from(MapsError::HttpError { status: 502 }), ProviderError::Provider(_)));
    }
}
