//! Unified error types for fieldroute.
//!
//! Only input and contract errors are meant to cross component boundaries.
//! Transient provider failures are absorbed by the fallback paths and
//! persistent-tier failures degrade to in-process caching.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

use crate::provider::ProviderError;

/// Unified error types for the fieldroute services.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty address, out-of-range coordinate).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Route optimization was asked for more waypoints than the provider accepts.
    #[error("TOO_MANY_WAYPOINTS: {count} waypoints given, at most {max} are supported")]
    TooManyWaypoints { count: usize, max: usize },

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A cached payload could not be encoded or decoded.
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(String),

    /// The persistent tier did not answer in time.
    #[error("CACHE_TIMEOUT: {0}")]
    Timeout(String),

    /// The external mapping provider failed.
    #[error("PROVIDER_ERROR: {0}")]
    Provider(#[from] ProviderError),

    /// The booking store could not be read.
    #[error("STORE_ERROR: {0}")]
    Store(String),
}

impl Error {
    /// True for errors the caller caused and should not retry.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Error::InvalidInput(_) | Error::TooManyWaypoints { .. })
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::TooManyWaypoints { .. } => (-32602, err.to_string()),
            Error::Provider(e) => (-32010, e.to_string()),
            Error::Store(msg) => (-32011, msg.clone()),
            Error::Serialization(msg) => (-32002, msg.clone()),
            Error::Timeout(msg) => (-32002, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::TooManyWaypoints { count: 26, max: 25 };
        assert!(err.to_string().contains("TOO_MANY_WAYPOINTS"));
        assert!(err.to_string().contains("26"));
    }

    #[test]
    fn test_input_errors_classified() {
        assert!(Error::InvalidInput("empty".into()).is_input_error());
        assert!(Error::TooManyWaypoints { count: 30, max: 25 }.is_input_error());
        assert!(!Error::Provider(ProviderError::RateLimited).is_input_error());
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::InvalidInput("address is empty".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32602);
    }
}
