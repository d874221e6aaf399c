//! Error types for the building database client.

use sheetsync_core::sync::{classify_http_status, SyncRetryClass};
use thiserror::Error;

/// Result type alias for database API calls.
pub type Result<T> = std::result::Result<T, DbClientError>;

/// Errors that can occur while talking to the building database API.
#[derive(Debug, Error)]
pub enum DbClientError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success response from the API
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid request (bad configuration, unusable input)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Success response that does not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl DbClientError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> SyncRetryClass {
        match self {
            Self::Api { status, .. } => classify_http_status(*status),
            Self::Http(err) if is_retryable_transport_error(err) => SyncRetryClass::Retryable,
            Self::Http(_) => SyncRetryClass::Permanent,
            Self::Json(_) | Self::InvalidRequest(_) | Self::InvalidResponse(_) => {
                SyncRetryClass::Permanent
            }
        }
    }
}

/// A body cut off mid-read surfaces as a body or decode error; JSON parsing
/// happens outside reqwest, so neither can be a malformed payload.
fn is_retryable_transport_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() || err.is_decode()
}

impl From<DbClientError> for sheetsync_core::Error {
    fn from(err: DbClientError) -> Self {
        sheetsync_core::Error::feed(err.status_code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        assert_eq!(
            DbClientError::api(503, "unavailable").retry_class(),
            SyncRetryClass::Retryable
        );
        assert_eq!(
            DbClientError::api(422, "bad payload").retry_class(),
            SyncRetryClass::Permanent
        );
        assert_eq!(
            DbClientError::invalid_response("missing now").retry_class(),
            SyncRetryClass::Permanent
        );
    }

    #[test]
    fn conversion_keeps_http_status() {
        let err: sheetsync_core::Error = DbClientError::api(500, "boom").into();
        assert_eq!(err.status_code(), Some(500));
        assert!(err.to_string().contains("boom"));
    }
}
