//! Error types shared by the sync domain and its collaborators.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the local store implementation.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Errors that can occur while synchronizing the sheet with the building database.
#[derive(Debug, Error)]
pub enum Error {
    /// Local store persistence failure.
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// The building database API answered with a failure or could not be reached.
    #[error("Change feed error: {message}")]
    Feed {
        status: Option<u16>,
        message: String,
    },

    /// The local store rejected a write (unknown field, oversized batch, missing record).
    #[error("Store rejected write: {0}")]
    Store(String),

    /// Invalid configuration or input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Local data violates an invariant the reconciler relies on.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn feed(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Feed {
            status,
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// HTTP status if the failure came from the building database API.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Feed { status, .. } => *status,
            _ => None,
        }
    }
}
