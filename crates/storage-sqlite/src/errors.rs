//! Storage errors and their mapping into the core error type.

use sheetsync_core::errors::{DatabaseError, Error};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[from] diesel::ConnectionError),

    #[error("Pool error: {0}")]
    PoolFailed(#[from] r2d2::Error),

    #[error("Query failed: {0}")]
    QueryFailed(#[from] diesel::result::Error),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Writer unavailable: {0}")]
    WriterUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Domain error raised inside a write transaction.
    #[error(transparent)]
    Domain(Error),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConnectionFailed(e) => {
                Error::Database(DatabaseError::ConnectionFailed(e.to_string()))
            }
            StorageError::PoolFailed(e) => {
                Error::Database(DatabaseError::ConnectionFailed(e.to_string()))
            }
            StorageError::QueryFailed(diesel::result::Error::NotFound) => {
                Error::Database(DatabaseError::NotFound("record not found".to_string()))
            }
            StorageError::QueryFailed(e) => Error::Database(DatabaseError::QueryFailed(e.to_string())),
            StorageError::MigrationFailed(message) => {
                Error::Database(DatabaseError::MigrationFailed(message))
            }
            StorageError::WriterUnavailable(message) => {
                Error::Database(DatabaseError::Internal(message))
            }
            StorageError::Io(e) => Error::Database(DatabaseError::Internal(e.to_string())),
            StorageError::Domain(e) => e,
        }
    }
}
