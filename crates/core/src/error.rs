//! Unified error types for the cache core.
//!
//! None of these reach callers of the search engine directly: cache faults
//! degrade to misses and are only logged.

use tokio_rusqlite::rusqlite;

/// Unified error type for cache and configuration plumbing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty category).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// A value could not be encoded or decoded for storage.
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// The remote layer is unreachable or has been closed.
    #[error("REMOTE_UNAVAILABLE: {0}")]
    RemoteUnavailable(String),
}

impl Error {
    /// Whether this error means the remote layer cannot be reached at all,
    /// as opposed to a single bad value.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::Database(_) | Error::RemoteUnavailable(_))
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
