//! Error types shared by the cache, persistence and configuration layers.

use thiserror::Error;

/// Errors raised below the HTTP layer.
///
/// Handlers convert these into [`crate::api::error::ApiError`]; anything that
/// is not a validation or lookup failure ends up as a 500.
#[derive(Debug, Error)]
pub enum Error {
    /// Input rejected before reaching a collaborator (bad key, bad id).
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Encoding a value for the cache or the wire failed.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Decoding a cached or received value failed.
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Cache entry envelope has the wrong magic or is truncated.
    #[error("invalid cache entry: {0}")]
    InvalidCacheEntry(String),

    /// Cache entry was written by a different envelope schema.
    #[error("cache schema version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// Cache backend unavailable or returned a protocol error.
    #[error("cache backend error: {0}")]
    BackendError(String),

    /// Persistence store failure.
    #[error("repository error: {0}")]
    RepositoryError(String),

    /// A flush would break a reference between entities.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Operation exceeded its time budget.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}
