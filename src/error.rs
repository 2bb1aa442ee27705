//! Structured error taxonomy for the knowledge-base service.
//!
//! Variants preserve their underlying causes via `#[source]` rather than
//! collapsing them into opaque strings, so callers (CLI and HTTP) can map
//! each kind to an appropriate exit code or status.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// The library's error taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An embedding provider failed or returned an unexpected response.
    #[error("provider error: {message}")]
    Provider {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A row insert failed.
    #[error("insert failed: {0}")]
    Insert(#[source] sqlx::Error),

    /// A storage backend operation failed.
    #[error("storage error: {0}")]
    Storage(#[source] sqlx::Error),

    /// Serialization or deserialization of a stored value failed.
    #[error("serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// A requested entity was not found.
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// The caller supplied invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// An embedding's dimensionality did not match the provider's.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl Error {
    /// Construct a [`Error::NotFound`] for the given entity kind and id.
    pub fn not_found(kind: &str, id: &str) -> Self {
        Error::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }

    /// Construct a [`Error::Provider`] with no underlying cause.
    pub fn provider(message: impl Into<String>) -> Self {
        Error::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Construct a [`Error::Provider`] preserving the underlying cause.
    pub fn provider_with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Provider {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Storage(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err)
    }
}
