//! Core error types for sitegate-core.
//!
//! The hierarchy mirrors the failure taxonomy the rest of the library is
//! built around: storage failures degrade to "no data", badge-sink failures
//! are split into retryable and terminal, and validation failures are always
//! resolved locally. [`CoreError::is_retryable`] is the single classifier
//! consumed by the retry combinator.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for sitegate-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Persistence-layer errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Badge-surface / navigation errors
    #[error("Badge sink error: {0}")]
    Sink(#[from] SinkError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// URL parse errors
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

impl CoreError {
    /// Whether a bounded retry is worth attempting for this error.
    ///
    /// Storage and transient sink failures are retryable; an invalidated
    /// sink context, validation failures, and parse failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Store(_) => true,
            CoreError::Sink(sink) => sink.is_retryable(),
            CoreError::Custom(_) => true,
            CoreError::Config(_)
            | CoreError::Validation(_)
            | CoreError::Url(_)
            | CoreError::Json(_) => false,
        }
    }
}

/// Persistence-layer errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the backing database
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Errors raised by the badge surface / navigation collaborator.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The host surface has gone away for good; retrying cannot help.
    #[error("Badge context invalidated")]
    ContextInvalidated,

    /// The surface is temporarily unavailable.
    #[error("Badge surface unavailable: {0}")]
    Unavailable(String),

    /// A tab navigation was rejected.
    #[error("Navigation failed: {0}")]
    NavigationFailed(String),
}

impl SinkError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SinkError::ContextInvalidated)
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// A site pattern that normalizes to the empty string
    #[error("Site pattern is empty after normalization")]
    EmptyPattern,

    /// Unknown site id
    #[error("No site with id '{0}'")]
    UnknownSite(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
