//! Error types for the record synchronization system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for synchronization operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the record synchronization system
#[derive(Error, Debug)]
pub enum Error {
    /// The record source could not produce a snapshot
    ///
    /// Raised when the source is not initialized, the fetch failed or the
    /// fetch timed out. The affected collection stays `loading`.
    #[error("Record source unavailable: {0}")]
    SourceUnavailable(String),

    /// A collection was queried for a record type nobody attached to
    #[error("Record type not attached: {0}")]
    NotAttached(String),

    /// A change could not be forwarded to an external endpoint
    #[error("Delivery failed ({topic}): {message}")]
    DeliveryFailure {
        /// Topic of the change that failed
        topic: String,
        /// Failure description
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a "source unavailable" error
    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    /// Create a "not attached" error for a record type
    pub fn not_attached(record_type: impl Into<String>) -> Self {
        Self::NotAttached(record_type.into())
    }

    /// Create a delivery failure error
    pub fn delivery_failure(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DeliveryFailure {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Whether this error leaves a collection retryable in `loading` state
    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, Self::SourceUnavailable(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
