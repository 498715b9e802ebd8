//! Error types for cost anomaly detection.

use thiserror::Error;

/// Result type alias for anomaly detection operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for anomaly detection runs
#[derive(Debug, Error)]
pub enum Error {
    /// Index or document collection does not exist yet
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store query failed
    #[error("Query error: {0}")]
    Query(String),

    /// Aggregation or document payload did not have the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Bulk write or close failed
    #[error("Bulk write error: {0}")]
    Bulk(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The caller cancelled the run
    #[error("Detection run cancelled")]
    Cancelled,
}

impl Error {
    /// A missing index is an empty data set, not a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
