//! Common error types for resodex

use thiserror::Error;

/// Common result type for resodex operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared across the client, traversal, and catalog layers.
///
/// Remote failures are classified rather than collapsed: an expired session
/// halts a dump, a missing link target only drops that link, and a transient
/// network fault is retryable by the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing, rejected, or expired session credential
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Remote path or record no longer exists
    #[error("Not found: {0}")]
    NotFound(String),

    /// Timeout or transient remote fault, retryable
    #[error("Network error: {0}")]
    Network(String),

    /// Unexpected API response status
    #[error("API error {0}: {1}")]
    Api(u16, String),

    /// Record missing a field required for its declared type
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Snapshot write or catalog insert failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Classify a reqwest failure: timeouts and connection faults are
    /// transient, everything else surfaces as-is.
    pub fn from_request(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Error::Network(err.to_string())
        } else {
            Error::Api(
                err.status().map(|s| s.as_u16()).unwrap_or(0),
                err.to_string(),
            )
        }
    }

    /// True for faults the caller may retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::Network("timed out".into()).is_transient());
        assert!(!Error::Auth("expired".into()).is_transient());
        assert!(!Error::NotFound("gone".into()).is_transient());
    }

    #[test]
    fn error_display_includes_context() {
        let err = Error::MalformedRecord("R-123: object has no tags".into());
        assert!(err.to_string().contains("R-123"));
    }
}
