//! Error types for the Tollgate service.

use thiserror::Error;

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// The counter store could not be reached (connection, I/O or timeout)
    #[error("Counter store unavailable: {0}")]
    StoreUnavailable(String),

    /// The counter store was reachable but the command failed
    #[error("Counter store operation failed: {0}")]
    StoreOperationFailed(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TollgateError {
    /// Whether this error came from the counter store.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            TollgateError::StoreUnavailable(_) | TollgateError::StoreOperationFailed(_)
        )
    }
}

impl From<config::ConfigError> for TollgateError {
    fn from(err: config::ConfigError) -> Self {
        TollgateError::Config(err.to_string())
    }
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_failures_are_classified() {
        assert!(TollgateError::StoreUnavailable("down".into()).is_store_failure());
        assert!(TollgateError::StoreOperationFailed("WRONGTYPE".into()).is_store_failure());
        assert!(!TollgateError::Config("bad".into()).is_store_failure());
    }

    #[test]
    fn test_error_display() {
        let err = TollgateError::StoreUnavailable("connection refused".into());
        assert_eq!(
            err.to_string(),
            "Counter store unavailable: connection refused"
        );
    }
}
