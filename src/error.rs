//! Error handling module
//!
//! Defines custom error types for the Rangecast server.

use std::io;

use thiserror::Error;

/// Main error type for the Rangecast server
#[derive(Error, Debug)]
pub enum RangecastError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Visibility-subsystem errors
    #[error("Visibility error: {0}")]
    Visibility(#[from] VisibilityError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Network-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection not found: {0}")]
    ConnectionNotFound(u64),

    #[error("Too many connections from {0}")]
    TooManyConnections(String),
}

/// Visibility-specific errors
#[derive(Error, Debug)]
pub enum VisibilityError {
    #[error("Host visibility structure unavailable")]
    ProviderUnavailable,
}

/// Result type alias for Rangecast operations
pub type Result<T> = std::result::Result<T, RangecastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NetworkError::ConnectionClosed;
        assert_eq!(err.to_string(), "Connection closed");

        let err = NetworkError::TooManyConnections("10.0.0.1".to_string());
        assert_eq!(err.to_string(), "Too many connections from 10.0.0.1");

        let err = VisibilityError::ProviderUnavailable;
        assert_eq!(err.to_string(), "Host visibility structure unavailable");
    }

    #[test]
    fn test_error_wrapping() {
        let err: RangecastError = NetworkError::ConnectionNotFound(7).into();
        assert_eq!(err.to_string(), "Network error: Connection not found: 7");

        let err: RangecastError = VisibilityError::ProviderUnavailable.into();
        assert!(matches!(
            err,
            RangecastError::Visibility(VisibilityError::ProviderUnavailable)
        ));
    }
}
