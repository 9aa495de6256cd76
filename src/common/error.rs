//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.

use std::io;
use thiserror::Error;

use crate::protocol::HeaderError;

/// Relay error type
#[derive(Error, Debug)]
pub enum ProxyError {
    /// IO error (reset, broken pipe, timed out write)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Key matched but the header fields are malformed
    #[error("Handshake error: {0}")]
    Handshake(#[from] HeaderError),

    /// Domain name lookup failed
    #[error("Resolve error: {0}")]
    Resolve(String),

    /// Upstream connect failed or timed out
    #[error("Connect error: {0}")]
    Connect(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `ProxyError`.
pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        let proxy_err: ProxyError = io_err.into();

        match proxy_err {
            ProxyError::Io(_) => {}
            _ => panic!("Should convert to IO error"),
        }

        let proxy_err: ProxyError = HeaderError::AddressTypeNotSupported(9).into();
        assert!(matches!(proxy_err, ProxyError::Handshake(_)));
    }

    #[test]
    fn test_error_display() {
        let err = ProxyError::Config("Invalid configuration".to_string());
        let err_str = format!("{}", err);
        assert!(err_str.contains("Invalid configuration"));

        let err = ProxyError::Resolve("no such host".to_string());
        assert_eq!(err.to_string(), "Resolve error: no such host");
    }
}
