//! Error types for the networking module.

use courier_core::CoreError;
use thiserror::Error;

/// Network-specific errors.
///
/// Errors are `Clone` so a transport failure delivered on a session thread can
/// be stored in the transfer state and handed out in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// An argument failed validation before any work was started.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// A transfer is already live on this manager.
    #[error("A transfer is already in progress")]
    TransferInProgress,
    /// HTTP request failed.
    #[error("HTTP request error: {0}")]
    Request(String),
    /// Request timed out.
    #[error("Request timed out")]
    Timeout,
    /// Connection refused or failed.
    #[error("Connection error: {0}")]
    Connection(String),
    /// Invalid header name or value.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    /// HTTP error status reported by the transport.
    #[error("HTTP {status}")]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
    },
    /// Redirect limit exceeded.
    #[error("Too many redirects")]
    TooManyRedirects,
    /// Transfer was cancelled.
    #[error("Transfer was cancelled")]
    Cancelled,
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
    /// The background worker could not be started or failed.
    #[error("Worker error: {0}")]
    Worker(String),
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else if err.is_redirect() {
            Self::TooManyRedirects
        } else if let Some(status) = err.status() {
            Self::HttpStatus {
                status: status.as_u16(),
            }
        } else {
            Self::Request(err.to_string())
        }
    }
}

impl From<url::ParseError> for NetworkError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for NetworkError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<http::header::ToStrError> for NetworkError {
    fn from(err: http::header::ToStrError) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<CoreError> for NetworkError {
    fn from(err: CoreError) -> Self {
        Self::Worker(err.to_string())
    }
}

/// A specialized Result type for network operations.
pub type Result<T> = std::result::Result<T, NetworkError>;
