//! Error types for directory lookups.

use thiserror::Error;

/// Errors that can occur while querying an external directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// HTTP transport failed (connect, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Authentication failed or no usable token was available.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The directory returned a status we don't handle.
    #[error("Unexpected status {status} from {directory}")]
    UnexpectedStatus {
        /// Directory name.
        directory: &'static str,
        /// HTTP status code.
        status: u16,
    },

    /// The response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result type alias using [`DirectoryError`].
pub type Result<T> = std::result::Result<T, DirectoryError>;
