//! Forge client error types.

use std::sync::Arc;

use pagemirror_core::Error;

/// Errors from the forge API client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ForgeError {
    /// Authentication failed (missing or rejected token).
    #[error("authentication failed: status {status}")]
    AuthError { status: u16 },

    /// Non-success HTTP response.
    #[error("HTTP error: {status} from {url}")]
    HttpError { status: u16, url: String },

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid request URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// A streamed body disagreed with its declared length.
    #[error("short download: wrote {written} of {expected} bytes")]
    SizeMismatch { written: u64, expected: u64 },

    /// Writing the downloaded body failed.
    #[error("write error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<reqwest::Error> for ForgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { ForgeError::Timeout } else { ForgeError::Network(Arc::new(err)) }
    }
}

impl From<std::io::Error> for ForgeError {
    fn from(err: std::io::Error) -> Self {
        ForgeError::Io(Arc::new(err))
    }
}

impl From<ForgeError> for Error {
    fn from(err: ForgeError) -> Self {
        Error::Upstream(err.to_string())
    }
}
