//! Error types for client construction.

use thiserror::Error;

/// Result type for client construction.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised while configuring the HTTP client.
///
/// Request failures are reported as
/// [`ApiError`](alert_reconciler::ApiError) instead.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A base URL could not be used.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The request timeout was zero.
    #[error("request timeout must be greater than zero")]
    InvalidTimeout,

    /// The API key cannot be sent as a header.
    #[error("API key is not a valid header value")]
    InvalidApiKey,

    /// The underlying HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

impl ClientError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }
}
