//! Error types for the operator.

use std::path::PathBuf;

use alert_client::ClientError;
use alert_reconciler::StoreError;
use thiserror::Error;

/// Result type for operator operations.
pub type Result<T> = std::result::Result<T, OperatorError>;

/// Errors that can occur while running the operator.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A manifest could not be read or parsed.
    #[error("invalid manifest '{}': {reason}", path.display())]
    Manifest {
        /// File the manifest came from.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// Resource store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// HTTP client setup failure.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl OperatorError {
    /// Creates a manifest error.
    pub fn manifest(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Manifest {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
