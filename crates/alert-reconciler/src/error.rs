//! Error types for the alert-reconciler crate.

use alert_model::{ModelError, ResourceId, ResourceKind};
use thiserror::Error;

/// Errors returned by a [`ResourceStore`](crate::store::ResourceStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The resource does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Resource kind.
        kind: ResourceKind,
        /// Resource identity.
        id: ResourceId,
    },

    /// The write carried a stale resource version.
    #[error("conflict writing {kind} {id}: resource version {version} is stale")]
    Conflict {
        /// Resource kind.
        kind: ResourceKind,
        /// Resource identity.
        id: ResourceId,
        /// The version the write was based on.
        version: u64,
    },

    /// The backing storage failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns true for [`StoreError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for [`StoreError::Conflict`].
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Errors returned by an [`AlertingApi`](crate::api::AlertingApi).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The external object does not exist.
    #[error("external {resource} not found")]
    NotFound {
        /// Description of the missing object.
        resource: String,
    },

    /// The API answered with a non-success status.
    #[error("alerting API returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The request never got a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Creates a not-found error for the given object.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Returns true for [`ApiError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors surfaced by a reconcile.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Resource store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// External API failure.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Conflicting writes persisted past the retry bound.
    #[error("gave up writing {id} after {attempts} conflicting attempts")]
    RetriesExhausted {
        /// Resource identity.
        id: ResourceId,
        /// Attempts made.
        attempts: u32,
    },

    /// The resource failed validation.
    #[error(transparent)]
    Invalid(#[from] ModelError),
}

impl ReconcileError {
    /// Returns true if reconciling again may succeed without a spec change.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Invalid(_))
    }
}

/// Result type for reconciler operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
