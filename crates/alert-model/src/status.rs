//! Resource status as written back by the reconciler.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The reconciliation phase of a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// A reconcile is in progress or has not yet run.
    #[default]
    Pending,
    /// External state matches the spec.
    Ready,
    /// The last reconcile failed; see `last_error`.
    Error,
}

impl Phase {
    /// Returns the phase as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Ready => "Ready",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last observed/applied external state of a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    /// Reconciliation phase.
    #[serde(default)]
    pub phase: Phase,
    /// Identifier assigned by the external system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<i64>,
    /// Hash of the spec this status describes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_version: Option<String>,
    /// Error detail, present only in [`Phase::Error`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Generation the status was computed from.
    #[serde(default)]
    pub observed_generation: u64,
    /// When the status was last written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ResourceStatus {
    /// Status recorded at the start of a reconcile.
    ///
    /// `config_version` is the version last applied externally, not the one
    /// being reconciled towards.
    #[must_use]
    pub fn pending(external_id: Option<i64>, config_version: Option<String>) -> Self {
        Self::with_phase(Phase::Pending, external_id, config_version, None)
    }

    /// Status recorded after a successful sync.
    #[must_use]
    pub fn ready(external_id: i64, config_version: impl Into<String>) -> Self {
        Self::with_phase(Phase::Ready, Some(external_id), Some(config_version.into()), None)
    }

    /// Status recorded after a failed reconcile, carrying the version the
    /// external object is known to match.
    #[must_use]
    pub fn error(
        external_id: Option<i64>,
        config_version: Option<String>,
        error: impl fmt::Display,
    ) -> Self {
        Self::with_phase(Phase::Error, external_id, config_version, Some(error.to_string()))
    }

    fn with_phase(
        phase: Phase,
        external_id: Option<i64>,
        config_version: Option<String>,
        last_error: Option<String>,
    ) -> Self {
        Self {
            phase,
            external_id,
            config_version,
            last_error,
            observed_generation: 0,
            last_updated: Some(Utc::now()),
        }
    }

    /// Sets the observed generation.
    #[must_use]
    pub const fn observing(mut self, generation: u64) -> Self {
        self.observed_generation = generation;
        self
    }

    /// Returns true if the resource is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    /// Compares everything except the write timestamp.
    #[must_use]
    pub fn same_outcome(&self, other: &Self) -> bool {
        self.phase == other.phase
            && self.external_id == other.external_id
            && self.config_version == other.config_version
            && self.last_error == other.last_error
            && self.observed_generation == other.observed_generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_has_no_error() {
        let status = ResourceStatus::pending(Some(7), Some("abc".to_string()));
        assert_eq!(status.phase, Phase::Pending);
        assert_eq!(status.external_id, Some(7));
        assert_eq!(status.config_version.as_deref(), Some("abc"));
        assert!(status.last_error.is_none());
    }

    #[test]
    fn first_pending_has_no_version() {
        let status = ResourceStatus::pending(None, None);
        assert!(status.config_version.is_none());
        assert!(status.external_id.is_none());
    }

    #[test]
    fn error_carries_message() {
        let status = ResourceStatus::error(None, Some("abc".to_string()), "boom");
        assert_eq!(status.phase, Phase::Error);
        assert_eq!(status.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn ready_is_ready() {
        let status = ResourceStatus::ready(42, "abc").observing(3);
        assert!(status.is_ready());
        assert_eq!(status.observed_generation, 3);
    }

    #[test]
    fn same_outcome_ignores_timestamp() {
        let a = ResourceStatus::ready(1, "v");
        let mut b = a.clone();
        b.last_updated = None;
        assert!(a.same_outcome(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn status_serializes_camel_case() {
        let status = ResourceStatus::ready(5, "v1");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["externalId"], 5);
        assert_eq!(json["configVersion"], "v1");
        assert_eq!(json["phase"], "Ready");
        assert!(json.get("lastError").is_none());
    }
}
