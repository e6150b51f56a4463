//! The [`Resource`] trait implemented by every reconciled kind.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ModelError, Result};
use crate::meta::{ObjectMeta, ResourceId};
use crate::status::ResourceStatus;

/// Maximum length of a resource name or namespace.
pub const MAX_NAME_LENGTH: usize = 253;

/// The reconciled resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// An alert policy with its conditions.
    AlertPolicy,
    /// A notification channel subscribed to policies.
    NotificationChannel,
}

impl ResourceKind {
    /// Returns the kind name as used in manifests.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AlertPolicy => "AlertPolicy",
            Self::NotificationChannel => "NotificationChannel",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored resource with user-owned spec and reconciler-owned status.
pub trait Resource:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The kind of this resource.
    const KIND: ResourceKind;

    /// Object metadata.
    fn meta(&self) -> &ObjectMeta;

    /// Mutable object metadata.
    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// Current status.
    fn status(&self) -> &ResourceStatus;

    /// Mutable status.
    fn status_mut(&mut self) -> &mut ResourceStatus;

    /// The spec as a JSON value, used for change detection and versioning.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::Serialization` if the spec cannot be encoded.
    fn spec_json(&self) -> Result<serde_json::Value>;

    /// Validates the resource.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::Invalid` describing the first problem found.
    fn validate(&self) -> Result<()>;

    /// Returns the identity of this resource.
    fn id(&self) -> ResourceId {
        self.meta().id()
    }

    /// Hash of the spec, stable across processes.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::Serialization` if the spec cannot be encoded.
    fn config_version(&self) -> Result<String> {
        version_of(&self.spec_json()?)
    }
}

/// Lowercase hex BLAKE3 digest of a JSON value.
pub(crate) fn version_of(value: &serde_json::Value) -> Result<String> {
    // `Value` objects are key-sorted, so the encoding is canonical.
    let encoded = serde_json::to_vec(value)?;
    Ok(blake3::hash(&encoded).to_hex().to_string())
}

/// Checks a resource name or namespace.
///
/// # Errors
///
/// Returns `ModelError::Invalid` if the name is empty, too long, or contains
/// characters other than lowercase alphanumerics, `-` and `.`.
pub fn validate_name(kind: ResourceKind, name: &str) -> Result<()> {
    let invalid = |reason: &str| ModelError::Invalid {
        kind: kind.as_str(),
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty"));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(invalid("name cannot exceed 253 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(invalid(
            "name must contain only lowercase alphanumerics, '-' and '.'",
        ));
    }
    if name.starts_with(['-', '.']) || name.ends_with(['-', '.']) {
        return Err(invalid("name must start and end with an alphanumeric"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case("cpu" ; "simple")]
    #[test_case("cpu-alerts.v2" ; "dots and hyphens")]
    #[test_case("a1" ; "digits")]
    fn valid_names(name: &str) {
        assert!(validate_name(ResourceKind::AlertPolicy, name).is_ok());
    }

    #[test_case("" ; "empty")]
    #[test_case("CPU" ; "uppercase")]
    #[test_case("-cpu" ; "leading hyphen")]
    #[test_case("cpu." ; "trailing dot")]
    #[test_case("cpu alerts" ; "space")]
    #[test_case("cpu/alerts" ; "slash")]
    fn invalid_names(name: &str) {
        assert!(validate_name(ResourceKind::AlertPolicy, name).is_err());
    }

    #[test]
    fn overlong_name_fails() {
        let name = "a".repeat(MAX_NAME_LENGTH + 1);
        assert!(validate_name(ResourceKind::NotificationChannel, &name).is_err());
    }

    proptest! {
        #[test]
        fn prop_generated_names_validate(name in "[a-z0-9]([a-z0-9-]{0,40}[a-z0-9])?") {
            prop_assert!(validate_name(ResourceKind::AlertPolicy, &name).is_ok());
        }
    }
}
