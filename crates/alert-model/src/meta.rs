//! Object identity and metadata shared by every resource kind.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Namespace used when a manifest does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// The identity of a resource: namespace plus name.
///
/// Identities are immutable and key all reconciliation state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    /// Namespace the resource lives in.
    pub namespace: String,
    /// Name of the resource within its namespace.
    pub name: String,
}

impl ResourceId {
    /// Creates a new identity.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ResourceId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(ns, name))
            }
            _ => Err(ModelError::InvalidIdentity(s.to_string())),
        }
    }
}

/// Metadata carried by every stored resource.
///
/// `generation` and `resource_version` are owned by the store: the former
/// counts spec changes, the latter every write and serves as the optimistic
/// concurrency token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name.
    pub name: String,
    /// Resource namespace.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Store-assigned unique id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// User labels, used by channel policy selectors.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Finalizer markers blocking physical deletion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    /// Spec generation.
    #[serde(default)]
    pub generation: u64,
    /// Version token for optimistic concurrency.
    #[serde(default)]
    pub resource_version: u64,
    /// When deletion was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl ObjectMeta {
    /// Creates metadata for a new resource.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            uid: None,
            labels: BTreeMap::new(),
            finalizers: Vec::new(),
            generation: 0,
            resource_version: 0,
            deletion_timestamp: None,
        }
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Returns the identity of this resource.
    #[must_use]
    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.namespace, &self.name)
    }

    /// Returns true if the given finalizer is present.
    #[must_use]
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Adds a finalizer. Returns `true` if it was not already present.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Removes a finalizer. Returns `true` if it was present.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        before != self.finalizers.len()
    }

    /// Returns true once deletion has been requested.
    #[must_use]
    pub const fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn identity_display() {
        let id = ResourceId::new("monitoring", "cpu-policy");
        assert_eq!(id.to_string(), "monitoring/cpu-policy");
    }

    #[test]
    fn identity_parse() {
        let id: ResourceId = "monitoring/cpu-policy".parse().unwrap();
        assert_eq!(id, ResourceId::new("monitoring", "cpu-policy"));
    }

    #[test_case("" ; "empty string")]
    #[test_case("no-slash" ; "missing separator")]
    #[test_case("/name" ; "empty namespace")]
    #[test_case("ns/" ; "empty name")]
    #[test_case("a/b/c" ; "too many segments")]
    fn identity_parse_invalid(input: &str) {
        assert!(input.parse::<ResourceId>().is_err());
    }

    #[test]
    fn finalizer_add_is_idempotent() {
        let mut meta = ObjectMeta::new("default", "p");
        assert!(meta.add_finalizer("x"));
        assert!(!meta.add_finalizer("x"));
        assert_eq!(meta.finalizers, vec!["x".to_string()]);
    }

    #[test]
    fn finalizer_remove() {
        let mut meta = ObjectMeta::new("default", "p");
        meta.add_finalizer("x");
        meta.add_finalizer("other");
        assert!(meta.remove_finalizer("x"));
        assert!(!meta.remove_finalizer("x"));
        assert!(meta.has_finalizer("other"));
    }

    #[test]
    fn namespace_defaults_when_missing() {
        let meta: ObjectMeta = serde_json::from_str(r#"{"name":"p"}"#).unwrap();
        assert_eq!(meta.namespace, DEFAULT_NAMESPACE);
        assert!(!meta.is_deleting());
    }
}
