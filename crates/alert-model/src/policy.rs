//! The `AlertPolicy` resource.

use serde::{Deserialize, Serialize};

use crate::condition::{Condition, ConditionKind};
use crate::error::{ModelError, Result};
use crate::meta::ObjectMeta;
use crate::resource::{Resource, ResourceKind, validate_name};
use crate::status::ResourceStatus;

/// How incidents are grouped for a policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentPreference {
    /// One open incident per policy.
    #[default]
    PerPolicy,
    /// One open incident per condition.
    PerCondition,
    /// One open incident per condition and target.
    PerConditionAndTarget,
}

/// Desired state of an alert policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPolicySpec {
    /// External policy name; defaults to the resource name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Incident grouping.
    #[serde(default)]
    pub incident_preference: IncidentPreference,
    /// Conditions, in declaration order.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// A declaratively managed alert policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPolicy {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Desired state.
    #[serde(default)]
    pub spec: AlertPolicySpec,
    /// Last applied state.
    #[serde(default)]
    pub status: ResourceStatus,
}

impl AlertPolicy {
    /// Creates a policy with an empty spec.
    #[must_use]
    pub fn new(metadata: ObjectMeta) -> Self {
        Self {
            metadata,
            spec: AlertPolicySpec::default(),
            status: ResourceStatus::default(),
        }
    }

    /// Adds a condition to the spec.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.spec.conditions.push(condition);
        self
    }

    /// Returns the name used for the external policy.
    #[must_use]
    pub fn external_name(&self) -> &str {
        self.spec
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.metadata.name)
    }

    /// Returns the declared conditions of one kind.
    pub fn conditions_of(&self, kind: ConditionKind) -> impl Iterator<Item = &Condition> {
        self.spec.conditions.iter().filter(move |c| c.kind() == kind)
    }
}

impl Resource for AlertPolicy {
    const KIND: ResourceKind = ResourceKind::AlertPolicy;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn status(&self) -> &ResourceStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut ResourceStatus {
        &mut self.status
    }

    fn spec_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(&self.spec).map_err(ModelError::from)
    }

    fn validate(&self) -> Result<()> {
        validate_name(Self::KIND, &self.metadata.name)?;
        validate_name(Self::KIND, &self.metadata.namespace)?;
        if self.external_name().len() > 256 {
            return Err(ModelError::Invalid {
                kind: Self::KIND.as_str(),
                name: self.metadata.name.clone(),
                reason: "policy name cannot exceed 256 characters".to_string(),
            });
        }
        for condition in &self.spec.conditions {
            condition.validate().map_err(|e| ModelError::Invalid {
                kind: Self::KIND.as_str(),
                name: self.metadata.name.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}
