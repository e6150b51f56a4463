//! Alert conditions attached to a policy.
//!
//! A [`Condition`] is one of three alerting-rule kinds. Every variant carries an
//! optional `external_id` assigned by the external system, which is ignored for
//! semantic comparison: two conditions describe the same rule when their
//! [`Condition::identity_key`]s are equal.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// The kind of a condition; one external endpoint family per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionKind {
    /// NRQL query condition.
    Nrql,
    /// APM/browser/mobile metric condition.
    Apm,
    /// Infrastructure condition.
    Infra,
}

impl ConditionKind {
    /// Every condition kind, in sync order.
    pub const ALL: [Self; 3] = [Self::Nrql, Self::Apm, Self::Infra];

    /// Returns the kind as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Nrql => "nrql",
            Self::Apm => "apm",
            Self::Infra => "infra",
        }
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison applied to a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdOperator {
    /// Violates when the value is above the threshold.
    Above,
    /// Violates when the value is below the threshold.
    Below,
    /// Violates when the value equals the threshold.
    Equal,
}

/// How the duration window is evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFunction {
    /// Every data point in the window must violate.
    #[default]
    All,
    /// At least one data point must violate.
    Any,
}

/// A metric threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Threshold {
    /// Comparison operator.
    pub operator: ThresholdOperator,
    /// Threshold value.
    pub value: f64,
    /// Window length in minutes.
    pub duration_minutes: u32,
    /// Window evaluation mode.
    #[serde(default)]
    pub time_function: TimeFunction,
}

impl Threshold {
    /// Creates an "above" threshold with an all-points window.
    #[must_use]
    pub const fn above(value: f64, duration_minutes: u32) -> Self {
        Self {
            operator: ThresholdOperator::Above,
            value,
            duration_minutes,
            time_function: TimeFunction::All,
        }
    }

    fn validate(&self, what: &str) -> std::result::Result<(), String> {
        if !self.value.is_finite() {
            return Err(format!("{what} value must be finite"));
        }
        if self.duration_minutes == 0 {
            return Err(format!("{what} duration must be at least one minute"));
        }
        Ok(())
    }
}

/// Aggregation of an NRQL result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFunction {
    /// Compare the single returned value.
    #[default]
    SingleValue,
    /// Compare the sum over the window.
    Sum,
}

/// A condition evaluated over an NRQL query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NrqlCondition {
    /// Condition name.
    pub name: String,
    /// NRQL query.
    pub query: String,
    /// Query window in minutes.
    #[serde(default = "default_since_minutes")]
    pub since_minutes: u32,
    /// How the query result is aggregated.
    #[serde(default)]
    pub value_function: ValueFunction,
    /// Critical threshold.
    pub alert_threshold: Threshold,
    /// Optional warning threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_threshold: Option<Threshold>,
    /// Whether the condition is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Runbook link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runbook_url: Option<String>,
    /// External identifier, absent until created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<i64>,
}

/// Metric family of an APM condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApmConditionType {
    /// Application metric.
    ApmAppMetric,
    /// Key transaction metric.
    ApmKtMetric,
    /// Browser metric.
    BrowserMetric,
    /// Mobile metric.
    MobileMetric,
}

/// Scope an APM condition is evaluated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionScope {
    /// Evaluate against the whole application.
    Application,
    /// Evaluate against each instance.
    Instance,
}

/// Aggregation applied to a user-defined metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserValueFunction {
    /// Average value.
    Average,
    /// Minimum value.
    Min,
    /// Maximum value.
    Max,
    /// Sum of values.
    Total,
    /// Number of samples.
    SampleSize,
}

/// A custom metric for an APM condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDefinedMetric {
    /// Custom metric name.
    pub metric: String,
    /// Aggregation function.
    pub value_function: UserValueFunction,
}

/// A condition on an APM, browser or mobile metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApmCondition {
    /// Condition name.
    pub name: String,
    /// Metric family.
    #[serde(rename = "type")]
    pub condition_type: ApmConditionType,
    /// Metric name.
    pub metric: String,
    /// Entity ids the condition targets.
    #[serde(default)]
    pub entities: Vec<i64>,
    /// Evaluation scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_scope: Option<ConditionScope>,
    /// Critical threshold.
    pub critical_threshold: Threshold,
    /// Optional warning threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_threshold: Option<Threshold>,
    /// Custom metric, when `metric` is `user_defined`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_defined: Option<UserDefinedMetric>,
    /// Whether the condition is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Runbook link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runbook_url: Option<String>,
    /// External identifier, absent until created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<i64>,
}

/// Type of an infrastructure condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfraConditionType {
    /// Threshold on an infrastructure metric.
    InfraMetric,
    /// Process-running check.
    InfraProcessRunning,
    /// Host-not-reporting check.
    InfraHostNotReporting,
}

/// Threshold of an infrastructure condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfraThreshold {
    /// Threshold value.
    pub value: f64,
    /// Window length in minutes.
    pub duration_minutes: u32,
    /// Window evaluation mode.
    #[serde(default)]
    pub time_function: TimeFunction,
}

/// A condition on infrastructure data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfraCondition {
    /// Condition name.
    pub name: String,
    /// Condition type.
    #[serde(rename = "type")]
    pub condition_type: InfraConditionType,
    /// Event type queried, e.g. `SystemSample`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Attribute selected from the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
    /// Comparison against the threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<ThresholdOperator>,
    /// Filter applied to the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,
    /// Integration provider for integration events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration_provider: Option<String>,
    /// Critical threshold.
    pub critical_threshold: InfraThreshold,
    /// Optional warning threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_threshold: Option<InfraThreshold>,
    /// Whether the condition is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Runbook link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runbook_url: Option<String>,
    /// External identifier, absent until created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<i64>,
}

const fn default_since_minutes() -> u32 {
    3
}

const fn default_enabled() -> bool {
    true
}

/// An alerting rule belonging to exactly one policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Condition {
    /// NRQL query condition.
    Nrql(NrqlCondition),
    /// APM metric condition.
    Apm(ApmCondition),
    /// Infrastructure condition.
    Infra(InfraCondition),
}

impl Condition {
    /// Returns the kind of this condition.
    #[must_use]
    pub const fn kind(&self) -> ConditionKind {
        match self {
            Self::Nrql(_) => ConditionKind::Nrql,
            Self::Apm(_) => ConditionKind::Apm,
            Self::Infra(_) => ConditionKind::Infra,
        }
    }

    /// Returns the condition name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Nrql(c) => &c.name,
            Self::Apm(c) => &c.name,
            Self::Infra(c) => &c.name,
        }
    }

    /// Returns the external identifier, if created.
    #[must_use]
    pub const fn external_id(&self) -> Option<i64> {
        match self {
            Self::Nrql(c) => c.external_id,
            Self::Apm(c) => c.external_id,
            Self::Infra(c) => c.external_id,
        }
    }

    /// Returns a copy carrying the given external identifier.
    #[must_use]
    pub fn with_external_id(mut self, id: Option<i64>) -> Self {
        match &mut self {
            Self::Nrql(c) => c.external_id = id,
            Self::Apm(c) => c.external_id = id,
            Self::Infra(c) => c.external_id = id,
        }
        self
    }

    /// Returns the semantic identity of this condition.
    ///
    /// The key covers every field except `external_id`. Entity lists are
    /// order-insensitive and empty optional strings count as absent.
    #[must_use]
    pub fn identity_key(&self) -> String {
        let normalized = match self.clone().with_external_id(None) {
            Self::Nrql(mut c) => {
                c.runbook_url = non_empty(c.runbook_url);
                Self::Nrql(c)
            }
            Self::Apm(mut c) => {
                c.entities.sort_unstable();
                c.entities.dedup();
                c.runbook_url = non_empty(c.runbook_url);
                Self::Apm(c)
            }
            Self::Infra(mut c) => {
                c.event = non_empty(c.event);
                c.select = non_empty(c.select);
                c.where_clause = non_empty(c.where_clause);
                c.integration_provider = non_empty(c.integration_provider);
                c.runbook_url = non_empty(c.runbook_url);
                Self::Infra(c)
            }
        };
        format!("{normalized:?}")
    }

    /// Returns true if both conditions describe the same rule.
    #[must_use]
    pub fn same_rule(&self, other: &Self) -> bool {
        self.identity_key() == other.identity_key()
    }

    /// Validates the condition.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::Invalid` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.check().map_err(|reason| ModelError::Invalid {
            kind: "Condition",
            name: self.name().to_string(),
            reason,
        })
    }

    fn check(&self) -> std::result::Result<(), String> {
        if self.name().trim().is_empty() {
            return Err("condition name cannot be empty".to_string());
        }
        match self {
            Self::Nrql(c) => {
                if c.query.trim().is_empty() {
                    return Err("NRQL query cannot be empty".to_string());
                }
                if !(1..=120).contains(&c.since_minutes) {
                    return Err("sinceMinutes must be between 1 and 120".to_string());
                }
                c.alert_threshold.validate("alert threshold")?;
                if let Some(t) = &c.warning_threshold {
                    t.validate("warning threshold")?;
                }
            }
            Self::Apm(c) => {
                if c.metric.trim().is_empty() {
                    return Err("metric cannot be empty".to_string());
                }
                c.critical_threshold.validate("critical threshold")?;
                if let Some(t) = &c.warning_threshold {
                    t.validate("warning threshold")?;
                }
            }
            Self::Infra(c) => {
                if !c.critical_threshold.value.is_finite() {
                    return Err("critical threshold value must be finite".to_string());
                }
                if let Some(t) = &c.warning_threshold {
                    if !t.value.is_finite() {
                        return Err("warning threshold value must be finite".to_string());
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.external_id() {
            Some(id) => write!(f, "{} condition '{}' (#{id})", self.kind(), self.name()),
            None => write!(f, "{} condition '{}'", self.kind(), self.name()),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) fn apm(metric: &str, threshold: f64) -> Condition {
        Condition::Apm(ApmCondition {
            name: format!("{metric} high"),
            condition_type: ApmConditionType::ApmAppMetric,
            metric: metric.to_string(),
            entities: vec![3, 1, 2],
            condition_scope: Some(ConditionScope::Application),
            critical_threshold: Threshold::above(threshold, 5),
            warning_threshold: None,
            user_defined: None,
            enabled: true,
            runbook_url: None,
            external_id: None,
        })
    }

    pub(crate) fn nrql(query: &str) -> Condition {
        Condition::Nrql(NrqlCondition {
            name: "errors".to_string(),
            query: query.to_string(),
            since_minutes: 3,
            value_function: ValueFunction::SingleValue,
            alert_threshold: Threshold::above(10.0, 5),
            warning_threshold: None,
            enabled: true,
            runbook_url: None,
            external_id: None,
        })
    }
}
