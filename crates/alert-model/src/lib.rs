//! Resource types for the alert operator.
//!
//! `alert-model` defines the declaratively managed resources the operator
//! keeps in sync with the external alerting service:
//!
//! - [`AlertPolicy`]: a policy with an ordered list of [`Condition`]s
//! - [`NotificationChannel`]: a delivery channel attached to every policy its
//!   [`LabelSelector`] matches
//!
//! Both share [`ObjectMeta`] (identity, labels, finalizers, versions) and a
//! [`ResourceStatus`] written back by the reconciler.
//!
//! # Example
//!
//! ```rust
//! use alert_model::{AlertPolicy, ObjectMeta, Resource};
//!
//! let policy: AlertPolicy = serde_json::from_str(r#"{
//!     "metadata": {"name": "cpu", "namespace": "monitoring"},
//!     "spec": {"conditions": [{
//!         "kind": "apm",
//!         "name": "cpu high",
//!         "type": "apm_app_metric",
//!         "metric": "cpu",
//!         "criticalThreshold": {"operator": "above", "value": 80, "durationMinutes": 5}
//!     }]}
//! }"#).unwrap();
//!
//! assert!(policy.validate().is_ok());
//! assert_eq!(policy.id().to_string(), "monitoring/cpu");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::panic))]

pub mod channel;
pub mod condition;
pub mod error;
pub mod meta;
pub mod policy;
pub mod resource;
pub mod status;

pub use channel::{ChannelConfig, ChannelType, LabelSelector, NotificationChannel, NotificationChannelSpec};
pub use condition::{
    ApmCondition, ApmConditionType, Condition, ConditionKind, ConditionScope, InfraCondition,
    InfraConditionType, InfraThreshold, NrqlCondition, Threshold, ThresholdOperator,
    TimeFunction, UserDefinedMetric, UserValueFunction, ValueFunction,
};
pub use error::{ModelError, Result};
pub use meta::{DEFAULT_NAMESPACE, ObjectMeta, ResourceId};
pub use policy::{AlertPolicy, AlertPolicySpec, IncidentPreference};
pub use resource::{Resource, ResourceKind, validate_name};
pub use status::{Phase, ResourceStatus};
