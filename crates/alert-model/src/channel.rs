//! The `NotificationChannel` resource and its policy selector.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::meta::ObjectMeta;
use crate::resource::{Resource, ResourceKind, validate_name, version_of};
use crate::status::ResourceStatus;

/// A label predicate selecting policies.
///
/// An empty selector matches every policy, following label-set semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Labels a policy must carry, all with equal values.
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Creates a selector from label pairs.
    pub fn from_labels<K, V>(labels: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            match_labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns true if the labels satisfy this selector.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}

/// Kind of delivery a channel performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// Slack incoming webhook.
    Slack,
    /// Email.
    Email,
    /// Generic HTTP webhook.
    Webhook,
}

impl ChannelType {
    /// Returns the type as used by the external API.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Slack => "slack",
            Self::Email => "email",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery configuration of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelConfig {
    /// Post to a Slack webhook.
    Slack {
        /// Incoming webhook URL.
        url: String,
        /// Optional channel override.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
    },
    /// Send email.
    Email {
        /// Comma-joined on the wire.
        recipients: Vec<String>,
        /// Attach the incident JSON.
        #[serde(default, rename = "includeJsonAttachment")]
        include_json_attachment: bool,
    },
    /// POST to an HTTP endpoint.
    Webhook {
        /// Target URL.
        #[serde(rename = "baseUrl")]
        base_url: String,
        /// Extra request headers.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
}

impl ChannelConfig {
    /// Returns the channel type.
    #[must_use]
    pub const fn channel_type(&self) -> ChannelType {
        match self {
            Self::Slack { .. } => ChannelType::Slack,
            Self::Email { .. } => ChannelType::Email,
            Self::Webhook { .. } => ChannelType::Webhook,
        }
    }

    fn check(&self) -> std::result::Result<(), String> {
        match self {
            Self::Slack { url, .. } if url.trim().is_empty() => {
                Err("slack url cannot be empty".to_string())
            }
            Self::Email { recipients, .. } if recipients.is_empty() => {
                Err("email channel needs at least one recipient".to_string())
            }
            Self::Email { recipients, .. } if recipients.iter().any(|r| !r.contains('@')) => {
                Err("email recipients must be addresses".to_string())
            }
            Self::Webhook { base_url, .. } if base_url.trim().is_empty() => {
                Err("webhook baseUrl cannot be empty".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Desired state of a notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationChannelSpec {
    /// External channel name; defaults to the resource name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Delivery configuration.
    pub config: ChannelConfig,
    /// Policies this channel is attached to.
    #[serde(default)]
    pub policy_selector: LabelSelector,
}

/// A declaratively managed notification channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationChannel {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Desired state.
    pub spec: NotificationChannelSpec,
    /// Last applied state.
    #[serde(default)]
    pub status: ResourceStatus,
}

impl NotificationChannel {
    /// Creates a channel with the given configuration and an empty selector.
    #[must_use]
    pub fn new(metadata: ObjectMeta, config: ChannelConfig) -> Self {
        Self {
            metadata,
            spec: NotificationChannelSpec {
                name: None,
                config,
                policy_selector: LabelSelector::default(),
            },
            status: ResourceStatus::default(),
        }
    }

    /// Sets the policy selector.
    #[must_use]
    pub fn with_selector(mut self, selector: LabelSelector) -> Self {
        self.spec.policy_selector = selector;
        self
    }

    /// Returns the name used for the external channel.
    #[must_use]
    pub fn external_name(&self) -> &str {
        self.spec
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.metadata.name)
    }

    /// Returns true if this channel selects policies with the given labels.
    #[must_use]
    pub fn selects(&self, labels: &BTreeMap<String, String>) -> bool {
        self.spec.policy_selector.matches(labels)
    }
}

impl Resource for NotificationChannel {
    const KIND: ResourceKind = ResourceKind::NotificationChannel;

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

    /// Hash of the delivery settings only. The external channel cannot be
    /// modified in place, so this is what decides whether it is recreated;
    /// selector edits only change links.
    fn config_version(&self) -> Result<String> {
        version_of(&serde_json::json!({
            "name": self.external_name(),
            "config": serde_json::to_value(&self.spec.config)?,
        }))
    }

    fn validate(&self) -> Result<()> {
        validate_name(Self::KIND, &self.metadata.name)?;
        validate_name(Self::KIND, &self.metadata.namespace)?;
        self.spec.config.check().map_err(|reason| ModelError::Invalid {
            kind: Self::KIND.as_str(),
            name: self.metadata.name.clone(),
            reason,
        })
    }
}
