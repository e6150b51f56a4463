//! The external alerting API the reconciler drives.
//!
//! [`AlertingApi`] covers exactly the calls the sync clients need. Every call
//! either succeeds or returns an [`ApiError`]; a missing object is always
//! reported as [`ApiError::NotFound`] so callers can treat it as absence.
//!
//! [`MemoryAlertingApi`] is a complete in-memory implementation. It records
//! every call and can be told to fail specific operations, which makes it the
//! backend for tests and for dry-run operation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;

use alert_model::{
    AlertPolicy, ChannelConfig, ChannelType, Condition, ConditionKind, IncidentPreference,
    NotificationChannel,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::ApiError;

/// Fields of an external policy the reconciler controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDefinition {
    /// Policy name.
    pub name: String,
    /// Incident grouping.
    pub incident_preference: IncidentPreference,
}

impl From<&AlertPolicy> for PolicyDefinition {
    fn from(policy: &AlertPolicy) -> Self {
        Self {
            name: policy.external_name().to_string(),
            incident_preference: policy.spec.incident_preference,
        }
    }
}

/// A policy as reported by the external system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalPolicy {
    /// External identifier.
    pub id: i64,
    /// Policy name.
    pub name: String,
    /// Incident grouping.
    pub incident_preference: IncidentPreference,
}

impl ExternalPolicy {
    /// Returns true if this policy already matches the definition.
    #[must_use]
    pub fn matches(&self, definition: &PolicyDefinition) -> bool {
        self.name == definition.name && self.incident_preference == definition.incident_preference
    }
}

/// Fields of an external channel the reconciler controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDefinition {
    /// Channel name.
    pub name: String,
    /// Delivery configuration.
    pub config: ChannelConfig,
}

impl From<&NotificationChannel> for ChannelDefinition {
    fn from(channel: &NotificationChannel) -> Self {
        Self {
            name: channel.external_name().to_string(),
            config: channel.spec.config.clone(),
        }
    }
}

/// A channel as reported by the external system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalChannel {
    /// External identifier.
    pub id: i64,
    /// Channel name.
    pub name: String,
    /// Delivery type.
    pub channel_type: ChannelType,
    /// Policies the channel is linked to.
    pub policy_ids: Vec<i64>,
}

/// Client for the external alerting service.
pub trait AlertingApi: Send + Sync {
    /// Fetches a policy.
    fn get_policy(&self, id: i64) -> impl Future<Output = Result<ExternalPolicy, ApiError>> + Send;

    /// Looks up a policy by exact name.
    fn find_policy_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<ExternalPolicy>, ApiError>> + Send;

    /// Creates a policy.
    fn create_policy(
        &self,
        definition: &PolicyDefinition,
    ) -> impl Future<Output = Result<ExternalPolicy, ApiError>> + Send;

    /// Updates a policy's name and incident preference.
    fn update_policy(
        &self,
        id: i64,
        definition: &PolicyDefinition,
    ) -> impl Future<Output = Result<ExternalPolicy, ApiError>> + Send;

    /// Deletes a policy together with its conditions.
    fn delete_policy(&self, id: i64) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Lists a policy's conditions of one kind, each carrying its external id.
    fn list_conditions(
        &self,
        policy_id: i64,
        kind: ConditionKind,
    ) -> impl Future<Output = Result<Vec<Condition>, ApiError>> + Send;

    /// Creates a condition under a policy and returns its id.
    fn create_condition(
        &self,
        policy_id: i64,
        condition: &Condition,
    ) -> impl Future<Output = Result<i64, ApiError>> + Send;

    /// Deletes a condition.
    fn delete_condition(
        &self,
        kind: ConditionKind,
        id: i64,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Fetches a channel with its policy links.
    fn get_channel(&self, id: i64) -> impl Future<Output = Result<ExternalChannel, ApiError>> + Send;

    /// Creates a channel.
    fn create_channel(
        &self,
        definition: &ChannelDefinition,
    ) -> impl Future<Output = Result<ExternalChannel, ApiError>> + Send;

    /// Deletes a channel.
    fn delete_channel(&self, id: i64) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Links a channel to a policy.
    fn link_policy(
        &self,
        policy_id: i64,
        channel_id: i64,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Removes the link between a channel and a policy.
    fn unlink_policy(
        &self,
        policy_id: i64,
        channel_id: i64,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// An operation of [`AlertingApi`], used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `get_policy`.
    GetPolicy,
    /// `find_policy_by_name`.
    FindPolicy,
    /// `create_policy`.
    CreatePolicy,
    /// `update_policy`.
    UpdatePolicy,
    /// `delete_policy`.
    DeletePolicy,
    /// `list_conditions`.
    ListConditions,
    /// `create_condition`.
    CreateCondition,
    /// `delete_condition`.
    DeleteCondition,
    /// `get_channel`.
    GetChannel,
    /// `create_channel`.
    CreateChannel,
    /// `delete_channel`.
    DeleteChannel,
    /// `link_policy`.
    LinkPolicy,
    /// `unlink_policy`.
    UnlinkPolicy,
}

impl Operation {
    /// Returns true for operations that change external state.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Self::GetPolicy | Self::FindPolicy | Self::ListConditions | Self::GetChannel
        )
    }
}

/// A call recorded by [`MemoryAlertingApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCall {
    /// The operation invoked.
    pub operation: Operation,
    /// The primary id the call targeted, if any.
    pub target: Option<i64>,
}

#[derive(Debug)]
struct StoredChannel {
    name: String,
    config: ChannelConfig,
    policy_ids: BTreeSet<i64>,
}

#[derive(Debug, Default)]
struct ApiState {
    next_id: i64,
    policies: BTreeMap<i64, ExternalPolicy>,
    conditions: BTreeMap<i64, (i64, Condition)>,
    channels: BTreeMap<i64, StoredChannel>,
    calls: Vec<ApiCall>,
    failures: HashMap<Operation, ApiError>,
}

impl ApiState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, operation: Operation, target: Option<i64>) -> Result<(), ApiError> {
        self.calls.push(ApiCall { operation, target });
        match self.failures.get(&operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn channel_view(&self, id: i64) -> Option<ExternalChannel> {
        self.channels.get(&id).map(|c| ExternalChannel {
            id,
            name: c.name.clone(),
            channel_type: c.config.channel_type(),
            policy_ids: c.policy_ids.iter().copied().collect(),
        })
    }
}

/// In-memory alerting service.
///
/// Cloning is cheap; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryAlertingApi {
    state: Arc<Mutex<ApiState>>,
}

impl MemoryAlertingApi {
    /// Creates an empty service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every future call of `operation` fail with `error`.
    pub fn fail(&self, operation: Operation, error: ApiError) {
        self.state.lock().failures.insert(operation, error);
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Returns every recorded call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().calls.clone()
    }

    /// Returns the recorded calls that change external state.
    #[must_use]
    pub fn mutations(&self) -> Vec<ApiCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.operation.is_mutation())
            .cloned()
            .collect()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Returns a policy without recording a call.
    #[must_use]
    pub fn policy(&self, id: i64) -> Option<ExternalPolicy> {
        self.state.lock().policies.get(&id).cloned()
    }

    /// Returns the number of policies.
    #[must_use]
    pub fn policy_count(&self) -> usize {
        self.state.lock().policies.len()
    }

    /// Returns a policy's conditions of every kind without recording a call.
    #[must_use]
    pub fn conditions_of(&self, policy_id: i64) -> Vec<Condition> {
        self.state
            .lock()
            .conditions
            .values()
            .filter(|(owner, _)| *owner == policy_id)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Returns a channel without recording a call.
    #[must_use]
    pub fn channel(&self, id: i64) -> Option<ExternalChannel> {
        self.state.lock().channel_view(id)
    }

    /// Returns the number of channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.state.lock().channels.len()
    }

    /// Adds a condition directly, as another client of the service would.
    pub fn insert_condition(&self, policy_id: i64, condition: Condition) -> i64 {
        let mut state = self.state.lock();
        let id = state.allocate_id();
        state
            .conditions
            .insert(id, (policy_id, condition.with_external_id(Some(id))));
        id
    }

    /// Removes a policy directly, as another client of the service would.
    pub fn remove_policy(&self, id: i64) {
        let mut state = self.state.lock();
        drop_policy(&mut state, id);
    }
}

fn drop_policy(state: &mut ApiState, id: i64) -> bool {
    if state.policies.remove(&id).is_none() {
        return false;
    }
    state.conditions.retain(|_, (owner, _)| *owner != id);
    for channel in state.channels.values_mut() {
        channel.policy_ids.remove(&id);
    }
    true
}

impl AlertingApi for MemoryAlertingApi {
    async fn get_policy(&self, id: i64) -> Result<ExternalPolicy, ApiError> {
        let mut state = self.state.lock();
        state.record(Operation::GetPolicy, Some(id))?;
        state
            .policies
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("policy {id}")))
    }

    async fn find_policy_by_name(&self, name: &str) -> Result<Option<ExternalPolicy>, ApiError> {
        let mut state = self.state.lock();
        state.record(Operation::FindPolicy, None)?;
        Ok(state.policies.values().find(|p| p.name == name).cloned())
    }

    async fn create_policy(&self, definition: &PolicyDefinition) -> Result<ExternalPolicy, ApiError> {
        let mut state = self.state.lock();
        state.record(Operation::CreatePolicy, None)?;
        let id = state.allocate_id();
        let policy = ExternalPolicy {
            id,
            name: definition.name.clone(),
            incident_preference: definition.incident_preference,
        };
        state.policies.insert(id, policy.clone());
        debug!(policy_id = id, name = %policy.name, "created policy");
        Ok(policy)
    }

    async fn update_policy(
        &self,
        id: i64,
        definition: &PolicyDefinition,
    ) -> Result<ExternalPolicy, ApiError> {
        let mut state = self.state.lock();
        state.record(Operation::UpdatePolicy, Some(id))?;
        let policy = state
            .policies
            .get_mut(&id)
            .ok_or_else(|| ApiError::not_found(format!("policy {id}")))?;
        policy.name.clone_from(&definition.name);
        policy.incident_preference = definition.incident_preference;
        Ok(policy.clone())
    }

    async fn delete_policy(&self, id: i64) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        state.record(Operation::DeletePolicy, Some(id))?;
        if drop_policy(&mut state, id) {
            Ok(())
        } else {
            Err(ApiError::not_found(format!("policy {id}")))
        }
    }

    async fn list_conditions(
        &self,
        policy_id: i64,
        kind: ConditionKind,
    ) -> Result<Vec<Condition>, ApiError> {
        let mut state = self.state.lock();
        state.record(Operation::ListConditions, Some(policy_id))?;
        if !state.policies.contains_key(&policy_id) {
            return Err(ApiError::not_found(format!("policy {policy_id}")));
        }
        Ok(state
            .conditions
            .values()
            .filter(|(owner, c)| *owner == policy_id && c.kind() == kind)
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn create_condition(&self, policy_id: i64, condition: &Condition) -> Result<i64, ApiError> {
        let mut state = self.state.lock();
        state.record(Operation::CreateCondition, Some(policy_id))?;
        if !state.policies.contains_key(&policy_id) {
            return Err(ApiError::not_found(format!("policy {policy_id}")));
        }
        let id = state.allocate_id();
        state
            .conditions
            .insert(id, (policy_id, condition.clone().with_external_id(Some(id))));
        Ok(id)
    }

    async fn delete_condition(&self, kind: ConditionKind, id: i64) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        state.record(Operation::DeleteCondition, Some(id))?;
        let exists = state
            .conditions
            .get(&id)
            .is_some_and(|(_, c)| c.kind() == kind);
        if !exists {
            return Err(ApiError::not_found(format!("{kind} condition {id}")));
        }
        state.conditions.remove(&id);
        Ok(())
    }

    async fn get_channel(&self, id: i64) -> Result<ExternalChannel, ApiError> {
        let mut state = self.state.lock();
        state.record(Operation::GetChannel, Some(id))?;
        state
            .channel_view(id)
            .ok_or_else(|| ApiError::not_found(format!("channel {id}")))
    }

    async fn create_channel(&self, definition: &ChannelDefinition) -> Result<ExternalChannel, ApiError> {
        let mut state = self.state.lock();
        state.record(Operation::CreateChannel, None)?;
        let id = state.allocate_id();
        state.channels.insert(
            id,
            StoredChannel {
                name: definition.name.clone(),
                config: definition.config.clone(),
                policy_ids: BTreeSet::new(),
            },
        );
        debug!(channel_id = id, name = %definition.name, "created channel");
        state
            .channel_view(id)
            .ok_or_else(|| ApiError::not_found(format!("channel {id}")))
    }

    async fn delete_channel(&self, id: i64) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        state.record(Operation::DeleteChannel, Some(id))?;
        state
            .channels
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ApiError::not_found(format!("channel {id}")))
    }

    async fn link_policy(&self, policy_id: i64, channel_id: i64) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        state.record(Operation::LinkPolicy, Some(policy_id))?;
        if !state.policies.contains_key(&policy_id) {
            return Err(ApiError::not_found(format!("policy {policy_id}")));
        }
        let channel = state
            .channels
            .get_mut(&channel_id)
            .ok_or_else(|| ApiError::not_found(format!("channel {channel_id}")))?;
        channel.policy_ids.insert(policy_id);
        Ok(())
    }

    async fn unlink_policy(&self, policy_id: i64, channel_id: i64) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        state.record(Operation::UnlinkPolicy, Some(policy_id))?;
        let channel = state
            .channels
            .get_mut(&channel_id)
            .ok_or_else(|| ApiError::not_found(format!("channel {channel_id}")))?;
        if channel.policy_ids.remove(&policy_id) {
            Ok(())
        } else {
            Err(ApiError::not_found(format!(
                "link between policy {policy_id} and channel {channel_id}"
            )))
        }
    }
}
