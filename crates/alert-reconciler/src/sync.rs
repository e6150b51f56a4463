//! Applying a resource's desired shape to the external system.
//!
//! Each sync client queries the external collection belonging to a resource,
//! diffs it against the spec and issues one delete per stale element and one
//! create per missing element. The first failing call aborts the remaining
//! sequence; work already done is not rolled back, since the next reconcile
//! diffs against whatever state was left behind.

use std::future::Future;
use std::sync::Arc;

use alert_model::{AlertPolicy, ConditionKind, NotificationChannel, Resource};
use tracing::{debug, info, warn};

use crate::api::{AlertingApi, ChannelDefinition, ExternalChannel, ExternalPolicy, PolicyDefinition};
use crate::diff::{ConditionSet, MemberSet, diff};
use crate::error::{ApiError, ReconcileError};
use crate::store::ResourceStore;

/// Result of a successful sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// External id of the synced object.
    pub external_id: i64,
    /// Elements created.
    pub created: usize,
    /// Elements deleted.
    pub deleted: usize,
}

impl SyncOutcome {
    const fn new(external_id: i64) -> Self {
        Self {
            external_id,
            created: 0,
            deleted: 0,
        }
    }
}

/// A failed sync, with the external id known at the point of failure.
#[derive(Debug)]
pub struct SyncFailure {
    /// External id of the object, if one exists.
    pub external_id: Option<i64>,
    /// The object itself matches the spec; only its children do not.
    pub object_synced: bool,
    /// What failed.
    pub error: ReconcileError,
}

impl SyncFailure {
    fn new(external_id: Option<i64>, error: impl Into<ReconcileError>) -> Self {
        Self {
            external_id,
            object_synced: false,
            error: error.into(),
        }
    }

    const fn after_object(mut self) -> Self {
        self.object_synced = true;
        self
    }
}

/// Synchronizes one resource kind with the external system.
///
/// `resource` always carries the status as it was when the reconcile began.
pub trait ExternalSync<R: Resource>: Send + Sync {
    /// Makes external state match the resource's spec.
    fn sync(&self, resource: &R) -> impl Future<Output = Result<SyncOutcome, SyncFailure>> + Send;

    /// Deletes the resource's external object. Absence counts as success.
    fn teardown(&self, resource: &R) -> impl Future<Output = Result<(), ReconcileError>> + Send;
}

/// Treats a not-found error as success.
fn absent_ok(result: Result<(), ApiError>) -> Result<bool, ApiError> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Syncs alert policies and their conditions.
#[derive(Debug)]
pub struct PolicySync<A> {
    api: Arc<A>,
}

impl<A: AlertingApi> PolicySync<A> {
    /// Creates a policy sync client.
    #[must_use]
    pub const fn new(api: Arc<A>) -> Self {
        Self { api }
    }

    async fn ensure_policy(&self, policy: &AlertPolicy) -> Result<ExternalPolicy, ApiError> {
        let definition = PolicyDefinition::from(policy);
        let id = policy.id();

        if let Some(external_id) = policy.status.external_id {
            match self.api.get_policy(external_id).await {
                Ok(existing) if existing.matches(&definition) => return Ok(existing),
                Ok(_) => {
                    info!(resource = %id, external_id, "updating drifted policy");
                    return self.api.update_policy(external_id, &definition).await;
                }
                Err(e) if e.is_not_found() => {
                    warn!(resource = %id, external_id, "external policy missing; recreating");
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(existing) = self.api.find_policy_by_name(&definition.name).await? {
            info!(resource = %id, external_id = existing.id, "adopting policy with matching name");
            if existing.matches(&definition) {
                return Ok(existing);
            }
            return self.api.update_policy(existing.id, &definition).await;
        }

        let created = self.api.create_policy(&definition).await?;
        info!(resource = %id, external_id = created.id, "created policy");
        Ok(created)
    }

    async fn sync_conditions(
        &self,
        policy: &AlertPolicy,
        policy_id: i64,
    ) -> Result<SyncOutcome, ApiError> {
        let mut outcome = SyncOutcome::new(policy_id);

        for kind in ConditionKind::ALL {
            let desired: ConditionSet = policy.conditions_of(kind).cloned().collect();
            let actual: ConditionSet = match self.api.list_conditions(policy_id, kind).await {
                Ok(conditions) => conditions.into_iter().collect(),
                Err(e) if e.is_not_found() => ConditionSet::new(),
                Err(e) => return Err(e),
            };

            let changes = diff(&desired, &actual);
            if changes.is_empty() {
                continue;
            }
            debug!(
                resource = %policy.id(),
                %kind,
                to_delete = changes.to_delete.len(),
                to_create = changes.to_create.len(),
                "syncing conditions"
            );

            for condition in &changes.to_delete {
                let Some(condition_id) = condition.external_id() else {
                    warn!(resource = %policy.id(), %condition, "listed condition has no id");
                    continue;
                };
                absent_ok(self.api.delete_condition(kind, condition_id).await)?;
                outcome.deleted += 1;
            }
            for condition in &changes.to_create {
                let unsaved = condition.clone().with_external_id(None);
                let condition_id = self.api.create_condition(policy_id, &unsaved).await?;
                debug!(resource = %policy.id(), condition_id, %condition, "created condition");
                outcome.created += 1;
            }
        }
        Ok(outcome)
    }
}

impl<A: AlertingApi> ExternalSync<AlertPolicy> for PolicySync<A> {
    async fn sync(&self, policy: &AlertPolicy) -> Result<SyncOutcome, SyncFailure> {
        let external = self
            .ensure_policy(policy)
            .await
            .map_err(|e| SyncFailure::new(policy.status.external_id, e))?;
        self.sync_conditions(policy, external.id)
            .await
            .map_err(|e| SyncFailure::new(Some(external.id), e).after_object())
    }

    async fn teardown(&self, policy: &AlertPolicy) -> Result<(), ReconcileError> {
        let Some(external_id) = policy.status.external_id else {
            return Ok(());
        };
        if absent_ok(self.api.delete_policy(external_id).await)? {
            info!(resource = %policy.id(), external_id, "deleted policy");
        } else {
            debug!(resource = %policy.id(), external_id, "policy already gone");
        }
        Ok(())
    }
}

/// Syncs notification channels and their policy links.
///
/// Linked policies are resolved from the store on every sync.
#[derive(Debug)]
pub struct ChannelSync<A, S> {
    api: Arc<A>,
    policies: Arc<S>,
}

impl<A: AlertingApi, S: ResourceStore<AlertPolicy>> ChannelSync<A, S> {
    /// Creates a channel sync client.
    #[must_use]
    pub const fn new(api: Arc<A>, policies: Arc<S>) -> Self {
        Self { api, policies }
    }

    /// External ids of the selected policies that exist externally.
    ///
    /// Phase is ignored: a policy is Pending for the whole of its own
    /// reconcile and must stay linked meanwhile.
    async fn selected_policies(
        &self,
        channel: &NotificationChannel,
    ) -> Result<MemberSet<i64>, ReconcileError> {
        let policies = self
            .policies
            .list(Some(&channel.metadata.namespace))
            .await?;
        Ok(policies
            .iter()
            .filter(|p| !p.metadata.is_deleting())
            .filter(|p| channel.selects(&p.metadata.labels))
            .filter_map(|p| p.status.external_id)
            .collect())
    }

    /// Returns the external channel, recreating it when the recorded
    /// delivery version differs from `version`.
    async fn ensure_channel(
        &self,
        channel: &NotificationChannel,
        version: &str,
    ) -> Result<ExternalChannel, ApiError> {
        let id = channel.id();
        let status = &channel.status;

        if let Some(external_id) = status.external_id {
            match self.api.get_channel(external_id).await {
                Ok(existing) if status.config_version.as_deref() == Some(version) => {
                    return Ok(existing);
                }
                Ok(existing) => {
                    info!(resource = %id, external_id, "channel configuration changed; recreating");
                    absent_ok(self.api.delete_channel(existing.id).await)?;
                }
                Err(e) if e.is_not_found() => {
                    warn!(resource = %id, external_id, "external channel missing; recreating");
                }
                Err(e) => return Err(e),
            }
        }

        let created = self
            .api
            .create_channel(&ChannelDefinition::from(channel))
            .await?;
        info!(resource = %id, external_id = created.id, "created channel");
        Ok(created)
    }

    async fn sync_links(
        &self,
        channel: &NotificationChannel,
        external: &ExternalChannel,
    ) -> Result<SyncOutcome, ReconcileError> {
        let desired = self.selected_policies(channel).await?;
        let actual: MemberSet<i64> = external.policy_ids.iter().copied().collect();
        let changes = diff(&desired, &actual);
        let mut outcome = SyncOutcome::new(external.id);

        for policy_id in changes.to_delete {
            absent_ok(self.api.unlink_policy(policy_id, external.id).await)?;
            debug!(resource = %channel.id(), policy_id, "unlinked policy");
            outcome.deleted += 1;
        }
        for policy_id in changes.to_create {
            self.api.link_policy(policy_id, external.id).await?;
            debug!(resource = %channel.id(), policy_id, "linked policy");
            outcome.created += 1;
        }
        Ok(outcome)
    }
}

impl<A: AlertingApi, S: ResourceStore<AlertPolicy>> ExternalSync<NotificationChannel>
    for ChannelSync<A, S>
{
    async fn sync(&self, channel: &NotificationChannel) -> Result<SyncOutcome, SyncFailure> {
        let version = channel
            .config_version()
            .map_err(|e| SyncFailure::new(channel.status.external_id, e))?;
        let external = self
            .ensure_channel(channel, &version)
            .await
            .map_err(|e| SyncFailure::new(channel.status.external_id, e))?;
        self.sync_links(channel, &external)
            .await
            .map_err(|e| SyncFailure::new(Some(external.id), e).after_object())
    }

    async fn teardown(&self, channel: &NotificationChannel) -> Result<(), ReconcileError> {
        let Some(external_id) = channel.status.external_id else {
            return Ok(());
        };
        if absent_ok(self.api.delete_channel(external_id).await)? {
            info!(resource = %channel.id(), external_id, "deleted channel");
        } else {
            debug!(resource = %channel.id(), external_id, "channel already gone");
        }
        Ok(())
    }
}
