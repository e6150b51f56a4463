//! The per-resource reconciliation state machine.

use std::sync::Arc;

use alert_model::{Resource, ResourceId, ResourceStatus};
use tracing::{debug, info, instrument, warn};

use crate::error::{ReconcileError, Result, StoreError};
use crate::finalizer::{Ensured, FinalizerManager, FinalizerState};
use crate::retry::RetryPolicy;
use crate::status::StatusUpdater;
use crate::store::ResourceStore;
use crate::sync::ExternalSync;

/// What the caller should do after a successful reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// External state matches; wait for the next event.
    Converged,
    /// Run again shortly.
    Requeue,
}

impl Action {
    /// Returns true if the identity should be reconciled again.
    #[must_use]
    pub const fn requeue(&self) -> bool {
        matches!(self, Self::Requeue)
    }
}

/// Drives one resource kind towards its desired external state.
///
/// The store and sync client are passed in at construction; nothing is
/// shared through globals.
#[derive(Debug)]
pub struct Controller<R, S, E> {
    store: Arc<S>,
    sync: E,
    status: StatusUpdater<R, S>,
    finalizers: FinalizerManager<R, S>,
}

impl<R, S, E> Controller<R, S, E>
where
    R: Resource,
    S: ResourceStore<R>,
    E: ExternalSync<R>,
{
    /// Creates a controller.
    #[must_use]
    pub fn new(store: Arc<S>, sync: E, retry: RetryPolicy) -> Self {
        Self {
            status: StatusUpdater::new(Arc::clone(&store), retry),
            finalizers: FinalizerManager::new(Arc::clone(&store), retry),
            store,
            sync,
        }
    }

    /// Reconciles one identity.
    ///
    /// A resource that no longer exists is a no-op success. Every failure
    /// other than a status-write conflict is recorded on the resource's status
    /// before it is returned.
    ///
    /// # Errors
    ///
    /// Returns the store, API or validation error that stopped the reconcile.
    #[instrument(skip(self, id), fields(kind = %R::KIND, resource = %id))]
    pub async fn reconcile(&self, id: &ResourceId) -> Result<Action> {
        let resource = match self.store.get(id).await {
            Ok(resource) => resource,
            Err(StoreError::NotFound { .. }) => {
                debug!("resource is gone; nothing to do");
                return Ok(Action::Converged);
            }
            Err(e) => return Err(e.into()),
        };

        match FinalizerState::of(&resource) {
            FinalizerState::DeletionPending => return self.delete(resource).await,
            FinalizerState::Deleted => return Ok(Action::Converged),
            FinalizerState::NoFinalizer | FinalizerState::FinalizerSet => {}
        }

        let resource = match self.finalizers.ensure(&resource).await? {
            Ensured::Added(updated) => updated,
            Ensured::AlreadyPresent => resource,
            Ensured::Conflicted => return Ok(Action::Requeue),
        };

        self.apply(resource).await
    }

    async fn apply(&self, resource: R) -> Result<Action> {
        let generation = resource.meta().generation;
        let external_id = resource.status().external_id;
        let applied = resource.status().config_version.clone();
        let version = resource.config_version()?;

        let pending = self
            .status
            .update(
                &resource,
                ResourceStatus::pending(external_id, applied.clone()).observing(generation),
            )
            .await?;

        if let Err(e) = resource.validate() {
            let err = ReconcileError::Invalid(e);
            warn!(error = %err, "resource is invalid; skipping sync");
            self.record_error(&pending, external_id, applied, &err).await;
            return Err(err);
        }

        match self.sync.sync(&resource).await {
            Ok(outcome) => {
                let ready = ResourceStatus::ready(outcome.external_id, &version).observing(generation);
                if let Err(err) = self.status.update(&pending, ready).await {
                    // The external object exists now; its id must not be lost.
                    warn!(error = %err, external_id = outcome.external_id, "failed to record ready status");
                    self.record_error(&pending, Some(outcome.external_id), Some(version), &err)
                        .await;
                    return Err(err);
                }
                info!(
                    external_id = outcome.external_id,
                    created = outcome.created,
                    deleted = outcome.deleted,
                    "reconciled"
                );
                Ok(Action::Converged)
            }
            Err(failure) => {
                warn!(error = %failure.error, "sync failed");
                let known = if failure.object_synced {
                    Some(version)
                } else {
                    applied
                };
                self.record_error(&pending, failure.external_id, known, &failure.error)
                    .await;
                Err(failure.error)
            }
        }
    }

    async fn delete(&self, resource: R) -> Result<Action> {
        match self.finalizers.finalize(&resource, &self.sync).await {
            Ok(()) => {
                info!("external cleanup complete");
                Ok(Action::Converged)
            }
            Err(err) => {
                warn!(error = %err, "external cleanup failed; keeping finalizer");
                let status = resource.status();
                self.record_error(
                    &resource,
                    status.external_id,
                    status.config_version.clone(),
                    &err,
                )
                .await;
                Err(err)
            }
        }
    }

    /// Writes an Error status. A failure to do so is logged, not returned,
    /// so the original error reaches the caller.
    async fn record_error(
        &self,
        resource: &R,
        external_id: Option<i64>,
        version: Option<String>,
        err: &ReconcileError,
    ) {
        let generation = resource.meta().generation;
        let status = ResourceStatus::error(external_id, version, err).observing(generation);
        if let Err(write_err) = self.status.update(resource, status).await {
            warn!(error = %write_err, "failed to record error status");
        }
    }
}
