//! Finalizer-gated deletion.
//!
//! The finalizer marker is added before anything is created externally and is
//! removed only after the external object is gone, so a resource can never
//! disappear locally while it still owns external state.

use std::marker::PhantomData;
use std::sync::Arc;

use alert_model::Resource;
use tracing::{debug, info};

use crate::error::{ReconcileError, Result, StoreError};
use crate::retry::RetryPolicy;
use crate::store::ResourceStore;
use crate::sync::ExternalSync;

/// Marker guarding external cleanup.
pub const FINALIZER: &str = "alert-operator.io/external-cleanup";

/// Where a resource is in the deletion lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerState {
    /// Not yet claimed by the reconciler.
    NoFinalizer,
    /// Claimed; external state may exist.
    FinalizerSet,
    /// Deletion requested; external cleanup outstanding.
    DeletionPending,
    /// Deletion requested and cleanup done; the store may remove it.
    Deleted,
}

impl FinalizerState {
    /// Derives the state from a resource's metadata.
    #[must_use]
    pub fn of<R: Resource>(resource: &R) -> Self {
        let meta = resource.meta();
        match (meta.is_deleting(), meta.has_finalizer(FINALIZER)) {
            (false, false) => Self::NoFinalizer,
            (false, true) => Self::FinalizerSet,
            (true, true) => Self::DeletionPending,
            (true, false) => Self::Deleted,
        }
    }
}

/// Outcome of [`FinalizerManager::ensure`].
#[derive(Debug)]
pub enum Ensured<R> {
    /// The marker was added; the stored object is returned.
    Added(R),
    /// The marker was already present.
    AlreadyPresent,
    /// Another writer got there first; retry on the next cycle.
    Conflicted,
}

/// Adds and removes the reconciler's finalizer.
#[derive(Debug)]
pub struct FinalizerManager<R, S> {
    store: Arc<S>,
    retry: RetryPolicy,
    _kind: PhantomData<fn() -> R>,
}

impl<R: Resource, S: ResourceStore<R>> FinalizerManager<R, S> {
    /// Creates a manager over `store`.
    #[must_use]
    pub const fn new(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            _kind: PhantomData,
        }
    }

    /// Adds the finalizer to a live resource.
    ///
    /// A conflicting write is not retried here; the caller should requeue.
    ///
    /// # Errors
    ///
    /// Returns any non-conflict store error.
    pub async fn ensure(&self, resource: &R) -> Result<Ensured<R>> {
        if resource.meta().has_finalizer(FINALIZER) {
            return Ok(Ensured::AlreadyPresent);
        }

        let mut claimed = resource.clone();
        claimed.meta_mut().add_finalizer(FINALIZER);
        match self.store.update(&claimed).await {
            Ok(updated) => {
                debug!(resource = %resource.id(), "added finalizer");
                Ok(Ensured::Added(updated))
            }
            Err(StoreError::Conflict { .. }) => {
                info!(resource = %resource.id(), "finalizer write conflicted; will retry");
                Ok(Ensured::Conflicted)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Tears down external state, then releases the finalizer.
    ///
    /// If teardown fails the finalizer stays in place and the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the teardown error, a non-conflict store error, or
    /// `ReconcileError::RetriesExhausted`.
    pub async fn finalize<E: ExternalSync<R>>(&self, resource: &R, sync: &E) -> Result<()> {
        if !resource.meta().has_finalizer(FINALIZER) {
            return Ok(());
        }
        sync.teardown(resource).await?;
        self.release(resource).await
    }

    /// Removes the finalizer, retrying on conflict. A resource that is
    /// already gone counts as released.
    async fn release(&self, resource: &R) -> Result<()> {
        let id = resource.id();
        let mut current = resource.clone();

        for attempt in 1..=self.retry.max_attempts {
            if !current.meta_mut().remove_finalizer(FINALIZER) {
                return Ok(());
            }
            match self.store.update(&current).await {
                Ok(_) | Err(StoreError::NotFound { .. }) => {
                    info!(resource = %id, "released finalizer");
                    return Ok(());
                }
                Err(StoreError::Conflict { .. }) => {
                    debug!(resource = %id, attempt, "finalizer release conflicted; refetching");
                    if attempt == self.retry.max_attempts {
                        break;
                    }
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                    current = match self.store.get(&id).await {
                        Ok(fresh) => fresh,
                        Err(StoreError::NotFound { .. }) => return Ok(()),
                        Err(e) => return Err(e.into()),
                    };
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ReconcileError::RetriesExhausted {
            id,
            attempts: self.retry.max_attempts,
        })
    }
}
