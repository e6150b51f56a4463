//! Conflict-tolerant status writes.

use std::marker::PhantomData;
use std::sync::Arc;

use alert_model::{Resource, ResourceStatus};
use tracing::debug;

use crate::error::{ReconcileError, Result, StoreError};
use crate::retry::RetryPolicy;
use crate::store::ResourceStore;

/// Writes status with optimistic concurrency.
///
/// On a version conflict the latest object is re-fetched, the intended status
/// is laid over it and the write is retried, up to the policy's bound.
#[derive(Debug)]
pub struct StatusUpdater<R, S> {
    store: Arc<S>,
    retry: RetryPolicy,
    _kind: PhantomData<fn() -> R>,
}

impl<R: Resource, S: ResourceStore<R>> StatusUpdater<R, S> {
    /// Creates an updater over `store`.
    #[must_use]
    pub const fn new(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            _kind: PhantomData,
        }
    }

    /// Writes `status` onto `resource` and returns the stored object.
    ///
    /// # Errors
    ///
    /// Returns the first non-conflict store error, or
    /// `ReconcileError::RetriesExhausted` once the attempt bound is reached.
    pub async fn update(&self, resource: &R, status: ResourceStatus) -> Result<R> {
        let id = resource.id();
        let mut current = resource.clone();
        *current.status_mut() = status.clone();

        for attempt in 1..=self.retry.max_attempts {
            match self.store.update_status(&current).await {
                Ok(updated) => return Ok(updated),
                Err(StoreError::Conflict { version, .. }) => {
                    debug!(
                        resource = %id,
                        attempt,
                        stale_version = version,
                        "status write conflicted; refetching"
                    );
                    if attempt == self.retry.max_attempts {
                        break;
                    }
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                    current = self.store.get(&id).await?;
                    *current.status_mut() = status.clone();
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

#[cfg(test)]
pub(crate) mod flaky {
    //! Store wrappers that lose races or fail writes on purpose.

    use std::sync::atomic::{AtomicU32, Ordering};

    use alert_model::{AlertPolicy, NotificationChannel, ResourceId};

    use crate::error::StoreError;
    use crate::store::{MemoryStore, ResourceStore};

    /// Before each of the first `conflicts` writes, another writer bumps the
    /// stored object so the write carries a stale version.
    #[derive(Debug)]
    pub(crate) struct RacingStore {
        pub(crate) inner: MemoryStore,
        conflicts: AtomicU32,
    }

    impl RacingStore {
        pub(crate) fn new(inner: MemoryStore, conflicts: u32) -> Self {
            Self {
                inner,
                conflicts: AtomicU32::new(conflicts),
            }
        }

        async fn race(&self, id: &ResourceId) {
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining == 0 {
                return;
            }
            self.conflicts.store(remaining - 1, Ordering::SeqCst);
            if let Ok(mut other) = ResourceStore::<AlertPolicy>::get(&self.inner, id).await {
                other
                    .metadata
                    .labels
                    .insert("touched".to_string(), remaining.to_string());
                let _ = ResourceStore::update(&self.inner, &other).await;
            }
        }
    }

    impl ResourceStore<AlertPolicy> for RacingStore {
        async fn get(&self, id: &ResourceId) -> Result<AlertPolicy, StoreError> {
            ResourceStore::<AlertPolicy>::get(&self.inner, id).await
        }

        async fn list(&self, namespace: Option<&str>) -> Result<Vec<AlertPolicy>, StoreError> {
            ResourceStore::<AlertPolicy>::list(&self.inner, namespace).await
        }

        async fn update(&self, resource: &AlertPolicy) -> Result<AlertPolicy, StoreError> {
            self.race(&resource.metadata.id()).await;
            ResourceStore::update(&self.inner, resource).await
        }

        async fn update_status(&self, resource: &AlertPolicy) -> Result<AlertPolicy, StoreError> {
            self.race(&resource.metadata.id()).await;
            self.inner.update_status(resource).await
        }
    }

    /// Fails exactly one status write, the `fail_at`-th, with a backend error.
    #[derive(Debug)]
    pub(crate) struct FailingStatusStore {
        pub(crate) inner: MemoryStore,
        fail_at: u32,
        writes: AtomicU32,
    }

    impl FailingStatusStore {
        pub(crate) fn new(inner: MemoryStore, fail_at: u32) -> Self {
            Self {
                inner,
                fail_at,
                writes: AtomicU32::new(0),
            }
        }
    }

    impl ResourceStore<NotificationChannel> for FailingStatusStore {
        async fn get(&self, id: &ResourceId) -> Result<NotificationChannel, StoreError> {
            ResourceStore::<NotificationChannel>::get(&self.inner, id).await
        }

        async fn list(
            &self,
            namespace: Option<&str>,
        ) -> Result<Vec<NotificationChannel>, StoreError> {
            ResourceStore::<NotificationChannel>::list(&self.inner, namespace).await
        }

        async fn update(
            &self,
            resource: &NotificationChannel,
        ) -> Result<NotificationChannel, StoreError> {
            ResourceStore::update(&self.inner, resource).await
        }

        async fn update_status(
            &self,
            resource: &NotificationChannel,
        ) -> Result<NotificationChannel, StoreError> {
            let write = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
            if write == self.fail_at {
                return Err(StoreError::Backend("disk full".to_string()));
            }
            self.inner.update_status(resource).await
        }
    }
}
