//! The resource store the reconciler reads from and writes status to.
//!
//! [`ResourceStore`] is the collaborator boundary: identity-keyed reads,
//! optimistic-concurrency writes guarded by `resource_version`, and listing for
//! dependency resolution. [`MemoryStore`] is the in-process implementation used
//! by the operator binary and by tests. Besides the controller-facing trait it
//! offers the hosting-system operations (`apply`, `request_delete`), publishes
//! a [`StoreEvent`] for every observable change, and can be persisted as a JSON
//! snapshot.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use alert_model::{
    AlertPolicy, NotificationChannel, Resource, ResourceId, ResourceKind, ResourceStatus,
};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;

/// Capacity of the store event channel.
pub const EVENT_BUFFER: usize = 1024;

/// Access to stored resources of one kind.
pub trait ResourceStore<R: Resource>: Send + Sync {
    /// Fetches a resource by identity.
    fn get(&self, id: &ResourceId) -> impl Future<Output = Result<R, StoreError>> + Send;

    /// Lists resources, optionally restricted to one namespace.
    fn list(
        &self,
        namespace: Option<&str>,
    ) -> impl Future<Output = Result<Vec<R>, StoreError>> + Send;

    /// Writes metadata and spec. Fails with `Conflict` if the resource version
    /// is stale. Status is left untouched.
    fn update(&self, resource: &R) -> impl Future<Output = Result<R, StoreError>> + Send;

    /// Writes status only. Fails with `Conflict` if the resource version is stale.
    fn update_status(&self, resource: &R) -> impl Future<Output = Result<R, StoreError>> + Send;
}

/// What changed in a [`StoreEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Created or spec changed.
    Applied {
        /// The new generation.
        generation: u64,
    },
    /// Labels or finalizers changed.
    MetadataChanged,
    /// Status changed.
    StatusChanged,
    /// Deletion was requested while finalizers remain.
    DeletionRequested,
    /// The object is gone.
    Removed,
}

/// A change to a stored resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    /// Kind of the changed resource.
    pub kind: ResourceKind,
    /// Identity of the changed resource.
    pub id: ResourceId,
    /// What changed.
    pub change: Change,
}

/// Objects of one kind, keyed by identity.
#[derive(Debug)]
pub struct Collection<R> {
    objects: RwLock<BTreeMap<ResourceId, R>>,
}

impl<R> Default for Collection<R> {
    fn default() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
        }
    }
}

/// Resource kinds held by [`MemoryStore`].
pub trait StoredKind: Resource {
    /// Returns the collection holding this kind.
    fn collection(store: &MemoryStore) -> &Collection<Self>;
}

impl StoredKind for AlertPolicy {
    fn collection(store: &MemoryStore) -> &Collection<Self> {
        &store.inner.policies
    }
}

impl StoredKind for NotificationChannel {
    fn collection(store: &MemoryStore) -> &Collection<Self> {
        &store.inner.channels
    }
}

#[derive(Debug)]
struct Inner {
    policies: Collection<AlertPolicy>,
    channels: Collection<NotificationChannel>,
    next_version: AtomicU64,
    events: broadcast::Sender<StoreEvent>,
}

/// On-disk form of a [`MemoryStore`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    policies: Vec<AlertPolicy>,
    #[serde(default)]
    channels: Vec<NotificationChannel>,
}

/// In-memory resource store with change events.
///
/// Cloning is cheap; clones share state.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(Inner {
                policies: Collection::default(),
                channels: Collection::default(),
                next_version: AtomicU64::new(1),
                events,
            }),
        }
    }

    /// Subscribes to change events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Creates or replaces a resource as submitted by a user.
    ///
    /// Store-owned fields (uid, finalizers, status, deletion timestamp,
    /// versions) are never taken from the input. The generation is bumped only
    /// when the spec changes; an identical resubmission is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` if the spec cannot be encoded.
    pub fn apply<R: StoredKind>(&self, mut resource: R) -> Result<R, StoreError> {
        let id = resource.id();
        let spec = spec_of(&resource)?;
        let mut objects = R::collection(self).objects.write();

        let change = if let Some(existing) = objects.get(&id) {
            let spec_changed = spec_of(existing)? != spec;
            if !spec_changed && existing.meta().labels == resource.meta().labels {
                return Ok(existing.clone());
            }
            let old = existing.meta();
            let generation = old.generation + u64::from(spec_changed);
            let meta = resource.meta_mut();
            meta.uid.clone_from(&old.uid);
            meta.finalizers.clone_from(&old.finalizers);
            meta.deletion_timestamp = old.deletion_timestamp;
            meta.generation = generation;
            *resource.status_mut() = existing.status().clone();
            if spec_changed {
                Change::Applied { generation }
            } else {
                Change::MetadataChanged
            }
        } else {
            let meta = resource.meta_mut();
            meta.uid = Some(Uuid::new_v4().to_string());
            meta.finalizers.clear();
            meta.deletion_timestamp = None;
            meta.generation = 1;
            *resource.status_mut() = ResourceStatus::default();
            Change::Applied { generation: 1 }
        };

        resource.meta_mut().resource_version = self.next_version();
        objects.insert(id.clone(), resource.clone());
        drop(objects);

        self.publish(R::KIND, id, change);
        Ok(resource)
    }

    /// Requests deletion of a resource.
    ///
    /// Without finalizers the object is removed at once; otherwise its
    /// deletion timestamp is set and removal waits for the last finalizer.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the resource does not exist.
    pub fn request_delete<R: StoredKind>(&self, id: &ResourceId) -> Result<(), StoreError> {
        let mut objects = R::collection(self).objects.write();
        let Some(existing) = objects.get_mut(id) else {
            return Err(not_found::<R>(id));
        };

        if existing.meta().finalizers.is_empty() {
            objects.remove(id);
            drop(objects);
            self.publish(R::KIND, id.clone(), Change::Removed);
            return Ok(());
        }
        if existing.meta().is_deleting() {
            return Ok(());
        }

        let meta = existing.meta_mut();
        meta.deletion_timestamp = Some(Utc::now());
        meta.resource_version = self.next_version();
        drop(objects);

        self.publish(R::KIND, id.clone(), Change::DeletionRequested);
        Ok(())
    }

    /// Returns a resource by identity, if present.
    #[must_use]
    pub fn lookup<R: StoredKind>(&self, id: &ResourceId) -> Option<R> {
        R::collection(self).objects.read().get(id).cloned()
    }

    /// Returns all resources of a kind, optionally in one namespace.
    #[must_use]
    pub fn snapshot<R: StoredKind>(&self, namespace: Option<&str>) -> Vec<R> {
        R::collection(self)
            .objects
            .read()
            .values()
            .filter(|r| namespace.is_none_or(|ns| r.meta().namespace == ns))
            .cloned()
            .collect()
    }

    /// Returns every identity of a kind.
    #[must_use]
    pub fn ids<R: StoredKind>(&self) -> Vec<ResourceId> {
        R::collection(self).objects.read().keys().cloned().collect()
    }

    /// Writes the store to `path` as JSON, replacing the file atomically.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` on encoding or I/O failure.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let snapshot = Snapshot {
            policies: self.snapshot(None),
            channels: self.snapshot(None),
        };
        let encoded = serde_json::to_vec_pretty(&snapshot).map_err(backend)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, encoded).map_err(backend)?;
        std::fs::rename(&tmp, path).map_err(backend)?;
        debug!(
            path = %path.display(),
            policies = snapshot.policies.len(),
            channels = snapshot.channels.len(),
            "saved store snapshot"
        );
        Ok(())
    }

    /// Loads a store from a snapshot written by [`MemoryStore::save`].
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` if the file cannot be read or decoded.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read(path).map_err(backend)?;
        let snapshot: Snapshot = serde_json::from_slice(&raw).map_err(backend)?;
        let store = Self::new();

        let mut max_version = 0;
        {
            let mut policies = store.inner.policies.objects.write();
            for policy in snapshot.policies {
                max_version = max_version.max(policy.metadata.resource_version);
                policies.insert(policy.id(), policy);
            }
            let mut channels = store.inner.channels.objects.write();
            for channel in snapshot.channels {
                max_version = max_version.max(channel.metadata.resource_version);
                channels.insert(channel.id(), channel);
            }
        }
        store
            .inner
            .next_version
            .store(max_version + 1, Ordering::Relaxed);

        info!(path = %path.display(), "loaded store snapshot");
        Ok(store)
    }

    fn next_version(&self) -> u64 {
        self.inner.next_version.fetch_add(1, Ordering::Relaxed)
    }

    fn publish(&self, kind: ResourceKind, id: ResourceId, change: Change) {
        debug!(kind = %kind, resource = %id, ?change, "store event");
        // No subscribers is fine.
        let _ = self.inner.events.send(StoreEvent { kind, id, change });
    }

    fn write_meta<R: StoredKind>(&self, resource: &R) -> Result<R, StoreError> {
        let id = resource.id();
        let mut objects = R::collection(self).objects.write();
        let Some(existing) = objects.get(&id) else {
            return Err(not_found::<R>(&id));
        };
        check_version(existing, resource)?;

        let spec_changed = spec_of(existing)? != spec_of(resource)?;
        let meta_changed = existing.meta().finalizers != resource.meta().finalizers
            || existing.meta().labels != resource.meta().labels;

        let mut updated = resource.clone();
        let old = existing.meta();
        let generation = old.generation + u64::from(spec_changed);
        let meta = updated.meta_mut();
        meta.uid.clone_from(&old.uid);
        meta.deletion_timestamp = old.deletion_timestamp;
        meta.generation = generation;
        meta.resource_version = self.next_version();
        *updated.status_mut() = existing.status().clone();

        if updated.meta().is_deleting() && updated.meta().finalizers.is_empty() {
            objects.remove(&id);
            drop(objects);
            self.publish(R::KIND, id, Change::Removed);
            return Ok(updated);
        }

        objects.insert(id.clone(), updated.clone());
        drop(objects);

        if spec_changed {
            self.publish(R::KIND, id, Change::Applied { generation });
        } else if meta_changed {
            self.publish(R::KIND, id, Change::MetadataChanged);
        }
        Ok(updated)
    }

    fn write_status<R: StoredKind>(&self, resource: &R) -> Result<R, StoreError> {
        let id = resource.id();
        let mut objects = R::collection(self).objects.write();
        let Some(existing) = objects.get_mut(&id) else {
            return Err(not_found::<R>(&id));
        };
        check_version(existing, resource)?;

        let changed = !existing.status().same_outcome(resource.status());
        *existing.status_mut() = resource.status().clone();
        existing.meta_mut().resource_version = self.next_version();
        let updated = existing.clone();
        drop(objects);

        if changed {
            self.publish(R::KIND, id, Change::StatusChanged);
        }
        Ok(updated)
    }
}

impl<R: StoredKind> ResourceStore<R> for MemoryStore {
    async fn get(&self, id: &ResourceId) -> Result<R, StoreError> {
        self.lookup(id).ok_or_else(|| not_found::<R>(id))
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<R>, StoreError> {
        Ok(self.snapshot(namespace))
    }

    async fn update(&self, resource: &R) -> Result<R, StoreError> {
        self.write_meta(resource)
    }

    async fn update_status(&self, resource: &R) -> Result<R, StoreError> {
        self.write_status(resource)
    }
}

fn not_found<R: Resource>(id: &ResourceId) -> StoreError {
    StoreError::NotFound {
        kind: R::KIND,
        id: id.clone(),
    }
}

fn check_version<R: Resource>(stored: &R, incoming: &R) -> Result<(), StoreError> {
    if stored.meta().resource_version == incoming.meta().resource_version {
        Ok(())
    } else {
        Err(StoreError::Conflict {
            kind: R::KIND,
            id: incoming.id(),
            version: incoming.meta().resource_version,
        })
    }
}

fn spec_of<R: Resource>(resource: &R) -> Result<serde_json::Value, StoreError> {
    resource.spec_json().map_err(backend)
}

fn backend(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}
