//! Routing store events to work queues.

use alert_model::{AlertPolicy, NotificationChannel, ResourceKind};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::dependency::dependents_of_policy;
use crate::queue::WorkQueue;
use crate::store::{Change, MemoryStore, StoreEvent};

/// Feeds store changes into the policy and channel queues.
#[derive(Debug, Clone)]
pub struct EventRouter {
    store: MemoryStore,
    policies: WorkQueue,
    channels: WorkQueue,
}

impl EventRouter {
    /// Creates a router over `store`.
    #[must_use]
    pub const fn new(store: MemoryStore, policies: WorkQueue, channels: WorkQueue) -> Self {
        Self {
            store,
            policies,
            channels,
        }
    }

    fn queue_for(&self, kind: ResourceKind) -> &WorkQueue {
        match kind {
            ResourceKind::AlertPolicy => &self.policies,
            ResourceKind::NotificationChannel => &self.channels,
        }
    }

    /// Enqueues whatever must be reconciled because of `event`.
    ///
    /// Spec changes and deletion requests enqueue the resource itself. A
    /// policy's status, labels or removal enqueue the channels that may link
    /// to it. Status changes never enqueue the resource that changed.
    pub fn route(&self, event: &StoreEvent) {
        match (event.kind, event.change) {
            (kind, Change::Applied { .. } | Change::DeletionRequested) => {
                self.queue_for(kind).add(event.id.clone());
            }
            (
                ResourceKind::AlertPolicy,
                Change::StatusChanged | Change::MetadataChanged | Change::Removed,
            ) => {
                let channels = self
                    .store
                    .snapshot::<NotificationChannel>(Some(&event.id.namespace));
                for id in dependents_of_policy(&event.id, &channels) {
                    debug!(policy = %event.id, channel = %id, "policy change affects channel");
                    self.channels.add(id);
                }
            }
            (ResourceKind::NotificationChannel, _) => {}
        }
    }

    /// Enqueues every stored resource.
    pub fn resync(&self) {
        let policies = self.store.ids::<AlertPolicy>();
        let channels = self.store.ids::<NotificationChannel>();
        debug!(policies = policies.len(), channels = channels.len(), "resync");
        for id in policies {
            self.policies.add(id);
        }
        for id in channels {
            self.channels.add(id);
        }
    }

    /// Routes events until the store closes or shutdown is signalled.
    ///
    /// Falling behind the event stream triggers a full resync.
    pub async fn run(
        &self,
        mut events: broadcast::Receiver<StoreEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        info!("event router shutting down");
                        break;
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => self.route(&event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "event router lagged; resyncing");
                        self.resync();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }
}
