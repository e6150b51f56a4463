//! Worker tasks draining a [`WorkQueue`] into a [`Controller`].

use std::sync::Arc;

use alert_model::Resource;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::controller::{Action, Controller};
use crate::queue::WorkQueue;
use crate::store::ResourceStore;
use crate::sync::ExternalSync;

/// Spawns `count` workers reconciling identities from `queue`.
///
/// Workers exit once the queue is shut down. The queue guarantees that one
/// identity is never reconciled by two workers at once.
pub fn spawn_workers<R, S, E>(
    controller: Arc<Controller<R, S, E>>,
    queue: WorkQueue,
    count: usize,
) -> Vec<JoinHandle<()>>
where
    R: Resource + 'static,
    S: ResourceStore<R> + 'static,
    E: ExternalSync<R> + 'static,
{
    (0..count.max(1))
        .map(|worker| {
            let controller = Arc::clone(&controller);
            let queue = queue.clone();
            tokio::spawn(async move { run_worker(worker, &controller, &queue).await })
        })
        .collect()
}

async fn run_worker<R, S, E>(worker: usize, controller: &Controller<R, S, E>, queue: &WorkQueue)
where
    R: Resource,
    S: ResourceStore<R>,
    E: ExternalSync<R>,
{
    debug!(worker, kind = %R::KIND, "worker started");
    while let Some(id) = queue.next().await {
        match controller.reconcile(&id).await {
            Ok(Action::Converged) => queue.forget(&id),
            Ok(Action::Requeue) => {
                queue.forget(&id);
                queue.add_after(id.clone(), queue.config().requeue_delay);
            }
            Err(err) if err.is_retryable() => {
                let delay = queue.add_rate_limited(id.clone());
                warn!(resource = %id, error = %err, retry_in_ms = delay.as_millis(), "reconcile failed");
            }
            Err(err) => {
                error!(resource = %id, error = %err, "reconcile failed; waiting for a spec change");
                queue.forget(&id);
            }
        }
        queue.done(&id);
    }
    debug!(worker, kind = %R::KIND, "worker stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::api::{MemoryAlertingApi, Operation};
    use crate::error::ApiError;
    use crate::queue::QueueConfig;
    use crate::retry::RetryPolicy;
    use crate::store::MemoryStore;
    use crate::sync::PolicySync;
    use crate::testing::{apm, nrql, policy};
    use alert_model::{AlertPolicy, Phase, ResourceId};

    fn fast_queue() -> WorkQueue {
        WorkQueue::new(QueueConfig {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            requeue_delay: Duration::from_millis(5),
        })
    }

    async fn wait_for_phase(store: &MemoryStore, id: &ResourceId, phase: Phase) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if store
                    .lookup::<AlertPolicy>(id)
                    .is_some_and(|p| p.status.phase == phase)
                {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn queued_policy_is_reconciled() {
        let store = MemoryStore::new();
        let api = MemoryAlertingApi::new();
        let controller = Arc::new(Controller::new(
            Arc::new(store.clone()),
            PolicySync::new(Arc::new(api.clone())),
            RetryPolicy::immediate(3),
        ));
        let queue = fast_queue();
        let handles = spawn_workers(controller, queue.clone(), 2);

        let stored = store
            .apply(policy("monitoring", "cpu").with_condition(apm("cpu", 80.0)))
            .unwrap();
        queue.add(stored.id());
        wait_for_phase(&store, &stored.id(), Phase::Ready).await;
        assert_eq!(api.policy_count(), 1);

        queue.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn failures_are_retried_until_success() {
        let store = MemoryStore::new();
        let api = MemoryAlertingApi::new();
        api.fail(
            Operation::CreatePolicy,
            ApiError::Status {
                status: 500,
                body: "boom".to_string(),
            },
        );
        let controller = Arc::new(Controller::new(
            Arc::new(store.clone()),
            PolicySync::new(Arc::new(api.clone())),
            RetryPolicy::immediate(3),
        ));
        let queue = fast_queue();
        let handles = spawn_workers(controller, queue.clone(), 1);

        let stored = store.apply(policy("monitoring", "cpu")).unwrap();
        queue.add(stored.id());
        wait_for_phase(&store, &stored.id(), Phase::Error).await;

        api.clear_failures();
        wait_for_phase(&store, &stored.id(), Phase::Ready).await;

        queue.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn invalid_resource_is_not_retried() {
        let store = MemoryStore::new();
        let api = MemoryAlertingApi::new();
        let controller = Arc::new(Controller::new(
            Arc::new(store.clone()),
            PolicySync::new(Arc::new(api.clone())),
            RetryPolicy::immediate(3),
        ));
        let queue = fast_queue();
        let handles = spawn_workers(controller, queue.clone(), 1);

        let stored = store
            .apply(policy("monitoring", "cpu").with_condition(nrql("errors", "")))
            .unwrap();
        queue.add(stored.id());
        wait_for_phase(&store, &stored.id(), Phase::Error).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.failures(&stored.id()), 0);
        assert!(queue.is_empty());
        assert_eq!(api.policy_count(), 0);

        queue.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
