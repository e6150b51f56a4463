//! A keyed work queue of resource identities.
//!
//! Semantics:
//! - an identity is queued at most once
//! - an identity handed to a worker is not handed out again until `done`
//! - an add while the identity is being processed is deferred until `done`
//! - after `shutdown`, `next` returns `None` and adds are ignored

use std::collections::{HashMap, HashSet, VecDeque};
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use alert_model::ResourceId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::debug;

use crate::retry::exponential;

/// Requeue delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// First delay after a failed reconcile.
    #[serde(with = "crate::retry::millis")]
    pub base_delay: Duration,
    /// Upper bound on the failure delay.
    #[serde(with = "crate::retry::millis")]
    pub max_delay: Duration,
    /// Delay for an explicitly requested requeue.
    #[serde(with = "crate::retry::millis")]
    pub requeue_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(300),
            requeue_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<ResourceId>,
    queued: HashSet<ResourceId>,
    active: HashSet<ResourceId>,
    dirty: HashSet<ResourceId>,
    failures: HashMap<ResourceId, u32>,
    shutdown: bool,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    notify: Notify,
    config: QueueConfig,
}

/// Identities waiting to be reconciled.
///
/// Cloning is cheap; clones share the queue.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

impl WorkQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                config,
            }),
        }
    }

    /// Returns the queue's delay settings.
    #[must_use]
    pub fn config(&self) -> QueueConfig {
        self.inner.config
    }

    /// Enqueues an identity.
    pub fn add(&self, id: ResourceId) {
        let mut state = self.inner.state.lock();
        if state.shutdown {
            return;
        }
        if state.active.contains(&id) {
            state.dirty.insert(id);
            return;
        }
        if state.queued.insert(id.clone()) {
            state.queue.push_back(id);
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Enqueues an identity after `delay`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn add_after(&self, id: ResourceId, delay: Duration) {
        if delay.is_zero() {
            self.add(id);
            return;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(id);
        });
    }

    /// Re-enqueues a failed identity with exponential backoff.
    pub fn add_rate_limited(&self, id: ResourceId) -> Duration {
        let attempt = {
            let mut state = self.inner.state.lock();
            let failures = state.failures.entry(id.clone()).or_insert(0);
            *failures = failures.saturating_add(1);
            *failures
        };
        let delay = exponential(self.inner.config.base_delay, self.inner.config.max_delay, attempt);
        debug!(resource = %id, attempt, delay_ms = delay.as_millis(), "backing off");
        self.add_after(id, delay);
        delay
    }

    /// Clears the failure count of an identity.
    pub fn forget(&self, id: &ResourceId) {
        self.inner.state.lock().failures.remove(id);
    }

    /// Number of consecutive failures recorded for an identity.
    #[must_use]
    pub fn failures(&self, id: &ResourceId) -> u32 {
        self.inner.state.lock().failures.get(id).copied().unwrap_or(0)
    }

    /// Waits for the next identity. Returns `None` once shut down.
    pub async fn next(&self) -> Option<ResourceId> {
        loop {
            let mut notified = pin!(self.inner.notify.notified());
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock();
                if state.shutdown {
                    return None;
                }
                if let Some(id) = state.queue.pop_front() {
                    state.queued.remove(&id);
                    state.active.insert(id.clone());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        self.inner.notify.notify_one();
                    }
                    return Some(id);
                }
            }

            notified.await;
        }
    }

    /// Marks an identity as processed, releasing any deferred add.
    pub fn done(&self, id: &ResourceId) {
        let mut state = self.inner.state.lock();
        state.active.remove(id);
        if state.dirty.remove(id) && !state.shutdown && state.queued.insert(id.clone()) {
            state.queue.push_back(id.clone());
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Stops handing out work and wakes all waiting workers.
    pub fn shutdown(&self) {
        self.inner.state.lock().shutdown = true;
        self.inner.notify.notify_waiters();
    }

    /// Returns true once [`WorkQueue::shutdown`] has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.state.lock().shutdown
    }

    /// Number of queued identities, excluding those being processed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> ResourceId {
        ResourceId::new("default", name)
    }

    #[tokio::test]
    async fn duplicates_collapse() {
        let q = WorkQueue::default();
        q.add(id("a"));
        q.add(id("a"));
        q.add(id("b"));
        assert_eq!(q.len(), 2);
        assert_eq!(q.next().await, Some(id("a")));
        assert_eq!(q.next().await, Some(id("b")));
    }

    #[tokio::test]
    async fn active_identity_is_deferred_until_done() {
        let q = WorkQueue::default();
        q.add(id("a"));
        let taken = q.next().await.unwrap();

        q.add(id("a"));
        assert!(q.is_empty());

        q.done(&taken);
        assert_eq!(q.len(), 1);
        assert_eq!(q.next().await, Some(id("a")));
    }

    #[tokio::test]
    async fn done_without_readd_leaves_queue_empty() {
        let q = WorkQueue::default();
        q.add(id("a"));
        let taken = q.next().await.unwrap();
        q.done(&taken);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn waiting_worker_is_woken() {
        let q = WorkQueue::default();
        let worker = {
            let q = q.clone();
            tokio::spawn(async move { q.next().await })
        };
        tokio::task::yield_now().await;
        q.add(id("a"));
        assert_eq!(worker.await.unwrap(), Some(id("a")));
    }

    #[tokio::test]
    async fn shutdown_releases_waiters() {
        let q = WorkQueue::default();
        let worker = {
            let q = q.clone();
            tokio::spawn(async move { q.next().await })
        };
        tokio::task::yield_now().await;
        q.shutdown();
        assert_eq!(worker.await.unwrap(), None);

        q.add(id("a"));
        assert!(q.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_backoff_grows_and_resets() {
        let q = WorkQueue::default();
        assert_eq!(q.add_rate_limited(id("a")), Duration::from_millis(500));
        assert_eq!(q.add_rate_limited(id("a")), Duration::from_secs(1));
        assert_eq!(q.add_rate_limited(id("a")), Duration::from_secs(2));
        assert_eq!(q.failures(&id("a")), 3);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(q.next().await, Some(id("a")));

        q.forget(&id("a"));
        assert_eq!(q.failures(&id("a")), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_is_capped() {
        let q = WorkQueue::default();
        let mut last = Duration::ZERO;
        for _ in 0..20 {
            last = q.add_rate_limited(id("a"));
        }
        assert_eq!(last, Duration::from_secs(300));
    }

    #[test]
    fn config_parses_millis() {
        let config: QueueConfig = serde_json::from_str(
            r#"{"base_delay":250,"max_delay":60000,"requeue_delay":2000}"#,
        )
        .unwrap();
        assert_eq!(config.base_delay, Duration::from_millis(250));
        assert_eq!(config.max_delay, Duration::from_secs(60));
    }
}
