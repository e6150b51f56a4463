//! The operator main loop.

use std::sync::Arc;
use std::time::Duration;

use alert_model::{AlertPolicy, NotificationChannel};
use alert_reconciler::{
    AlertingApi, ChannelSync, Controller, EventRouter, MemoryStore, PolicySync, WorkQueue,
    spawn_workers,
};
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::OperatorConfig;
use crate::error::Result;
use crate::manifests::ManifestWatcher;

/// Wires the store, manifest watcher, event router and workers together.
#[derive(Debug)]
pub struct Operator<A> {
    config: OperatorConfig,
    store: MemoryStore,
    api: Arc<A>,
}

impl<A: AlertingApi + 'static> Operator<A> {
    /// Creates an operator over an existing store.
    #[must_use]
    pub const fn new(config: OperatorConfig, store: MemoryStore, api: Arc<A>) -> Self {
        Self { config, store, api }
    }

    /// The resource store.
    #[must_use]
    pub const fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Runs until `shutdown` becomes true or its sender is dropped.
    ///
    /// Workers finish their current reconcile before this returns. The
    /// store is written to the state file on the way out.
    ///
    /// # Errors
    ///
    /// Returns an error if the final snapshot cannot be written.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let policies = WorkQueue::new(self.config.queue);
        let channels = WorkQueue::new(self.config.queue);
        let router = EventRouter::new(self.store.clone(), policies.clone(), channels.clone());

        // Subscribe before the first manifest pass so none of its events are missed.
        let events = self.store.subscribe();
        let router_task = {
            let router = router.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { router.run(events, shutdown).await })
        };

        let mut manifests = ManifestWatcher::new(&self.config.manifests_dir, self.store.clone());
        self.poll_manifests(&mut manifests);
        router.resync();

        let store = Arc::new(self.store.clone());
        let policy_controller = Arc::new(Controller::<AlertPolicy, _, _>::new(
            Arc::clone(&store),
            PolicySync::new(Arc::clone(&self.api)),
            self.config.retry,
        ));
        let channel_controller = Arc::new(Controller::<NotificationChannel, _, _>::new(
            Arc::clone(&store),
            ChannelSync::new(Arc::clone(&self.api), Arc::clone(&store)),
            self.config.retry,
        ));
        let mut workers = spawn_workers(
            policy_controller,
            policies.clone(),
            self.config.workers.policies,
        );
        workers.extend(spawn_workers(
            channel_controller,
            channels.clone(),
            self.config.workers.channels,
        ));

        info!(
            manifests = %self.config.manifests_dir.display(),
            policy_workers = self.config.workers.policies,
            channel_workers = self.config.workers.channels,
            "operator started"
        );

        let mut poll = ticker(self.config.intervals.poll());
        let mut resync = ticker(self.config.intervals.resync());
        let mut snapshot = ticker(self.config.intervals.snapshot());

        loop {
            tokio::select! {
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = poll.tick() => self.poll_manifests(&mut manifests),
                _ = resync.tick() => router.resync(),
                _ = snapshot.tick() => {
                    if let Err(e) = self.save_snapshot() {
                        warn!(error = %e, "failed to save state");
                    }
                }
            }
        }

        info!("shutting down; draining workers");
        policies.shutdown();
        channels.shutdown();
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "worker task failed");
            }
        }
        if let Err(e) = router_task.await {
            warn!(error = %e, "event router task failed");
        }

        self.save_snapshot()?;
        info!("operator stopped");
        Ok(())
    }

    fn poll_manifests(&self, manifests: &mut ManifestWatcher) {
        match manifests.sync() {
            Ok(report) => debug!(
                applied = report.applied,
                deleted = report.deleted,
                errors = report.errors,
                "manifests synced"
            ),
            Err(e) => warn!(dir = %manifests.dir().display(), error = %e, "failed to read manifests"),
        }
    }

    fn save_snapshot(&self) -> Result<()> {
        if let Some(path) = &self.config.state_file {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.store.save(path)?;
        }
        Ok(())
    }
}

fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
