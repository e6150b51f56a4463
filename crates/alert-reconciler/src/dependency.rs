//! Mapping a changed policy to the channels that must be reconciled.

use alert_model::{NotificationChannel, ResourceId};

/// Channels to reconcile when the given policy changes.
///
/// Every channel in the policy's namespace is returned, not only those whose
/// selector currently matches: a relabelled policy must also be unlinked from
/// channels that no longer select it.
#[must_use]
pub fn dependents_of_policy(policy: &ResourceId, channels: &[NotificationChannel]) -> Vec<ResourceId> {
    let mut ids: Vec<ResourceId> = channels
        .iter()
        .filter(|c| c.metadata.namespace == policy.namespace)
        .map(|c| c.metadata.id())
        .collect();
    ids.sort();
    ids.dedup();
    ids
}
