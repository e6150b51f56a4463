//! Reconciliation engine for alert policies and notification channels.
//!
//! The engine watches a [`MemoryStore`] of declared resources and drives the
//! external alerting service towards them through an [`AlertingApi`]:
//!
//! - [`EventRouter`] turns store events into work on two [`WorkQueue`]s
//! - [`spawn_workers`] drains a queue into a [`Controller`]
//! - [`Controller`] runs finalizer handling, sync and status writes for one
//!   identity, using [`PolicySync`] or [`ChannelSync`]
//!
//! [`MemoryAlertingApi`] is a complete in-process implementation of the API,
//! used for tests and dry runs.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::panic))]

pub mod api;
pub mod controller;
pub mod dependency;
pub mod diff;
pub mod error;
pub mod finalizer;
pub mod queue;
pub mod retry;
pub mod router;
pub mod status;
pub mod store;
pub mod sync;
pub mod worker;

#[cfg(test)]
mod testing;

pub use api::{
    AlertingApi, ApiCall, ChannelDefinition, ExternalChannel, ExternalPolicy, MemoryAlertingApi,
    Operation, PolicyDefinition,
};
pub use controller::{Action, Controller};
pub use dependency::dependents_of_policy;
pub use diff::{ConditionSet, MemberSet, SetDiff, SetMember, diff};
pub use error::{ApiError, ReconcileError, Result, StoreError};
pub use finalizer::{Ensured, FINALIZER, FinalizerManager, FinalizerState};
pub use queue::{QueueConfig, WorkQueue};
pub use retry::RetryPolicy;
pub use router::EventRouter;
pub use status::StatusUpdater;
pub use store::{Change, MemoryStore, ResourceStore, StoreEvent, StoredKind};
pub use sync::{ChannelSync, ExternalSync, PolicySync, SyncFailure, SyncOutcome};
pub use worker::spawn_workers;
