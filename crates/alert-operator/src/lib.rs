//! alert-operator keeps alert policies and notification channels declared
//! in a manifest directory in sync with the external alerting service.
//!
//! The [`Operator`] mirrors the manifest directory into a
//! [`MemoryStore`](alert_reconciler::MemoryStore), routes store events to
//! per-kind work queues and runs reconcile workers against an
//! [`AlertingApi`](alert_reconciler::AlertingApi).

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::panic))]

pub mod config;
pub mod error;
pub mod manifests;
pub mod runtime;

pub use config::{IntervalConfig, OperatorConfig, WorkerConfig};
pub use error::{OperatorError, Result};
pub use manifests::{Manifest, ManifestWatcher, SyncReport, ValidationReport, validate_dir};
pub use runtime::Operator;
