//! HTTP implementation of [`AlertingApi`](alert_reconciler::AlertingApi).
//!
//! Policies, NRQL and APM conditions, channels and policy links live on the
//! main REST API; infrastructure conditions live on a separate API with its
//! own base URL. Both authenticate with the same admin key.
//!
//! ```rust,no_run
//! use alert_client::{ClientConfig, HttpAlertingApi};
//!
//! let _api = HttpAlertingApi::new(&ClientConfig::default(), "admin-key")?;
//! # Ok::<(), alert_client::ClientError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::panic))]

pub mod client;
pub mod config;
pub mod error;
mod wire;

pub use client::{API_KEY_HEADER, HttpAlertingApi};
pub use config::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_INFRA_BASE_URL};
pub use error::{ClientError, Result};
