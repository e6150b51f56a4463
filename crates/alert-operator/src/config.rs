//! Operator configuration.
//!
//! Loaded from a TOML file. Every section is optional; missing values take
//! the defaults below. The API key is never read from the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use alert_client::ClientConfig;
use alert_reconciler::{QueueConfig, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::error::{OperatorError, Result};

/// Worker pool sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Workers reconciling alert policies.
    pub policies: usize,
    /// Workers reconciling notification channels.
    pub channels: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            policies: 2,
            channels: 2,
        }
    }
}

/// Timer periods, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    /// How often the manifest directory is rescanned.
    pub poll_secs: u64,
    /// How often every resource is re-reconciled.
    pub resync_secs: u64,
    /// How often the store is written to the state file.
    pub snapshot_secs: u64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            poll_secs: 5,
            resync_secs: 300,
            snapshot_secs: 60,
        }
    }
}

impl IntervalConfig {
    /// Manifest poll period.
    #[must_use]
    pub const fn poll(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }

    /// Resync period.
    #[must_use]
    pub const fn resync(&self) -> Duration {
        Duration::from_secs(self.resync_secs)
    }

    /// Snapshot period.
    #[must_use]
    pub const fn snapshot(&self) -> Duration {
        Duration::from_secs(self.snapshot_secs)
    }
}

/// Main operator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Directory of JSON manifests.
    pub manifests_dir: PathBuf,
    /// Where the store is persisted between runs. No persistence if unset.
    pub state_file: Option<PathBuf>,
    /// Use the in-memory alerting API instead of HTTP.
    pub dry_run: bool,
    /// Alerting API endpoints.
    pub api: ClientConfig,
    /// Worker pool sizes.
    pub workers: WorkerConfig,
    /// Timer periods.
    pub intervals: IntervalConfig,
    /// Conflict retry for status and finalizer writes.
    pub retry: RetryPolicy,
    /// Requeue delays.
    pub queue: QueueConfig,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            manifests_dir: PathBuf::from("/etc/alert-operator/manifests"),
            state_file: Some(PathBuf::from("/var/lib/alert-operator/state.json")),
            dry_run: false,
            api: ClientConfig::default(),
            workers: WorkerConfig::default(),
            intervals: IntervalConfig::default(),
            retry: RetryPolicy::default(),
            queue: QueueConfig::default(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            OperatorError::Config(format!(
                "failed to read config file '{}': {e}",
                path.as_ref().display()
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| OperatorError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.manifests_dir.as_os_str().is_empty() {
            return Err(OperatorError::Config(
                "manifests_dir cannot be empty".to_string(),
            ));
        }

        self.api
            .validate()
            .map_err(|e| OperatorError::Config(format!("api: {e}")))?;

        if self.workers.policies == 0 {
            return Err(OperatorError::Config(
                "workers.policies must be greater than 0".to_string(),
            ));
        }
        if self.workers.channels == 0 {
            return Err(OperatorError::Config(
                "workers.channels must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("poll_secs", self.intervals.poll_secs),
            ("resync_secs", self.intervals.resync_secs),
            ("snapshot_secs", self.intervals.snapshot_secs),
        ] {
            if value == 0 {
                return Err(OperatorError::Config(format!(
                    "intervals.{name} must be greater than 0"
                )));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(OperatorError::Config(
                "retry.max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.retry.initial_backoff > self.retry.max_backoff {
            return Err(OperatorError::Config(
                "retry.initial_backoff cannot exceed retry.max_backoff".to_string(),
            ));
        }
        if self.queue.base_delay > self.queue.max_delay {
            return Err(OperatorError::Config(
                "queue.base_delay cannot exceed queue.max_delay".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| OperatorError::Config(format!("failed to render TOML: {e}")))
    }

    /// Write the configuration to a file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}
