//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ClientError, Result};

/// Default REST endpoint for policies, conditions and channels.
pub const DEFAULT_BASE_URL: &str = "https://api.newrelic.com/v2/";

/// Default REST endpoint for infrastructure conditions.
pub const DEFAULT_INFRA_BASE_URL: &str = "https://infra-api.newrelic.com/v2/";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where and how to reach the alerting API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the main REST API.
    pub base_url: String,
    /// Base URL of the infrastructure conditions API.
    pub infra_base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            infra_base_url: DEFAULT_INFRA_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Creates a configuration pointing both APIs at the given URLs.
    #[must_use]
    pub fn new(base_url: impl Into<String>, infra_base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            infra_base_url: infra_base_url.into(),
            ..Self::default()
        }
    }

    /// Checks that both URLs parse and the timeout is positive.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.base_url()?;
        self.infra_base_url()?;
        if self.timeout_secs == 0 {
            return Err(ClientError::InvalidTimeout);
        }
        Ok(())
    }

    /// Request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Parsed main API URL, always ending in `/`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidUrl` if the URL is unusable.
    pub fn base_url(&self) -> Result<Url> {
        parse_base(&self.base_url)
    }

    /// Parsed infrastructure API URL, always ending in `/`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidUrl` if the URL is unusable.
    pub fn infra_base_url(&self) -> Result<Url> {
        parse_base(&self.infra_base_url)
    }
}

/// Relative endpoints are joined onto the base, so the base path must end in
/// a slash or its last segment would be replaced.
fn parse_base(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw).map_err(|e| ClientError::invalid_url(raw, e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::invalid_url(raw, "scheme must be http or https"));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
