//! Harness configuration
//!
//! Built eagerly, before any session exists, and shared read-only between
//! concurrently running tests as `Arc<HarnessConfig>`.
//!
//! ```yaml
//! local_address: http://127.0.0.1:7777/wd/hub
//! wait_timeout_secs: 30
//! poll_interval_ms: 500
//! max_retries: 2
//! teamcity: true
//! sauce:
//!   enabled: true
//!   user: alice
//!   key: 0123-4567
//! capabilities:
//!   browserName: chrome
//! ```

use crate::clock::SharedClock;
use crate::driver::Capabilities;
use crate::logging::LogConfig;
use crate::result::{EsperarError, EsperarResult};
use crate::wait::{Poller, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WAIT_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Default local grid address
pub const DEFAULT_LOCAL_ADDRESS: &str = "http://127.0.0.1:7777/wd/hub";

/// Default Sauce Labs grid address
pub const DEFAULT_SAUCE_ADDRESS: &str = "http://ondemand.saucelabs.com:80/wd/hub";

/// Default Sauce Labs REST endpoint
pub const DEFAULT_SAUCE_API_URL: &str = "https://saucelabs.com";

/// Default suite-level re-runs of a failing test
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Length of a generated unique run id
pub const UNIQUE_ID_DIGITS: usize = 10;

/// Sauce Labs settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SauceConfig {
    /// Run against Sauce Labs and push job updates
    pub enabled: bool,
    /// Grid address used in Sauce mode
    pub address: String,
    /// Account name
    pub user: String,
    /// Access key
    pub key: String,
    /// REST endpoint for job updates
    pub api_url: String,
    /// Uploaded app, sent as `sauce-storage:{app}`
    pub app: Option<String>,
}

impl Default for SauceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: DEFAULT_SAUCE_ADDRESS.to_string(),
            user: String::new(),
            key: String::new(),
            api_url: DEFAULT_SAUCE_API_URL.to_string(),
            app: None,
        }
    }
}

/// Read-only settings for a whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Local grid address
    pub local_address: String,
    /// Remote grid address, if any
    pub remote_address: Option<String>,
    /// Default predicate timeout in seconds
    pub wait_timeout_secs: u64,
    /// Poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Re-runs allowed for a failing test
    pub max_retries: u32,
    /// Per-run id, also the build name
    pub unique_id: String,
    /// Enable the TeamCity integration and reporter
    pub teamcity: bool,
    /// Write a JUnit report after the run
    pub reporting: bool,
    /// Root for file sinks and reports
    pub output_dir: PathBuf,
    /// File sinks instead of memory sinks
    pub capture_to_files: bool,
    /// Sauce Labs settings
    pub sauce: SauceConfig,
    /// Capabilities passed to the session factory
    pub capabilities: Capabilities,
    /// Process logging
    pub log: LogConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            local_address: DEFAULT_LOCAL_ADDRESS.to_string(),
            remote_address: None,
            wait_timeout_secs: DEFAULT_WAIT_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            unique_id: generate_unique_id(),
            teamcity: false,
            reporting: false,
            output_dir: PathBuf::from("target/esperar"),
            capture_to_files: false,
            sauce: SauceConfig::default(),
            capabilities: Capabilities::new(),
            log: LogConfig::default(),
        }
    }
}

/// Random run id of [`UNIQUE_ID_DIGITS`] decimal digits
#[must_use]
pub fn generate_unique_id() -> String {
    let value = uuid::Uuid::new_v4().as_u128() % 10u128.pow(UNIQUE_ID_DIGITS as u32);
    format!("{value:0width$}", width = UNIQUE_ID_DIGITS)
}

impl HarnessConfig {
    /// Parse YAML; missing keys take their defaults
    ///
    /// # Errors
    ///
    /// YAML syntax or type errors.
    pub fn from_yaml_str(yaml: &str) -> EsperarResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load and validate a YAML file
    ///
    /// # Errors
    ///
    /// I/O, YAML, or validation errors.
    pub fn from_path(path: impl AsRef<Path>) -> EsperarResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EsperarError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::from_yaml_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize back to YAML
    ///
    /// # Errors
    ///
    /// Serialization errors.
    pub fn to_yaml(&self) -> EsperarResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Reject inconsistent settings
    ///
    /// # Errors
    ///
    /// [`EsperarError::Config`] naming the first offending key.
    pub fn validate(&self) -> EsperarResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(EsperarError::config("poll_interval_ms must be greater than 0"));
        }
        if self.unique_id.trim().is_empty() {
            return Err(EsperarError::config("unique_id must not be empty"));
        }
        if self.sauce.enabled && (self.sauce.user.is_empty() || self.sauce.key.is_empty()) {
            return Err(EsperarError::config(
                "sauce.user and sauce.key are required when sauce.enabled is set",
            ));
        }
        Ok(())
    }

    /// Grid address sessions are created against
    #[must_use]
    pub fn resolved_remote_address(&self) -> &str {
        if self.sauce.enabled {
            return &self.sauce.address;
        }
        match self.remote_address.as_deref().filter(|a| !a.is_empty()) {
            Some(address) => address,
            None => {
                info!("No remote address configured, using local address {}", self.local_address);
                &self.local_address
            }
        }
    }

    /// Capabilities for a new session, with Sauce credentials merged in
    #[must_use]
    pub fn session_capabilities(&self, extra: &Capabilities) -> Capabilities {
        let mut capabilities = self.capabilities.clone();
        capabilities.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        if self.sauce.enabled {
            capabilities.insert("username".into(), Value::from(self.sauce.user.as_str()));
            capabilities.insert("accessKey".into(), Value::from(self.sauce.key.as_str()));
            capabilities.insert("build".into(), Value::from(self.unique_id.as_str()));
            if let Some(app) = &self.sauce.app {
                capabilities.insert("app".into(), Value::from(format!("sauce-storage:{app}")));
            }
        }
        capabilities
    }

    /// Configured poll interval
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Poller on `clock` with the configured interval
    #[must_use]
    pub fn poller(&self, clock: SharedClock) -> Poller {
        Poller::new(clock).with_poll_interval(self.poll_interval())
    }
}
