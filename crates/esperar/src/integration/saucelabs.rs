//! Sauce Labs integration: job metadata pushed over the REST API.

use super::Integration;
use crate::config::SauceConfig;
use crate::result::{EsperarError, EsperarResult};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Fields sent in one job update
pub type JobUpdates = serde_json::Map<String, Value>;

/// Transport for job info updates
pub trait JobInfoClient: Send + Sync + fmt::Debug {
    /// Apply `updates` to the job of `session_id`
    ///
    /// # Errors
    ///
    /// Transport or HTTP status failures.
    fn update_job_info(&self, session_id: &str, updates: &JobUpdates) -> EsperarResult<()>;
}

/// Pushes job name, build and verdict to Sauce Labs
#[derive(Debug, Clone)]
pub struct SauceLabsIntegration {
    enabled: bool,
    client: Option<Arc<dyn JobInfoClient>>,
}

impl SauceLabsIntegration {
    /// Disabled integration; never makes a request
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            client: None,
        }
    }

    /// Enabled integration over `client`
    #[must_use]
    pub fn with_client(client: Arc<dyn JobInfoClient>) -> Self {
        Self {
            enabled: true,
            client: Some(client),
        }
    }

    /// Integration for `config`, using the REST client in Sauce mode.
    ///
    /// # Errors
    ///
    /// Returns a config error when Sauce mode is on but the crate was built
    /// without the `sauce` feature, or the HTTP client cannot be built.
    pub fn from_config(config: &SauceConfig) -> EsperarResult<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        #[cfg(feature = "sauce")]
        {
            Ok(Self::with_client(Arc::new(SauceRestClient::new(config)?)))
        }
        #[cfg(not(feature = "sauce"))]
        {
            Err(EsperarError::config(
                "Sauce Labs mode requires esperar built with the `sauce` feature",
            ))
        }
    }

    fn update(&self, key: &str, value: Value, session_id: &str) -> EsperarResult<()> {
        let Some(client) = self.client.as_ref().filter(|_| self.enabled) else {
            return Ok(());
        };
        if session_id.is_empty() {
            return Err(EsperarError::delivery("saucelabs", "empty session id"));
        }
        let mut updates = JobUpdates::new();
        updates.insert(key.to_string(), value);
        let shown = Value::Object(updates.clone());
        info!("Updating Job Info with SessionID: {session_id} - Updates: {shown}");
        client.update_job_info(session_id, &updates)
    }
}

impl Integration for SauceLabsIntegration {
    fn name(&self) -> &str {
        "saucelabs"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn job_name(&self, name: &str, session_id: &str) -> EsperarResult<()> {
        self.update("name", Value::from(name), session_id)?;
        info!("SauceOnDemandSessionID={session_id} job-name={name}");
        Ok(())
    }

    fn build_name(&self, name: &str, session_id: &str) -> EsperarResult<()> {
        info!("Set buildName: {name} - SessionID: {session_id}");
        self.update("build", Value::from(name), session_id)
    }

    fn test_passed(&self, passed: bool, session_id: &str) -> EsperarResult<()> {
        let result = if passed { "SUCCESS" } else { "FAILURE" };
        info!("Set test result: {result} - SessionID: {session_id}");
        self.update("passed", Value::Bool(passed), session_id)
    }
}

/// Blocking client for `PUT /rest/v1/{user}/jobs/{session}`
#[cfg(feature = "sauce")]
#[derive(Debug, Clone)]
pub struct SauceRestClient {
    api_url: String,
    user: String,
    key: String,
    client: reqwest::blocking::Client,
}

#[cfg(feature = "sauce")]
impl SauceRestClient {
    /// Client authenticated with the configured credentials
    ///
    /// # Errors
    ///
    /// Returns a config error if the HTTP client cannot be built.
    pub fn new(config: &SauceConfig) -> EsperarResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| EsperarError::config(format!("cannot build Sauce Labs client: {e}")))?;
        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            key: config.key.clone(),
            client,
        })
    }

    /// Endpoint for the job of `session_id`
    #[must_use]
    pub fn job_url(&self, session_id: &str) -> String {
        format!("{}/rest/v1/{}/jobs/{session_id}", self.api_url, self.user)
    }
}

#[cfg(feature = "sauce")]
impl JobInfoClient for SauceRestClient {
    fn update_job_info(&self, session_id: &str, updates: &JobUpdates) -> EsperarResult<()> {
        let url = self.job_url(session_id);
        let response = self
            .client
            .put(&url)
            .basic_auth(&self.user, Some(&self.key))
            .json(updates)
            .send()
            .map_err(|e| EsperarError::delivery("saucelabs", e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EsperarError::delivery(
                "saucelabs",
                format!("HTTP {status} from {url}"),
            ));
        }
        Ok(())
    }
}
