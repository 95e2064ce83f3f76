//! Integration Facade
//!
//! Optional capability surface notified of a test's session lifecycle: job
//! naming, build naming and the final pass/fail push.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ──session_started──► SessionStarted ──names sent──► Named
//!   ──test_running──► Running ──report_outcome──► Passed | Failed
//!   ──torn_down──► TornDown
//! ```
//!
//! - Every call needs a session identity; without one it is suppressed.
//! - `report_outcome` delivers exactly once per test.
//! - A failing integration is logged and counted, never propagated.

mod saucelabs;
mod teamcity;

#[cfg(feature = "sauce")]
pub use saucelabs::SauceRestClient;
pub use saucelabs::{JobInfoClient, JobUpdates, SauceLabsIntegration};
pub use teamcity::{escape_service_value, TeamCityIntegration, TeamCityReporter};

use crate::config::HarnessConfig;
use crate::reporter::ReportIntegration;
use crate::result::{EsperarError, EsperarResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// An external system told about test sessions
pub trait Integration: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Feature toggle; disabled integrations receive no other call
    fn is_enabled(&self) -> bool;

    /// Name the job running in `session_id`
    ///
    /// # Errors
    ///
    /// Delivery failures; the facade logs and swallows them.
    fn job_name(&self, name: &str, session_id: &str) -> EsperarResult<()>;

    /// Attach the build name to `session_id`
    ///
    /// # Errors
    ///
    /// Delivery failures; the facade logs and swallows them.
    fn build_name(&self, name: &str, session_id: &str) -> EsperarResult<()>;

    /// Final verdict for `session_id`
    ///
    /// # Errors
    ///
    /// Delivery failures; the facade logs and swallows them.
    fn test_passed(&self, passed: bool, session_id: &str) -> EsperarResult<()>;
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Ordered set of integrations and report integrations
#[derive(Clone, Default)]
pub struct IntegrationRegistry {
    integrations: Vec<Arc<dyn Integration>>,
    reports: Vec<Arc<dyn ReportIntegration>>,
}

impl IntegrationRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in integrations driven by configuration flags.
    ///
    /// TeamCity is registered as both integration and report integration.
    ///
    /// # Errors
    ///
    /// Returns a config error when Sauce mode is requested but cannot be
    /// served.
    pub fn from_config(config: &HarnessConfig) -> EsperarResult<Self> {
        let teamcity = Arc::new(TeamCityIntegration::new(config.teamcity));
        let sauce = Arc::new(SauceLabsIntegration::from_config(&config.sauce)?);
        Ok(Self::new()
            .with(Arc::clone(&teamcity) as Arc<dyn Integration>)
            .with(sauce)
            .with_report(teamcity))
    }

    /// Append an integration
    #[must_use]
    pub fn with(mut self, integration: Arc<dyn Integration>) -> Self {
        self.register(integration);
        self
    }

    /// Append a report integration
    #[must_use]
    pub fn with_report(mut self, report: Arc<dyn ReportIntegration>) -> Self {
        self.reports.push(report);
        self
    }

    /// Append an integration in place
    pub fn register(&mut self, integration: Arc<dyn Integration>) {
        self.integrations.push(integration);
    }

    /// Registered integrations, in order
    #[must_use]
    pub fn integrations(&self) -> &[Arc<dyn Integration>] {
        &self.integrations
    }

    /// Registered report integrations, in order
    #[must_use]
    pub fn report_integrations(&self) -> Vec<Arc<dyn ReportIntegration>> {
        self.reports.clone()
    }

    /// Names of enabled integrations
    #[must_use]
    pub fn enabled_names(&self) -> Vec<String> {
        self.integrations
            .iter()
            .filter(|i| i.is_enabled())
            .map(|i| i.name().to_string())
            .collect()
    }

    /// Number of registered integrations
    #[must_use]
    pub fn len(&self) -> usize {
        self.integrations.len()
    }

    /// Whether no integration is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.integrations.is_empty()
    }

    /// Fresh facade for one test
    #[must_use]
    pub fn facade(&self) -> IntegrationFacade {
        IntegrationFacade::new(self.integrations.clone())
    }
}

impl fmt::Debug for IntegrationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrationRegistry")
            .field(
                "integrations",
                &self.integrations.iter().map(|i| i.name()).collect::<Vec<_>>(),
            )
            .field(
                "reports",
                &self.reports.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

// =============================================================================
// FACADE
// =============================================================================

/// Where a test is in its integration lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    /// No session yet
    Idle,
    /// Identity known, names not yet sent
    SessionStarted,
    /// Job and build names sent
    Named,
    /// Body executing
    Running,
    /// Outcome reported: passed
    Passed,
    /// Outcome reported: failed
    Failed,
    /// Session closed, identity released
    TornDown,
}

impl LifecycleState {
    /// Whether the outcome has been reported
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::TornDown)
    }
}

/// Per-test driver of the registered integrations
pub struct IntegrationFacade {
    integrations: Vec<Arc<dyn Integration>>,
    state: LifecycleState,
    session_id: Option<String>,
    outcome_reported: bool,
    suppressed: usize,
    failures: usize,
}

impl IntegrationFacade {
    /// Facade over `integrations`, in order
    #[must_use]
    pub fn new(integrations: Vec<Arc<dyn Integration>>) -> Self {
        Self {
            integrations,
            state: LifecycleState::Idle,
            session_id: None,
            outcome_reported: false,
            suppressed: 0,
            failures: 0,
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Identity all calls are keyed by, once known
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Calls dropped for lack of a session identity
    #[must_use]
    pub const fn suppressed_calls(&self) -> usize {
        self.suppressed
    }

    /// Integration calls that failed or panicked
    #[must_use]
    pub const fn delivery_failures(&self) -> usize {
        self.failures
    }

    /// Unlock the identity and send one job name and one build name.
    ///
    /// An empty `session_id` leaves the identity unset; both calls are
    /// suppressed.
    pub fn session_started(&mut self, session_id: &str, job_name: &str, build_name: &str) {
        if self.state != LifecycleState::Idle {
            debug!(state = ?self.state, "session already started, ignoring");
            return;
        }
        self.session_id = Some(session_id).filter(|s| !s.is_empty()).map(str::to_string);
        self.state = LifecycleState::SessionStarted;
        self.dispatch("job_name", |i, sid| i.job_name(job_name, sid));
        self.dispatch("build_name", |i, sid| i.build_name(build_name, sid));
        self.state = LifecycleState::Named;
    }

    /// Body is about to run
    pub fn test_running(&mut self) {
        if matches!(self.state, LifecycleState::Named | LifecycleState::Idle) {
            self.state = LifecycleState::Running;
        }
    }

    /// Push the verdict; only the first call per test is delivered.
    ///
    /// Returns whether this call was the one delivered.
    pub fn report_outcome(&mut self, passed: bool) -> bool {
        if self.outcome_reported {
            debug!(passed, "outcome already reported, ignoring");
            return false;
        }
        self.outcome_reported = true;
        self.state = if passed {
            LifecycleState::Passed
        } else {
            LifecycleState::Failed
        };
        self.dispatch("test_passed", |i, sid| i.test_passed(passed, sid));
        true
    }

    /// Session closed; the identity is released
    pub fn torn_down(&mut self) {
        self.session_id = None;
        self.state = LifecycleState::TornDown;
    }

    fn dispatch(&mut self, event: &str, call: impl Fn(&dyn Integration, &str) -> EsperarResult<()>) {
        let Some(session_id) = self.session_id.clone() else {
            self.suppressed += 1;
            debug!(event, "no session identity, integration call suppressed");
            return;
        };
        for integration in self.integrations.iter().filter(|i| i.is_enabled()) {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| call(integration.as_ref(), &session_id)));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(_) => "integration panicked".to_string(),
            };
            self.failures += 1;
            let err = EsperarError::delivery(integration.name(), message);
            warn!(event, session_id = %session_id, error = %err, "integration call failed");
        }
    }
}

impl fmt::Debug for IntegrationFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrationFacade")
            .field("state", &self.state)
            .field("session_id", &self.session_id)
            .field("suppressed", &self.suppressed)
            .field("failures", &self.failures)
            .finish()
    }
}

// =============================================================================
// RECORDING INTEGRATION
// =============================================================================

/// Integration that records every call, for tests and dry runs
#[derive(Debug, Clone)]
pub struct RecordingIntegration {
    name: String,
    enabled: bool,
    fail: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingIntegration {
    /// Enabled recorder called `name`
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            fail: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Toggle the recorder
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Record calls, then fail each of them
    #[must_use]
    pub const fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Calls seen so far, e.g. `job_name:{name}:{sid}`
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Calls starting with `prefix`
    #[must_use]
    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) -> EsperarResult<()> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        if self.fail {
            return Err(EsperarError::delivery(self.name.as_str(), "recorder set to fail"));
        }
        Ok(())
    }
}

impl Integration for RecordingIntegration {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn job_name(&self, name: &str, session_id: &str) -> EsperarResult<()> {
        self.record(format!("job_name:{name}:{session_id}"))
    }

    fn build_name(&self, name: &str, session_id: &str) -> EsperarResult<()> {
        self.record(format!("build_name:{name}:{session_id}"))
    }

    fn test_passed(&self, passed: bool, session_id: &str) -> EsperarResult<()> {
        info!(integration = %self.name, passed, session_id, "recording verdict");
        self.record(format!("test_passed:{passed}:{session_id}"))
    }
}
