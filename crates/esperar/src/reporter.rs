//! Reporter - Listener Dispatch and Suite Reports
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────────┐
//! │  ReportIntegration (registered, shared)                                │
//! │     │ is_enabled()? ── no ──► skipped, never constructed               │
//! │     ▼ yes                                                              │
//! │  reporter(sink, qualifier) ──► Box<dyn ReportListener> (per test)      │
//! │                                                                        │
//! │  ReportDispatcher: calls listeners in registration order.              │
//! │  A listener error or panic is logged and counted; the next listener    │
//! │  still runs and the test outcome is untouched.                         │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`SuiteReport`] aggregates finished results into a summary line and
//! JUnit XML.

use crate::harness::TestUnit;
use crate::result::{EsperarError, EsperarResult};
use crate::runner::{OutputSink, SuiteOutcome, TestResult};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Observer of one test execution
pub trait ReportListener: Send {
    /// Test is about to run
    fn test_started(&mut self, _unit: &TestUnit) -> EsperarResult<()> {
        Ok(())
    }

    /// Test passed
    fn test_succeeded(&mut self, _unit: &TestUnit) -> EsperarResult<()> {
        Ok(())
    }

    /// Test failed with `cause`
    fn test_failed(&mut self, _unit: &TestUnit, _cause: &str) -> EsperarResult<()> {
        Ok(())
    }

    /// Test finished either way
    fn test_finished(&mut self, _unit: &TestUnit, _duration: Duration) -> EsperarResult<()> {
        Ok(())
    }
}

/// A reporting back end that builds one listener per execution
pub trait ReportIntegration: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Disabled integrations are never asked for a listener
    fn is_enabled(&self) -> bool;

    /// Listener writing to `sink`, naming tests with `qualifier`
    ///
    /// # Errors
    ///
    /// Construction failures are treated as infrastructure errors.
    fn reporter(&self, sink: OutputSink, qualifier: &str) -> EsperarResult<Box<dyn ReportListener>>;
}

/// Listeners attached to one execution
pub struct ReportDispatcher {
    listeners: Vec<(String, Box<dyn ReportListener>)>,
    failures: usize,
}

impl ReportDispatcher {
    /// Construct a listener for every enabled integration, in order.
    ///
    /// # Errors
    ///
    /// [`EsperarError::Infrastructure`] if any listener cannot be built.
    pub fn attach(
        reports: &[Arc<dyn ReportIntegration>],
        sink: &OutputSink,
        qualifier: &str,
    ) -> EsperarResult<Self> {
        let mut listeners = Vec::new();
        for report in reports.iter().filter(|r| r.is_enabled()) {
            let listener = report.reporter(sink.clone(), qualifier).map_err(|e| {
                EsperarError::infrastructure(format!(
                    "cannot construct {} listener: {e}",
                    report.name()
                ))
            })?;
            listeners.push((report.name().to_string(), listener));
        }
        debug!(listeners = listeners.len(), "report listeners attached");
        Ok(Self {
            listeners,
            failures: 0,
        })
    }

    /// Number of attached listeners
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether no listener is attached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Listener calls that failed or panicked so far
    #[must_use]
    pub const fn failures(&self) -> usize {
        self.failures
    }

    /// Deliver `test_started`
    pub fn test_started(&mut self, unit: &TestUnit) {
        self.deliver("test_started", |l| l.test_started(unit));
    }

    /// Deliver `test_succeeded`
    pub fn test_succeeded(&mut self, unit: &TestUnit) {
        self.deliver("test_succeeded", |l| l.test_succeeded(unit));
    }

    /// Deliver `test_failed`
    pub fn test_failed(&mut self, unit: &TestUnit, cause: &str) {
        self.deliver("test_failed", |l| l.test_failed(unit, cause));
    }

    /// Deliver `test_finished`
    pub fn test_finished(&mut self, unit: &TestUnit, duration: Duration) {
        self.deliver("test_finished", |l| l.test_finished(unit, duration));
    }

    fn deliver(
        &mut self,
        event: &str,
        mut call: impl FnMut(&mut dyn ReportListener) -> EsperarResult<()>,
    ) {
        for (name, listener) in &mut self.listeners {
            let message = match panic::catch_unwind(AssertUnwindSafe(|| call(listener.as_mut()))) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(_) => "listener panicked".to_string(),
            };
            self.failures += 1;
            let err = EsperarError::delivery(name.as_str(), message);
            warn!(listener = %name, event, error = %err, "report listener failed");
        }
    }
}

impl fmt::Debug for ReportDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportDispatcher")
            .field(
                "listeners",
                &self.listeners.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field("failures", &self.failures)
            .finish()
    }
}

// =============================================================================
// SUITE REPORT
// =============================================================================

/// Aggregated results of a suite run
#[derive(Debug, Clone)]
pub struct SuiteReport {
    suite_name: String,
    results: Vec<TestResult>,
    attempts: Vec<u32>,
    duration: Duration,
    finished_at: DateTime<Utc>,
}

impl SuiteReport {
    /// Report named `suite_name` over `outcome`
    #[must_use]
    pub fn new(suite_name: impl Into<String>, outcome: &SuiteOutcome) -> Self {
        Self {
            suite_name: suite_name.into(),
            results: outcome.results().cloned().collect(),
            attempts: outcome.entries.iter().map(|e| e.attempts).collect(),
            duration: outcome.duration,
            finished_at: Utc::now(),
        }
    }

    /// Count passed tests
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    /// Count failed tests
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }

    /// Get total test count
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.results.len()
    }

    /// Passed / total; 1.0 for an empty suite
    #[must_use]
    pub fn pass_rate(&self) -> f64 {
        if self.results.is_empty() {
            return 1.0;
        }
        self.passed_count() as f64 / self.total_count() as f64
    }

    /// Get failed tests
    #[must_use]
    pub fn failures(&self) -> Vec<&TestResult> {
        self.results.iter().filter(|r| !r.passed).collect()
    }

    /// One-line summary
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{}: {}/{} passed ({:.1}%)",
            self.suite_name,
            self.passed_count(),
            self.total_count(),
            self.pass_rate() * 100.0
        )
    }

    /// Write JUnit XML to `output_path`
    ///
    /// # Errors
    ///
    /// Returns error if file writing fails
    pub fn generate_junit(&self, output_path: &Path) -> EsperarResult<()> {
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output_path, self.render_junit())?;
        Ok(())
    }

    /// Render JUnit XML content
    #[must_use]
    pub fn render_junit(&self) -> String {
        let mut xml = String::new();

        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(&format!(
            r#"<testsuite name="{}" tests="{}" failures="{}" time="{:.3}" timestamp="{}">"#,
            escape_xml(&self.suite_name),
            self.total_count(),
            self.failed_count(),
            self.duration.as_secs_f64(),
            self.finished_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        xml.push('\n');

        for (result, attempts) in self.results.iter().zip(&self.attempts) {
            xml.push_str(&format!(
                r#"  <testcase classname="{}" name="{}" time="{:.3}">"#,
                escape_xml(&result.unit.suite),
                escape_xml(&result.unit.method),
                result.duration().as_secs_f64()
            ));
            xml.push('\n');

            if let Some(error) = &result.failure {
                xml.push_str(&format!(
                    r#"    <failure message="{}">{}</failure>"#,
                    escape_xml(error),
                    escape_xml(error)
                ));
                xml.push('\n');
            }
            if *attempts > 1 {
                xml.push_str(&format!(
                    r#"    <properties><property name="attempts" value="{attempts}"/></properties>"#
                ));
                xml.push('\n');
            }
            if !result.output.is_empty() {
                xml.push_str(&format!(
                    "    <system-out>{}</system-out>\n",
                    escape_xml(&result.output)
                ));
            }

            xml.push_str("  </testcase>\n");
        }

        xml.push_str("</testsuite>\n");
        xml
    }
}

/// Escape XML special characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
