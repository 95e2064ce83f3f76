//! TeamCity integration and service-message reporter.

use super::Integration;
use crate::harness::TestUnit;
use crate::reporter::{ReportIntegration, ReportListener};
use crate::result::EsperarResult;
use crate::runner::OutputSink;
use std::time::Duration;
use tracing::info;

/// Writes build-log lines TeamCity and its Sauce plugin understand
#[derive(Debug, Clone, Copy, Default)]
pub struct TeamCityIntegration {
    enabled: bool,
}

impl TeamCityIntegration {
    /// Integration toggled by `enabled`
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Integration for TeamCityIntegration {
    fn name(&self) -> &str {
        "teamcity"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn job_name(&self, name: &str, session_id: &str) -> EsperarResult<()> {
        info!("SauceOnDemandSessionID={session_id} job-name={name}");
        Ok(())
    }

    fn build_name(&self, name: &str, session_id: &str) -> EsperarResult<()> {
        info!("Test: {name} Session: {session_id}");
        Ok(())
    }

    fn test_passed(&self, passed: bool, session_id: &str) -> EsperarResult<()> {
        let result = if passed { "SUCCESS" } else { "FAILURE" };
        info!("TEST RESULT: {result} - Session: {session_id}");
        Ok(())
    }
}

impl ReportIntegration for TeamCityIntegration {
    fn name(&self) -> &str {
        Integration::name(self)
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn reporter(&self, sink: OutputSink, qualifier: &str) -> EsperarResult<Box<dyn ReportListener>> {
        Ok(Box::new(TeamCityReporter::new(sink, qualifier)))
    }
}

/// Escape a value for a `##teamcity[...]` attribute
#[must_use]
pub fn escape_service_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '|' => out.push_str("||"),
            '\'' => out.push_str("|'"),
            '\n' => out.push_str("|n"),
            '\r' => out.push_str("|r"),
            '[' => out.push_str("|["),
            ']' => out.push_str("|]"),
            _ => out.push(c),
        }
    }
    out
}

/// Listener emitting TeamCity service messages into the test's sink
#[derive(Debug, Clone)]
pub struct TeamCityReporter {
    sink: OutputSink,
    qualifier: String,
}

impl TeamCityReporter {
    /// Reporter writing to `sink`, prefixing test names with `qualifier`
    #[must_use]
    pub fn new(sink: OutputSink, qualifier: impl Into<String>) -> Self {
        Self {
            sink,
            qualifier: qualifier.into(),
        }
    }

    /// Name reported for `unit`
    #[must_use]
    pub fn test_name(&self, unit: &TestUnit) -> String {
        if self.qualifier.is_empty() {
            format!("{}.{}", unit.suite, unit.method)
        } else {
            format!("{}:{}.{}", self.qualifier, unit.suite, unit.method)
        }
    }

    fn message(&self, kind: &str, attributes: &[(&str, String)]) {
        let mut line = format!("##teamcity[{kind}");
        for (key, value) in attributes {
            line.push_str(&format!(" {key}='{}'", escape_service_value(value)));
        }
        line.push(']');
        self.sink.write_line(&line);
    }
}

impl ReportListener for TeamCityReporter {
    fn test_started(&mut self, unit: &TestUnit) -> EsperarResult<()> {
        self.message(
            "testStarted",
            &[
                ("name", self.test_name(unit)),
                ("captureStandardOutput", "true".to_string()),
            ],
        );
        Ok(())
    }

    fn test_failed(&mut self, unit: &TestUnit, cause: &str) -> EsperarResult<()> {
        self.message(
            "testFailed",
            &[
                ("name", self.test_name(unit)),
                ("message", cause.to_string()),
            ],
        );
        Ok(())
    }

    fn test_finished(&mut self, unit: &TestUnit, duration: Duration) -> EsperarResult<()> {
        self.message(
            "testFinished",
            &[
                ("name", self.test_name(unit)),
                ("duration", duration.as_millis().to_string()),
            ],
        );
        Ok(())
    }
}
