//! Test Runner
//!
//! Executes one [`TestCase`] in isolation and produces a [`TestResult`].
//!
//! ```text
//! create sink ──► attach listeners ──► STARTING ──► body (captured) ──►
//!   succeeded | failed ──► finished ──► snapshot output ──► close sink
//! ```
//!
//! A failing or panicking body becomes a failed result. Sink creation and
//! listener construction failures are infrastructure errors and propagate.
//! The sink is closed on every path.

mod sink;
mod suite;

pub use sink::{FileSinkFactory, MemorySinkFactory, OutputSink, SinkFactory};
pub use suite::{SuiteEntry, SuiteExecutor, SuiteOutcome};

use crate::config::HarnessConfig;
use crate::harness::{TestCase, TestUnit};
use crate::logging::capture_subscriber;
use crate::reporter::{ReportDispatcher, ReportIntegration};
use crate::result::EsperarResult;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// What a test body sees while it runs
#[derive(Debug, Clone)]
pub struct TestContext {
    unit: TestUnit,
    output: OutputSink,
    config: Arc<HarnessConfig>,
    qualifier: String,
}

impl TestContext {
    /// Context for one execution of `unit`
    #[must_use]
    pub fn new(
        unit: TestUnit,
        output: OutputSink,
        config: Arc<HarnessConfig>,
        qualifier: impl Into<String>,
    ) -> Self {
        Self {
            unit,
            output,
            config,
            qualifier: qualifier.into(),
        }
    }

    /// Descriptor of the running test
    #[must_use]
    pub const fn unit(&self) -> &TestUnit {
        &self.unit
    }

    /// Read-only harness configuration
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Shared configuration handle
    #[must_use]
    pub fn config_arc(&self) -> Arc<HarnessConfig> {
        Arc::clone(&self.config)
    }

    /// Naming qualifier of this execution
    #[must_use]
    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    /// Output sink of this execution
    #[must_use]
    pub const fn output(&self) -> &OutputSink {
        &self.output
    }

    /// Write a line to the captured output
    pub fn log(&self, line: impl AsRef<str>) {
        self.output.write_line(line.as_ref());
    }
}

/// Outcome of one execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// Test that ran
    pub unit: TestUnit,
    /// Whether the body completed without error or panic
    pub passed: bool,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Everything written to the sink
    pub output: String,
    /// Error or panic message when failed
    pub failure: Option<String>,
}

impl TestResult {
    /// Duration as a `Duration`
    #[must_use]
    pub const fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .map_or_else(
            || "test panicked".to_string(),
            |msg| format!("test panicked: {msg}"),
        )
}

/// Runs single test cases; cheap to clone and share across workers
#[derive(Clone)]
pub struct TestRunner {
    config: Arc<HarnessConfig>,
    reports: Vec<Arc<dyn ReportIntegration>>,
    sinks: Arc<dyn SinkFactory>,
}

impl TestRunner {
    /// Runner with memory sinks and no report listeners
    #[must_use]
    pub fn new(config: Arc<HarnessConfig>) -> Self {
        Self {
            config,
            reports: Vec::new(),
            sinks: Arc::new(MemorySinkFactory),
        }
    }

    /// Runner whose sinks follow `config.capture_to_files`
    ///
    /// File sinks go under `{output_dir}/logs/{unique_id}`, one directory per run.
    #[must_use]
    pub fn from_config(config: Arc<HarnessConfig>) -> Self {
        let runner = Self::new(Arc::clone(&config));
        if config.capture_to_files {
            let dir = config.output_dir.join("logs").join(&config.unique_id);
            runner.with_sink_factory(Arc::new(FileSinkFactory::new(dir)))
        } else {
            runner
        }
    }

    /// Add a report integration; registration order is call order
    #[must_use]
    pub fn with_report(mut self, report: Arc<dyn ReportIntegration>) -> Self {
        self.reports.push(report);
        self
    }

    /// Add several report integrations
    #[must_use]
    pub fn with_reports(mut self, reports: impl IntoIterator<Item = Arc<dyn ReportIntegration>>) -> Self {
        self.reports.extend(reports);
        self
    }

    /// Replace the sink factory
    #[must_use]
    pub fn with_sink_factory(mut self, sinks: Arc<dyn SinkFactory>) -> Self {
        self.sinks = sinks;
        self
    }

    /// Shared configuration
    #[must_use]
    pub fn config(&self) -> &Arc<HarnessConfig> {
        &self.config
    }

    /// Execute exactly `case`.
    ///
    /// # Errors
    ///
    /// Only infrastructure failures: the sink or a listener could not be
    /// created, or the sink could not be flushed. A failing test is `Ok`.
    pub fn run(&self, case: &TestCase, qualifier: &str) -> EsperarResult<TestResult> {
        let sink = self.sinks.create(&case.unit, qualifier)?;
        let outcome = self.execute(case, &sink, qualifier);
        let closed = sink.close();
        let result = outcome?;
        closed?;
        Ok(result)
    }

    fn execute(&self, case: &TestCase, sink: &OutputSink, qualifier: &str) -> EsperarResult<TestResult> {
        let unit = &case.unit;
        let mut dispatcher = ReportDispatcher::attach(&self.reports, sink, qualifier)?;

        info!(test = %unit, qualifier, "STARTING test");
        dispatcher.test_started(unit);

        let context = TestContext::new(unit.clone(), sink.clone(), Arc::clone(&self.config), qualifier);
        let start = Instant::now();
        let outcome = tracing::subscriber::with_default(capture_subscriber(sink.clone()), || {
            panic::catch_unwind(AssertUnwindSafe(|| case.invoke(&context)))
        });
        let duration = start.elapsed();

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(payload) => Some(panic_message(payload.as_ref())),
        };
        match &failure {
            None => dispatcher.test_succeeded(unit),
            Some(cause) => dispatcher.test_failed(unit, cause),
        }
        dispatcher.test_finished(unit, duration);

        let duration_ms = duration.as_millis() as u64;
        info!(test = %unit, passed = failure.is_none(), "FINISHED test in {duration_ms} ms");

        Ok(TestResult {
            unit: unit.clone(),
            passed: failure.is_none(),
            duration_ms,
            output: sink.contents(),
            failure,
        })
    }
}

impl fmt::Debug for TestRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestRunner")
            .field("reports", &self.reports.iter().map(|r| r.name()).collect::<Vec<_>>())
            .field("sinks", &self.sinks)
            .finish()
    }
}
