//! Suite runner behind the `run` command

use crate::commands::RunArgs;
use crate::config::{effective_jobs, CliConfig, Verbosity};
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use esperar::{
    init_logging, HarnessConfig, IntegrationRegistry, LogConfig, SuiteExecutor, SuiteOutcome,
    SuiteReport, TestFilter, TestRegistry, TestRunner,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Load the harness configuration from `path`, or defaults when absent
pub fn load_harness_config(path: Option<&Path>) -> CliResult<HarnessConfig> {
    match path {
        Some(path) => Ok(HarnessConfig::from_path(path)?),
        None => Ok(HarnessConfig::default()),
    }
}

/// Apply `run` flags on top of the loaded configuration
pub fn apply_overrides(mut config: HarnessConfig, args: &RunArgs) -> CliResult<HarnessConfig> {
    if let Some(retries) = args.retries {
        config.max_retries = retries;
    }
    if args.sauce {
        config.sauce.enabled = true;
    }
    config.validate()?;
    Ok(config)
}

/// Build the selection filter from `run` flags
///
/// An unparsable `--filter` is an [`CliError::InvalidArgument`].
pub fn build_filter(args: &RunArgs) -> CliResult<TestFilter> {
    let mut filter = TestFilter::new()
        .with_suites(args.suites.iter().cloned())
        .with_quarantine(args.quarantine.into());
    if let Some(ref pattern) = args.filter {
        filter = filter
            .with_pattern(pattern)
            .map_err(|e| CliError::invalid_argument(format!("--filter {pattern:?}: {e}")))?;
    }
    Ok(filter)
}

/// Where the JUnit report goes, if anywhere
#[must_use]
pub fn junit_destination(config: &HarnessConfig, args: &RunArgs) -> Option<PathBuf> {
    args.junit
        .clone()
        .or_else(|| config.reporting.then(|| config.output_dir.join("junit.xml")))
}

fn log_config(config: &HarnessConfig, verbosity: Verbosity) -> LogConfig {
    let mut log = config.log.clone();
    if verbosity != Verbosity::Normal {
        log.level = verbosity.log_level().to_string();
    }
    log
}

/// Runs the selected tests of a registry
#[derive(Debug)]
pub struct SuiteRunner<'r> {
    config: CliConfig,
    registry: &'r TestRegistry,
    reporter: ProgressReporter,
}

impl<'r> SuiteRunner<'r> {
    /// Create a runner over `registry`
    #[must_use]
    pub fn new(config: CliConfig, registry: &'r TestRegistry) -> Self {
        let reporter =
            ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
        Self {
            config,
            registry,
            reporter,
        }
    }

    /// Select, run and report
    ///
    /// # Errors
    ///
    /// Configuration, infrastructure or report errors. Failing tests are not
    /// errors here; check [`SuiteOutcome::all_passed`].
    pub fn run(&mut self, args: &RunArgs) -> CliResult<SuiteOutcome> {
        let loaded = load_harness_config(self.config.harness_config.as_deref())?;
        let harness = Arc::new(apply_overrides(loaded, args)?);
        init_logging(&log_config(&harness, self.config.verbosity))?;

        let cases = self.registry.select(&build_filter(args)?);
        if cases.is_empty() {
            warn!(registered = self.registry.len(), "no tests selected");
            self.reporter.warning("No tests found");
            return Ok(SuiteOutcome::default());
        }
        let workers = effective_jobs(args.parallel);
        info!(
            selected = cases.len(),
            registered = self.registry.len(),
            workers,
            run_id = %harness.unique_id,
            "selected tests"
        );
        if let Some(notice) = self.selection_notice(cases.len(), &harness.unique_id) {
            self.reporter.info(&notice);
        }

        let integrations = IntegrationRegistry::from_config(&harness)?;
        let names = integrations.enabled_names();
        if !names.is_empty() {
            self.reporter
                .info(&format!("Integrations: {}", names.join(", ")));
        }

        let runner = TestRunner::from_config(Arc::clone(&harness))
            .with_reports(integrations.report_integrations());
        let executor = SuiteExecutor::new(runner).with_parallelism(workers);

        self.reporter.header("Running Tests");
        self.reporter.start_progress(cases.len() as u64, &harness.unique_id);

        let reporter = &self.reporter;
        let outcome = executor.execute(&cases, |entry| reporter.record(entry));
        self.reporter.finish();
        let outcome = outcome?;
        info!(
            passed = outcome.passed_count(),
            failed = outcome.failed_count(),
            flaky = outcome.flaky_count(),
            "run finished"
        );

        self.reporter.summary(
            outcome.passed_count(),
            outcome.failed_count(),
            outcome.flaky_count(),
            outcome.duration,
        );

        if let Some(path) = junit_destination(&harness, args) {
            SuiteReport::new(harness.unique_id.clone(), &outcome)
                .generate_junit(&path)
                .map_err(|e| CliError::report_generation(e.to_string()))?;
            info!(path = %path.display(), "wrote JUnit report");
            self.reporter
                .info(&format!("JUnit report: {}", path.display()));
        }

        Ok(outcome)
    }

    /// Extra line shown before the run with `-v` or more
    #[must_use]
    pub fn selection_notice(&self, selected: usize, run_id: &str) -> Option<String> {
        self.config.verbosity.is_verbose().then(|| {
            format!(
                "Selected {selected} of {} tests (run {run_id})",
                self.registry.len()
            )
        })
    }

    /// Get the reporter (for testing)
    #[must_use]
    pub const fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }
}
