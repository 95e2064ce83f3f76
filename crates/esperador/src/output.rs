//! Output formatting and progress reporting

use console::{style, Style, Term};
use esperar::SuiteEntry;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// One line describing a finished test
#[must_use]
pub fn describe_entry(entry: &SuiteEntry) -> String {
    let result = &entry.result;
    let mut line = format!("{} ({} ms)", result.unit, result.duration_ms);
    if entry.attempts > 1 {
        line.push_str(&format!(" after {} attempts", entry.attempts));
    }
    if let Some(cause) = &result.failure {
        line.push_str(&format!(": {cause}"));
    }
    line
}

/// Progress reporter for test execution
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar for multiple tests
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Record a finished test and advance the bar
    pub fn record(&self, entry: &SuiteEntry) {
        let line = describe_entry(entry);
        if entry.result.passed {
            self.success(&line);
        } else {
            self.failure(&line);
        }
        if let Some(ref pb) = self.progress_bar {
            pb.inc(1);
        }
    }

    /// Finish progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    fn emit(&self, line: &str) {
        match self.progress_bar {
            Some(ref pb) => pb.println(line),
            None => {
                let _ = self.term.write_line(line);
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("✓").green().bold().to_string()
        } else {
            "PASS".to_string()
        };

        self.emit(&format!("{prefix} {message}"));
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Always print failures, even in quiet mode
        let prefix = if self.use_color {
            style("✗").red().bold().to_string()
        } else {
            "FAIL".to_string()
        };

        self.emit(&format!("{prefix} {message}"));
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("⚠").yellow().bold().to_string()
        } else {
            "WARN".to_string()
        };

        self.emit(&format!("{prefix} {message}"));
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("ℹ").blue().bold().to_string()
        } else {
            "INFO".to_string()
        };

        self.emit(&format!("{prefix} {message}"));
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }

        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };

        let _ = self.term.write_line("");
        let _ = self.term.write_line(&styled);
    }

    /// Print test summary
    pub fn summary(&self, passed: usize, failed: usize, flaky: usize, duration: Duration) {
        if self.quiet && failed == 0 {
            return;
        }

        let _ = self.term.write_line("");

        let total = passed + failed;
        let duration_secs = duration.as_secs_f64();

        if self.use_color {
            let passed_style = Style::new().green().bold();
            let failed_style = Style::new().red().bold();
            let flaky_style = Style::new().yellow();

            let status = if failed > 0 {
                failed_style.apply_to("FAILED")
            } else {
                passed_style.apply_to("PASSED")
            };

            let _ = self.term.write_line(&format!(
                "{} {} tests in {:.2}s ({} passed, {} failed, {} flaky)",
                status,
                total,
                duration_secs,
                passed_style.apply_to(passed),
                if failed > 0 {
                    failed_style.apply_to(failed).to_string()
                } else {
                    failed.to_string()
                },
                flaky_style.apply_to(flaky)
            ));
        } else {
            let status = if failed > 0 { "FAILED" } else { "PASSED" };
            let _ = self.term.write_line(&format!(
                "{status} {total} tests in {duration_secs:.2}s ({passed} passed, {failed} failed, {flaky} flaky)"
            ));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use esperar::{TestResult, TestUnit};

    fn entry(failure: Option<&str>, attempts: u32) -> SuiteEntry {
        SuiteEntry {
            result: TestResult {
                unit: TestUnit::new("LoginTest", "logs_in"),
                passed: failure.is_none(),
                duration_ms: 42,
                output: String::new(),
                failure: failure.map(str::to_string),
            },
            attempts,
        }
    }

    mod describe_tests {
        use super::*;

        #[test]
        fn test_passing_entry() {
            assert_eq!(describe_entry(&entry(None, 1)), "LoginTest#logs_in (42 ms)");
        }

        #[test]
        fn test_failing_retried_entry() {
            assert_eq!(
                describe_entry(&entry(Some("Assertion failed: x"), 3)),
                "LoginTest#logs_in (42 ms) after 3 attempts: Assertion failed: x"
            );
        }
    }

    mod progress_reporter_tests {
        use super::*;

        #[test]
        fn test_new_reporter() {
            let reporter = ProgressReporter::new(true, false);
            assert!(reporter.use_color);
            assert!(!reporter.quiet);
        }

        #[test]
        fn test_progress_flow() {
            let mut reporter = ProgressReporter::new(false, false);
            reporter.start_progress(2, "Running tests");
            reporter.record(&entry(None, 1));
            reporter.record(&entry(Some("boom"), 1));
            reporter.finish();
            reporter.summary(1, 1, 0, Duration::from_secs(1));
        }

        #[test]
        fn test_quiet_mode_has_no_bar() {
            let mut reporter = ProgressReporter::new(false, true);
            reporter.start_progress(10, "Running tests");
            assert!(reporter.progress_bar.is_none());
            reporter.warning("hidden");
            reporter.failure("shown");
        }
    }
}
