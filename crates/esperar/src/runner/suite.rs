//! Parallel suite execution with per-test retries.

use super::{TestResult, TestRunner};
use crate::harness::TestCase;
use crate::result::{EsperarError, EsperarResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Final result of one test plus how many attempts it took
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteEntry {
    /// Result of the last attempt
    pub result: TestResult,
    /// Attempts made (1 = no retry)
    pub attempts: u32,
}

/// Results of a suite run, in input order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteOutcome {
    /// One entry per selected test
    pub entries: Vec<SuiteEntry>,
    /// Wall-clock duration of the whole run
    pub duration: Duration,
}

impl SuiteOutcome {
    /// Check if all tests passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.entries.iter().all(|e| e.result.passed)
    }

    /// Count passed tests
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.result.passed).count()
    }

    /// Count failed tests
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.result.passed).count()
    }

    /// Tests that passed only after a retry
    #[must_use]
    pub fn flaky_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.result.passed && e.attempts > 1)
            .count()
    }

    /// Get total test count
    #[must_use]
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    /// Final results, in input order
    pub fn results(&self) -> impl Iterator<Item = &TestResult> {
        self.entries.iter().map(|e| &e.result)
    }
}

/// Runs many cases over scoped worker threads
#[derive(Debug, Clone)]
pub struct SuiteExecutor {
    runner: TestRunner,
    parallelism: usize,
    max_retries: u32,
}

impl SuiteExecutor {
    /// Executor using `runner`, retry count from its configuration, one worker
    #[must_use]
    pub fn new(runner: TestRunner) -> Self {
        let max_retries = runner.config().max_retries;
        Self {
            runner,
            parallelism: 1,
            max_retries,
        }
    }

    /// Number of worker threads (at least 1)
    #[must_use]
    pub fn with_parallelism(mut self, workers: usize) -> Self {
        self.parallelism = workers.max(1);
        self
    }

    /// Re-runs allowed for a failing test
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Run one case, retrying failures; every attempt is independent
    ///
    /// # Errors
    ///
    /// Infrastructure errors from the runner.
    pub fn run_with_retries(&self, case: &TestCase) -> EsperarResult<SuiteEntry> {
        let mut attempt = 1;
        loop {
            let result = self.runner.run(case, &format!("attempt-{attempt}"))?;
            if result.passed || attempt > self.max_retries {
                return Ok(SuiteEntry {
                    result,
                    attempts: attempt,
                });
            }
            warn!(test = %case.unit, attempt, "test failed, retrying");
            attempt += 1;
        }
    }

    /// Run `cases`, calling `on_complete` as each one finishes.
    ///
    /// # Errors
    ///
    /// The first infrastructure error; no new cases start after it.
    pub fn execute<F>(&self, cases: &[TestCase], on_complete: F) -> EsperarResult<SuiteOutcome>
    where
        F: Fn(&SuiteEntry) + Sync,
    {
        let start = Instant::now();
        let next = AtomicUsize::new(0);
        let abort = AtomicBool::new(false);
        let slots: Mutex<Vec<Option<SuiteEntry>>> = Mutex::new(vec![None; cases.len()]);
        let first_error: Mutex<Option<EsperarError>> = Mutex::new(None);
        let workers = self.parallelism.min(cases.len()).max(1);

        info!(tests = cases.len(), workers, max_retries = self.max_retries, "running suite");

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if abort.load(Ordering::SeqCst) {
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(case) = cases.get(index) else {
                        break;
                    };
                    match self.run_with_retries(case) {
                        Ok(entry) => {
                            on_complete(&entry);
                            slots.lock().unwrap_or_else(PoisonError::into_inner)[index] = Some(entry);
                        }
                        Err(err) => {
                            abort.store(true, Ordering::SeqCst);
                            first_error
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .get_or_insert(err);
                        }
                    }
                });
            }
        });

        if let Some(err) = first_error.into_inner().unwrap_or_else(PoisonError::into_inner) {
            return Err(err);
        }
        let entries = slots
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .flatten()
            .collect();
        Ok(SuiteOutcome {
            entries,
            duration: start.elapsed(),
        })
    }
}
