//! Condition Poller
//!
//! Bounded, blocking evaluation of a [`Condition`] against a session.
//!
//! Every attempt re-locates the children of a locator and hands them to the
//! condition. The loop ends on the first of:
//!
//! - `Ready`: the value is returned with elapsed time and attempt count
//! - `Fatal` (or a session error while locating): returned immediately
//! - deadline reached: [`EsperarError::Timeout`]
//!
//! Between attempts the loop sleeps `min(poll_interval, remaining)`, so the
//! last attempt lands at or before the deadline. A zero timeout performs
//! exactly one evaluation.

use crate::clock::{system_clock, SharedClock};
use crate::conditions::ConditionKind;
use crate::driver::{ElementHandle, SearchContext};
use crate::locator::Selector;
use crate::result::{EsperarError, EsperarResult};
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for wait predicates (30 seconds)
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 30;

/// Default polling interval (500ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Smallest interval the poller will sleep between attempts
pub const MIN_POLL_INTERVAL_MS: u64 = 1;

// =============================================================================
// POLL OUTCOME
// =============================================================================

/// Result of evaluating a condition once
#[derive(Debug)]
pub enum PollOutcome<T> {
    /// Condition holds
    Ready(T),
    /// Condition does not hold yet; the reason is kept for diagnostics
    NotYetReady(String),
    /// Evaluation cannot continue
    Fatal(EsperarError),
}

impl<T> PollOutcome<T> {
    /// Not ready, with a reason
    #[must_use]
    pub fn not_yet(reason: impl Into<String>) -> Self {
        Self::NotYetReady(reason.into())
    }

    /// Whether the outcome is `Ready`
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Whether the outcome is `NotYetReady`
    #[must_use]
    pub const fn is_not_yet(&self) -> bool {
        matches!(self, Self::NotYetReady(_))
    }

    /// Whether the outcome is `Fatal`
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

// =============================================================================
// CONDITION TRAIT
// =============================================================================

/// A predicate over the current matches of a locator
///
/// `State` is created with `Default` at the start of every poll invocation
/// and threaded through each attempt; it never outlives the invocation.
pub trait Condition {
    /// Value produced once the condition holds
    type Output;
    /// Accumulator carried across attempts of one invocation
    type State: Default;

    /// Kind used in timeout diagnostics
    fn kind(&self) -> ConditionKind;

    /// Evaluate against the current sample
    fn evaluate(&self, state: &mut Self::State, children: Vec<ElementHandle>)
        -> PollOutcome<Self::Output>;
}

/// Closure-backed condition for one-off checks
pub struct FnCondition<F> {
    description: String,
    check: F,
}

impl<F, T> FnCondition<F>
where
    F: Fn(&[ElementHandle]) -> PollOutcome<T>,
{
    /// Create a custom condition
    pub fn new(description: impl Into<String>, check: F) -> Self {
        Self {
            description: description.into(),
            check,
        }
    }
}

impl<F> fmt::Debug for FnCondition<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCondition")
            .field("description", &self.description)
            .finish()
    }
}

impl<F, T> Condition for FnCondition<F>
where
    F: Fn(&[ElementHandle]) -> PollOutcome<T>,
{
    type Output = T;
    type State = ();

    fn kind(&self) -> ConditionKind {
        ConditionKind::Custom(self.description.clone())
    }

    fn evaluate(&self, _state: &mut (), children: Vec<ElementHandle>) -> PollOutcome<T> {
        (self.check)(&children)
    }
}

// =============================================================================
// WAIT SPEC
// =============================================================================

/// What to wait on and for how long
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitSpec {
    /// Locator evaluated on each attempt
    pub locator: Selector,
    /// Budget in seconds; zero means a single immediate check
    pub timeout_secs: u64,
    /// Sleep between attempts in milliseconds
    pub poll_interval_ms: u64,
}

impl WaitSpec {
    /// Wait on `locator` for `timeout_secs` at the default interval
    #[must_use]
    pub fn new(locator: Selector, timeout_secs: u64) -> Self {
        Self {
            locator,
            timeout_secs,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }

    /// Single immediate check
    #[must_use]
    pub fn immediate(locator: Selector) -> Self {
        Self::new(locator, 0)
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Timeout as a duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Interval as a duration, never below [`MIN_POLL_INTERVAL_MS`]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }
}

/// A converged wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Waited<T> {
    /// Value produced by the condition
    pub value: T,
    /// Time from first attempt to convergence
    pub elapsed: Duration,
    /// Number of evaluations performed
    pub attempts: usize,
}

// =============================================================================
// POLLER
// =============================================================================

/// Blocking poll loop over a [`crate::clock::Clock`]
#[derive(Debug, Clone)]
pub struct Poller {
    clock: SharedClock,
    poll_interval: Duration,
}

impl Poller {
    /// Poller on `clock` at the default interval
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    /// Poller on wall-clock time
    #[must_use]
    pub fn system() -> Self {
        Self::new(system_clock())
    }

    /// Set the sleep between attempts
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(MIN_POLL_INTERVAL_MS));
        self
    }

    /// Sleep between attempts
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Clock the loop reads
    #[must_use]
    pub const fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Poll `condition` on the matches of `locator` for up to `timeout_secs`.
    ///
    /// # Errors
    ///
    /// - [`EsperarError::Timeout`] when the budget runs out
    /// - the session's error, unchanged, when locating fails or the
    ///   condition reports `Fatal`
    pub fn poll<S, C>(
        &self,
        context: &S,
        locator: &Selector,
        condition: &C,
        timeout_secs: u64,
    ) -> EsperarResult<Waited<C::Output>>
    where
        S: SearchContext + ?Sized,
        C: Condition,
    {
        let start = self.clock.now();
        let deadline = start + Duration::from_secs(timeout_secs);
        let mut state = C::State::default();
        let mut attempts = 0usize;

        loop {
            attempts += 1;
            let outcome = match context.find_elements(locator) {
                Ok(children) => condition.evaluate(&mut state, children),
                Err(err) => PollOutcome::Fatal(err),
            };

            let last_observed = match outcome {
                PollOutcome::Ready(value) => {
                    let elapsed = self.clock.now().saturating_sub(start);
                    debug!(%locator, kind = %condition.kind(), attempts, ?elapsed, "wait converged");
                    return Ok(Waited {
                        value,
                        elapsed,
                        attempts,
                    });
                }
                PollOutcome::Fatal(err) => {
                    debug!(%locator, attempts, error = %err, "wait aborted");
                    return Err(err);
                }
                PollOutcome::NotYetReady(reason) => {
                    trace!(%locator, attempts, %reason, "not ready");
                    reason
                }
            };

            let now = self.clock.now();
            if now >= deadline {
                return Err(EsperarError::Timeout {
                    kind: condition.kind(),
                    locator: locator.to_string(),
                    timeout_secs,
                    elapsed: now.saturating_sub(start),
                    attempts,
                    last_observed: Some(last_observed),
                });
            }
            self.clock.sleep(self.poll_interval.min(deadline - now));
        }
    }

    /// Poll using the locator, timeout and interval of `spec`
    ///
    /// # Errors
    ///
    /// Same as [`Poller::poll`].
    pub fn poll_spec<S, C>(
        &self,
        context: &S,
        spec: &WaitSpec,
        condition: &C,
    ) -> EsperarResult<Waited<C::Output>>
    where
        S: SearchContext + ?Sized,
        C: Condition,
    {
        self.clone()
            .with_poll_interval(spec.poll_interval())
            .poll(context, &spec.locator, condition, spec.timeout_secs)
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::system()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::clock::{Clock, FakeClock};
    use crate::conditions::{Absent, Present, Visible};
    use crate::driver::MockSession;

    fn fixture() -> (FakeClock, Poller) {
        let clock = FakeClock::new();
        let poller = Poller::new(clock.shared());
        (clock, poller)
    }

    mod poll_outcome_tests {
        use super::*;

        #[test]
        fn test_predicates() {
            assert!(PollOutcome::Ready(1).is_ready());
            assert!(PollOutcome::<()>::not_yet("x").is_not_yet());
            assert!(PollOutcome::<()>::Fatal(EsperarError::SessionNotStarted).is_fatal());
        }
    }

    mod wait_spec_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let spec = WaitSpec::new(Selector::css("a"), 10);
            assert_eq!(spec.timeout(), Duration::from_secs(10));
            assert_eq!(spec.poll_interval(), Duration::from_millis(500));
        }

        #[test]
        fn test_zero_interval_is_clamped() {
            let spec = WaitSpec::immediate(Selector::css("a")).with_poll_interval(0);
            assert_eq!(spec.timeout_secs, 0);
            assert_eq!(spec.poll_interval(), Duration::from_millis(1));
        }
    }

    mod poller_tests {
        use super::*;

        #[test]
        fn test_immediate_ready() {
            let (clock, poller) = fixture();
            let sel = Selector::css("#a");
            let session = MockSession::new("s")
                .with_clock(clock.shared())
                .with_elements(sel.clone(), vec![ElementHandle::new("a", "div")]);
            let waited = poller.poll(&session, &sel, &Present, 5).unwrap();
            assert_eq!(waited.value.id, "a");
            assert_eq!(waited.attempts, 1);
            assert_eq!(waited.elapsed, Duration::ZERO);
            assert_eq!(clock.sleep_count(), 0);
        }

        #[test]
        fn test_zero_timeout_evaluates_exactly_once() {
            let (clock, poller) = fixture();
            let sel = Selector::css("#missing");
            let session = MockSession::new("s").with_clock(clock.shared());
            let err = poller.poll(&session, &sel, &Present, 0).unwrap_err();
            match err {
                EsperarError::Timeout {
                    attempts,
                    timeout_secs,
                    ..
                } => {
                    assert_eq!(attempts, 1);
                    assert_eq!(timeout_secs, 0);
                }
                other => panic!("expected timeout, got {other:?}"),
            }
            assert_eq!(session.find_count(&sel), 1);
            assert_eq!(clock.sleep_count(), 0);
        }

        #[test]
        fn test_fatal_stops_after_one_attempt() {
            let (clock, poller) = fixture();
            let sel = Selector::css("#x");
            let session = MockSession::new("s")
                .with_clock(clock.shared())
                .with_failure(sel.clone(), "window closed");
            let err = poller.poll(&session, &sel, &Present, 30).unwrap_err();
            assert!(err.is_fatal());
            assert_eq!(session.find_count(&sel), 1);
            assert_eq!(clock.now(), Duration::ZERO);
        }

        #[test]
        fn test_condition_fatal_stops_loop() {
            let (_clock, poller) = fixture();
            let sel = Selector::css("#x");
            let session = MockSession::new("s");
            let cond = FnCondition::new("explodes", |_: &[ElementHandle]| {
                PollOutcome::<()>::Fatal(EsperarError::session("stale"))
            });
            assert!(poller.poll(&session, &sel, &cond, 10).is_err());
            assert_eq!(session.find_count(&sel), 1);
        }

        #[test]
        fn test_never_sleeps_past_deadline() {
            let (clock, poller) = fixture();
            let poller = poller.with_poll_interval(Duration::from_millis(700));
            let sel = Selector::css("#never");
            let session = MockSession::new("s").with_clock(clock.shared());
            let err = poller.poll(&session, &sel, &Present, 2).unwrap_err();
            // 0, 0.7, 1.4, then clipped to 2.0
            assert_eq!(clock.now(), Duration::from_secs(2));
            assert_eq!(session.find_count(&sel), 4);
            assert!(err.is_timeout());
        }

        #[test]
        fn test_timeout_carries_diagnostics() {
            let (_clock, poller) = fixture();
            let sel = Selector::css("#late");
            let session = MockSession::new("s").with_clock(poller.clock().clone());
            let err = poller.poll(&session, &sel, &Visible, 1).unwrap_err();
            assert_eq!(err.to_string(), "Element css=#late is not visible after 1 seconds");
            match err {
                EsperarError::Timeout {
                    elapsed,
                    attempts,
                    last_observed,
                    ..
                } => {
                    assert_eq!(elapsed, Duration::from_secs(1));
                    assert_eq!(attempts, 3);
                    assert_eq!(last_observed.as_deref(), Some("no elements found"));
                }
                other => panic!("expected timeout, got {other:?}"),
            }
        }

        #[test]
        fn test_visible_after_element_appears_then_shows() {
            let clock = FakeClock::new();
            let sel = Selector::css("#toast");
            let session = MockSession::new("s")
                .with_clock(clock.shared())
                .with_elements_at(
                    sel.clone(),
                    Duration::from_secs(2),
                    vec![ElementHandle::new("t", "div").displayed(false)],
                )
                .with_elements_at(
                    sel.clone(),
                    Duration::from_secs(3),
                    vec![ElementHandle::new("t", "div")],
                );

            let poller = Poller::new(clock.shared());
            let waited = poller.poll(&session, &sel, &Visible, 5).unwrap();
            assert_eq!(waited.elapsed, Duration::from_secs(3));
            assert_eq!(waited.value.id, "t");

            let clock = FakeClock::new();
            let session = session.with_clock(clock.shared());
            let poller = Poller::new(clock.shared());
            let err = poller.poll(&session, &sel, &Visible, 2).unwrap_err();
            assert!(err.is_timeout());
        }

        #[test]
        fn test_absent_with_no_matches_is_single_poll() {
            let (clock, poller) = fixture();
            let sel = Selector::css("#spinner");
            let session = MockSession::new("s").with_clock(clock.shared());
            let waited = poller.poll(&session, &sel, &Absent, 1).unwrap();
            assert_eq!(waited.attempts, 1);
            assert_eq!(session.find_count(&sel), 1);
        }

        #[test]
        fn test_state_is_fresh_per_invocation() {
            use crate::conditions::NotMoving;
            let (clock, poller) = fixture();
            let sel = Selector::css("#still");
            let session = MockSession::new("s")
                .with_clock(clock.shared())
                .with_elements(sel.clone(), vec![ElementHandle::new("m", "div").at(3, 3)]);
            let first = poller.poll(&session, &sel, &NotMoving, 5).unwrap();
            let second = poller.poll(&session, &sel, &NotMoving, 5).unwrap();
            assert_eq!(first.attempts, 3);
            assert_eq!(second.attempts, 3);
        }
    }
}
