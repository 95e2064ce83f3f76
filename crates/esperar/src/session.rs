//! Session lifecycle around a test body
//!
//! Configuration exists before any session does. The session itself is
//! created inside the test boundary and bound into a [`LazySession`] that
//! page objects already hold.
//!
//! ## Lifecycle of one [`SessionTest`] body
//!
//! ```text
//! log integrations ─► create session ─► bind handle ─► session_started
//!   ─► body (panics caught) ─► report_outcome (exactly once)
//!   ─► release handle ─► close session ─► torn_down
//! ```
//!
//! A failed session creation fails the test; every integration call is then
//! suppressed because no session identity exists.

use crate::clock::{system_clock, SharedClock};
use crate::config::HarnessConfig;
use crate::driver::{Capabilities, Session, SessionFactory};
use crate::harness::{TestBody, TestCase, TestUnit};
use crate::integration::IntegrationRegistry;
use crate::result::{EsperarError, EsperarResult};
use crate::runner::TestContext;
use crate::waiter::Waiter;
use serde_json::Value;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

/// Session handle bound only while a test runs
pub struct LazySession<S> {
    inner: RwLock<Option<Arc<S>>>,
}

impl<S> LazySession<S> {
    /// Unbound handle
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Bind `session`, replacing any previous binding
    pub fn bind(&self, session: Arc<S>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    /// The bound session
    ///
    /// # Errors
    ///
    /// [`EsperarError::SessionNotStarted`] outside the test boundary.
    pub fn get(&self) -> EsperarResult<Arc<S>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(EsperarError::SessionNotStarted)
    }

    /// Unbind, returning the session that was bound
    pub fn release(&self) -> Option<Arc<S>> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Whether a session is bound
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<S> Default for LazySession<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for LazySession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySession")
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// What a session test body sees
pub struct SessionContext<'t, S> {
    test: &'t TestContext,
    handle: Arc<LazySession<S>>,
    clock: SharedClock,
}

impl<S: Session> SessionContext<'_, S> {
    /// The live session
    ///
    /// # Errors
    ///
    /// [`EsperarError::SessionNotStarted`] once the handle is released.
    pub fn session(&self) -> EsperarResult<Arc<S>> {
        self.handle.get()
    }

    /// Handle to give page objects
    #[must_use]
    pub fn handle(&self) -> Arc<LazySession<S>> {
        Arc::clone(&self.handle)
    }

    /// Waiter over `session` with the configured interval and default timeout
    #[must_use]
    pub fn waiter<'s>(&self, session: &'s S) -> Waiter<'s, S> {
        let config = self.test.config();
        Waiter::new(session, config.poller(Arc::clone(&self.clock)))
            .with_default_timeout(config.wait_timeout_secs)
    }

    /// Write a line to the test's output
    pub fn log(&self, line: impl AsRef<str>) {
        self.test.log(line);
    }

    /// Harness configuration
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        self.test.config()
    }

    /// Descriptor of the running test
    #[must_use]
    pub fn unit(&self) -> &TestUnit {
        self.test.unit()
    }
}

impl<S> fmt::Debug for SessionContext<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("unit", self.test.unit())
            .field("handle", &self.handle)
            .finish()
    }
}

/// Capabilities declared on `unit`: `key=value` pairs, bare names as `true`
#[must_use]
pub fn declared_capabilities(unit: &TestUnit) -> Capabilities {
    unit.capabilities
        .iter()
        .map(|capability| match capability.split_once('=') {
            Some((key, value)) => (key.trim().to_string(), Value::from(value.trim())),
            None => (capability.trim().to_string(), Value::Bool(true)),
        })
        .collect()
}

type SessionBody<S> = dyn Fn(&SessionContext<'_, S>) -> EsperarResult<()> + Send + Sync;

/// Wraps bodies that need a live session into runnable test bodies
pub struct SessionTest<F: SessionFactory> {
    factory: Arc<F>,
    integrations: IntegrationRegistry,
    clock: SharedClock,
}

impl<F: SessionFactory + 'static> SessionTest<F> {
    /// Sessions from `factory`, lifecycle reported to `integrations`
    #[must_use]
    pub fn new(factory: Arc<F>, integrations: IntegrationRegistry) -> Self {
        Self {
            factory,
            integrations,
            clock: system_clock(),
        }
    }

    /// Clock used by waiters handed to bodies
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Turn `body` into a [`TestBody`] running the full lifecycle
    pub fn body(
        &self,
        body: impl Fn(&SessionContext<'_, F::Session>) -> EsperarResult<()> + Send + Sync + 'static,
    ) -> TestBody {
        let factory = Arc::clone(&self.factory);
        let integrations = self.integrations.clone();
        let clock = Arc::clone(&self.clock);
        let body: Arc<SessionBody<F::Session>> = Arc::new(body);
        Arc::new(move |test: &TestContext| {
            run_lifecycle(factory.as_ref(), &integrations, &clock, test, body.as_ref())
        })
    }

    /// Test case for `unit` running `body` in a session
    pub fn case(
        &self,
        unit: TestUnit,
        body: impl Fn(&SessionContext<'_, F::Session>) -> EsperarResult<()> + Send + Sync + 'static,
    ) -> TestCase {
        TestCase::from_body(unit, self.body(body))
    }
}

impl<F: SessionFactory> fmt::Debug for SessionTest<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTest")
            .field("integrations", &self.integrations)
            .finish()
    }
}

fn run_lifecycle<F: SessionFactory>(
    factory: &F,
    integrations: &IntegrationRegistry,
    clock: &SharedClock,
    test: &TestContext,
    body: &SessionBody<F::Session>,
) -> EsperarResult<()> {
    let config = test.config();
    let unit = test.unit();
    info!(integrations = ?integrations.enabled_names(), "Integrations enabled");

    let mut facade = integrations.facade();
    let address = config.resolved_remote_address();
    let capabilities = config.session_capabilities(&declared_capabilities(unit));
    let session = match factory.create(address, &capabilities) {
        Ok(session) => Arc::new(session),
        Err(err) => {
            warn!(address, error = %err, "session could not be created");
            facade.report_outcome(false);
            facade.torn_down();
            return Err(err);
        }
    };

    let handle = Arc::new(LazySession::new());
    handle.bind(Arc::clone(&session));
    facade.session_started(
        session.session_id(),
        &unit.job_name(&config.unique_id),
        &config.unique_id,
    );
    facade.test_running();

    let context = SessionContext {
        test,
        handle: Arc::clone(&handle),
        clock: Arc::clone(clock),
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&context)));
    facade.report_outcome(matches!(outcome, Ok(Ok(()))));

    handle.release();
    if let Err(err) = session.close() {
        warn!(session_id = session.session_id(), error = %err, "session did not close cleanly");
    }
    facade.torn_down();

    match outcome {
        Ok(result) => result,
        Err(payload) => panic::resume_unwind(payload),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::driver::{ElementHandle, MockSession, MockSessionFactory};
    use crate::integration::RecordingIntegration;
    use crate::locator::Selector;
    use crate::result::ensure;
    use crate::runner::TestRunner;
    use std::time::Duration;

    fn config() -> Arc<HarnessConfig> {
        Arc::new(HarnessConfig {
            unique_id: "1234567890".into(),
            ..HarnessConfig::default()
        })
    }

    fn login_factory(clock: &FakeClock) -> Arc<MockSessionFactory> {
        Arc::new(
            MockSessionFactory::new()
                .with_clock(clock.shared())
                .with_script(|session| {
                    session.with_elements_at(
                        Selector::id("login"),
                        Duration::from_secs(2),
                        vec![ElementHandle::new("btn", "button")],
                    )
                }),
        )
    }

    fn harness(
        factory: Arc<MockSessionFactory>,
        clock: &FakeClock,
    ) -> (SessionTest<MockSessionFactory>, RecordingIntegration) {
        let recorder = RecordingIntegration::new("rec");
        let test = SessionTest::new(factory, IntegrationRegistry::new().with(Arc::new(recorder.clone())))
            .with_clock(clock.shared());
        (test, recorder)
    }

    mod lazy_session_tests {
        use super::*;

        #[test]
        fn test_unbound_access_fails() {
            let handle: LazySession<MockSession> = LazySession::new();
            assert!(matches!(handle.get(), Err(EsperarError::SessionNotStarted)));
            assert!(!handle.is_bound());
        }

        #[test]
        fn test_bind_and_release() {
            let handle = LazySession::new();
            handle.bind(Arc::new(MockSession::new("s1")));
            assert_eq!(handle.get().unwrap().session_id(), "s1");
            assert!(handle.release().is_some());
            assert!(handle.get().is_err());
        }

        #[test]
        fn test_page_object_holds_handle_before_session() {
            struct LoginPage {
                session: Arc<LazySession<MockSession>>,
            }
            let handle = Arc::new(LazySession::new());
            let page = LoginPage {
                session: Arc::clone(&handle),
            };
            assert!(page.session.get().is_err());
            handle.bind(Arc::new(MockSession::new("late")));
            assert_eq!(page.session.get().unwrap().session_id(), "late");
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn test_passing_body_reports_once() {
            let clock = FakeClock::new();
            let factory = login_factory(&clock);
            let (test, recorder) = harness(Arc::clone(&factory), &clock);
            let case = test.case(TestUnit::new("app::LoginTest", "logs_in"), |ctx| {
                let session = ctx.session()?;
                let waiter = ctx.waiter(&session);
                let button = waiter.clickable_after(&Selector::id("login"), 5)?;
                session.click(&button)?;
                ctx.log("clicked login");
                Ok(())
            });

            let result = TestRunner::new(config()).run(&case, "").unwrap();
            assert!(result.passed, "{:?}", result.failure);
            assert!(result.output.contains("clicked login"));
            assert_eq!(
                recorder.calls(),
                vec![
                    "job_name:1234567890:LoginTest:logs_in:mock-session-1",
                    "build_name:1234567890:mock-session-1",
                    "test_passed:true:mock-session-1",
                ]
            );
            assert_eq!(factory.addresses(), vec![crate::config::DEFAULT_LOCAL_ADDRESS]);
        }

        #[test]
        fn test_failure_before_assertion_reports_false_once() {
            let clock = FakeClock::new();
            let (test, recorder) = harness(login_factory(&clock), &clock);
            let case = test.case(TestUnit::new("LoginTest", "breaks"), |_| {
                Err(EsperarError::session("connection reset"))
            });
            let result = TestRunner::new(config()).run(&case, "").unwrap();
            assert!(!result.passed);
            assert_eq!(recorder.count("test_passed:false"), 1);
            assert_eq!(recorder.count("test_passed"), 1);
        }

        #[test]
        fn test_panicking_body_reports_false_and_fails() {
            let clock = FakeClock::new();
            let (test, recorder) = harness(login_factory(&clock), &clock);
            let case = test.case(TestUnit::new("LoginTest", "panics"), |_| panic!("page object bug"));
            let result = TestRunner::new(config()).run(&case, "").unwrap();
            assert!(!result.passed);
            assert_eq!(result.failure.as_deref(), Some("test panicked: page object bug"));
            assert_eq!(recorder.count("test_passed:false"), 1);
        }

        #[test]
        fn test_timeout_fails_test_with_message() {
            let clock = FakeClock::new();
            let (test, recorder) = harness(login_factory(&clock), &clock);
            let case = test.case(TestUnit::new("LoginTest", "too_fast"), |ctx| {
                let session = ctx.session()?;
                ctx.waiter(&session).present_after(&Selector::id("login"), 1)?;
                ensure(true, "unreachable")
            });
            let result = TestRunner::new(config()).run(&case, "").unwrap();
            assert_eq!(
                result.failure.as_deref(),
                Some("Element id=login is not present after 1 seconds")
            );
            assert_eq!(recorder.count("test_passed:false"), 1);
        }

        #[test]
        fn test_session_released_and_closed() {
            let clock = FakeClock::new();
            let (test, _) = harness(login_factory(&clock), &clock);
            let leaked: Arc<std::sync::Mutex<Option<Arc<LazySession<MockSession>>>>> =
                Arc::default();
            let slot = Arc::clone(&leaked);
            let case = test.case(TestUnit::new("LoginTest", "leaks"), move |ctx| {
                *slot.lock().unwrap() = Some(ctx.handle());
                Ok(())
            });
            TestRunner::new(config()).run(&case, "").unwrap();
            let handle = leaked.lock().unwrap().take().unwrap();
            assert!(matches!(handle.get(), Err(EsperarError::SessionNotStarted)));
        }

        #[test]
        fn test_creation_failure_suppresses_integrations() {
            let clock = FakeClock::new();
            let factory = Arc::new(MockSessionFactory::new().failing("grid unreachable"));
            let (test, recorder) = harness(factory, &clock);
            let case = test.case(TestUnit::new("LoginTest", "never_runs"), |_| Ok(()));
            let result = TestRunner::new(config()).run(&case, "").unwrap();
            assert!(!result.passed);
            assert!(result.failure.unwrap().contains("grid unreachable"));
            assert!(recorder.calls().is_empty());
        }

        #[test]
        fn test_empty_session_id_suppresses_integrations() {
            let clock = FakeClock::new();
            let factory = Arc::new(MockSessionFactory::new().anonymous());
            let (test, recorder) = harness(factory, &clock);
            let case = test.case(TestUnit::new("LoginTest", "anonymous"), |_| Ok(()));
            assert!(TestRunner::new(config()).run(&case, "").unwrap().passed);
            assert!(recorder.calls().is_empty());
        }

        #[test]
        fn test_declared_capabilities_reach_factory() {
            let unit = TestUnit::new("S", "m")
                .with_capability("platformName=Android")
                .with_capability("autoGrantPermissions");
            let caps = declared_capabilities(&unit);
            assert_eq!(caps["platformName"], "Android");
            assert_eq!(caps["autoGrantPermissions"], true);
        }
    }
}
