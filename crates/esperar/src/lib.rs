//! Esperar: bounded condition polling and test orchestration for remote UI sessions
//!
//! Esperar (Spanish: "to wait") drives a remote browser or device session,
//! waits for asynchronous UI state to settle, runs test methods against that
//! session, and reports each outcome to external trackers exactly once.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    ESPERAR Architecture                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Waiter     │    │ Condition  │    │ Session    │            │
//! │   │ predicates │───►│ Poller     │───►│ (remote)   │            │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! │                                                                 │
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Test       │    │ Reporting  │    │ Integration│            │
//! │   │ Runner     │───►│ Dispatcher │    │ Facade     │            │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use esperar::{ElementHandle, MockSession, Poller, Selector, Waiter};
//!
//! let session = MockSession::new("demo")
//!     .with_elements(Selector::css("#login"), vec![ElementHandle::new("e1", "button")]);
//! let waiter = Waiter::new(&session, Poller::system());
//! let button = waiter.clickable_after(&Selector::css("#login"), 5).unwrap();
//! assert_eq!(button.id, "e1");
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

/// Injectable time source for deterministic polling
pub mod clock;

/// Predicate implementations fed to the poller
pub mod conditions;

/// Harness configuration loaded from YAML
pub mod config;

/// Session capability traits and the scripted mock session
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod driver;

/// Test descriptors, suites, registry and selection
pub mod harness;

/// Integration facade and concrete integrations
pub mod integration;

/// Element selectors and positions
pub mod locator;

/// Process logging and per-test capture
pub mod logging;

/// Report listeners, dispatch and suite reports
pub mod reporter;

mod result;

/// Single-test execution and parallel suites
pub mod runner;

/// Session lifecycle around test bodies
pub mod session;

/// Bounded condition poller
pub mod wait;

/// Predicate waits bound to a search context
#[allow(clippy::missing_errors_doc)]
pub mod waiter;

pub use clock::{system_clock, Clock, FakeClock, SharedClock, SystemClock};
pub use conditions::{
    Absent, Clickable, ConditionKind, ContainsText, NotMoving, NotVisible, Present, StabilityState,
    Visible, STABILITY_THRESHOLD_PX, STABLE_COMPARISONS_REQUIRED,
};
pub use config::{HarnessConfig, SauceConfig};
pub use driver::{
    Capabilities, ElementHandle, ElementScope, MockSession, MockSessionFactory, SearchContext,
    Session, SessionFactory,
};
pub use harness::{
    QuarantineMode, TestBody, TestCase, TestFilter, TestRegistry, TestSuite, TestUnit,
};
pub use integration::{
    Integration, IntegrationFacade, IntegrationRegistry, LifecycleState, RecordingIntegration,
};
pub use locator::{Point, Selector};
pub use logging::{capture_subscriber, init_logging, LogConfig, LogFormat};
pub use reporter::{ReportDispatcher, ReportIntegration, ReportListener, SuiteReport};
pub use result::{ensure, EsperarError, EsperarResult};
pub use runner::{
    OutputSink, SuiteEntry, SuiteExecutor, SuiteOutcome, TestContext, TestResult, TestRunner,
};
pub use session::{LazySession, SessionContext, SessionTest};
pub use wait::{Condition, FnCondition, PollOutcome, Poller, WaitSpec, Waited};
pub use waiter::Waiter;
