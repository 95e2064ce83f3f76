//! Session capability traits and a scripted mock session.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  SearchContext      find_elements(selector) -> Vec<ElementHandle> │
//! │        ▲                                                          │
//! │        │                                                          │
//! │  Session            + session_id, move_to, click, send_keys,      │
//! │        ▲              find_elements_within, close                 │
//! │        │                                                          │
//! │  ┌─────┴──────────┐   ┌──────────────────────┐                    │
//! │  │ Remote driver  │   │ MockSession          │                    │
//! │  │ (external)     │   │ scripted over Clock  │                    │
//! │  └────────────────┘   └──────────────────────┘                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The wire protocol behind [`Session`] is external. The wait engine only
//! needs the current matches of a selector and each match's state.

use crate::clock::{system_clock, SharedClock};
use crate::locator::{Point, Selector};
use crate::result::{EsperarError, EsperarResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Desired capabilities handed to a [`SessionFactory`]
pub type Capabilities = serde_json::Map<String, serde_json::Value>;

/// Snapshot of one element as reported by the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Session-scoped element id
    pub id: String,
    /// Lowercase tag name
    pub tag_name: String,
    /// Rendered text
    pub text: String,
    /// Attribute values
    pub attributes: BTreeMap<String, String>,
    /// Whether the element is displayed
    pub displayed: bool,
    /// Whether the element accepts input
    pub enabled: bool,
    /// Top-left position in pixels
    pub location: Point,
}

impl ElementHandle {
    /// Create a displayed, enabled element at the origin
    #[must_use]
    pub fn new(id: impl Into<String>, tag_name: impl Into<String>) -> Self {
        let tag_name: String = tag_name.into();
        Self {
            id: id.into(),
            tag_name: tag_name.to_ascii_lowercase(),
            text: String::new(),
            attributes: BTreeMap::new(),
            displayed: true,
            enabled: true,
            location: Point::default(),
        }
    }

    /// Set rendered text
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set the `value` attribute
    #[must_use]
    pub fn with_value(self, value: impl Into<String>) -> Self {
        self.with_attribute("value", value)
    }

    /// Set displayed state
    #[must_use]
    pub const fn displayed(mut self, displayed: bool) -> Self {
        self.displayed = displayed;
        self
    }

    /// Set enabled state
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set position
    #[must_use]
    pub const fn at(mut self, x: i32, y: i32) -> Self {
        self.location = Point::new(x, y);
        self
    }

    /// Attribute value, if present
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Displayed state
    #[must_use]
    pub const fn is_displayed(&self) -> bool {
        self.displayed
    }

    /// Displayed and enabled
    #[must_use]
    pub const fn is_clickable(&self) -> bool {
        self.displayed && self.enabled
    }

    /// Text a user would see as the element's content.
    ///
    /// Form fields hold their content in the `value` attribute, so `input`
    /// and `textarea` read that; every other tag reads rendered text.
    #[must_use]
    pub fn effective_text(&self) -> &str {
        match self.tag_name.as_str() {
            "input" | "textarea" => self.attribute("value").unwrap_or(""),
            _ => &self.text,
        }
    }
}

/// Anything that can locate elements: a session, or an element scope within one
pub trait SearchContext: Send + Sync {
    /// Current matches for `selector`
    ///
    /// # Errors
    ///
    /// Returns a fatal error when the session is unusable or the selector is
    /// malformed. An empty match is not an error.
    fn find_elements(&self, selector: &Selector) -> EsperarResult<Vec<ElementHandle>>;
}

/// A live connection to a remote browser or device
pub trait Session: SearchContext {
    /// Remote session identifier; empty until the remote end assigns one
    fn session_id(&self) -> &str;

    /// Matches for `selector` below `parent`
    fn find_elements_within(
        &self,
        parent: &ElementHandle,
        selector: &Selector,
    ) -> EsperarResult<Vec<ElementHandle>>;

    /// Move the pointer onto `element`
    fn move_to(&self, element: &ElementHandle) -> EsperarResult<()>;

    /// Click `element`
    fn click(&self, element: &ElementHandle) -> EsperarResult<()>;

    /// Type `keys` into `element`
    fn send_keys(&self, element: &ElementHandle, keys: &str) -> EsperarResult<()>;

    /// End the remote session
    fn close(&self) -> EsperarResult<()>;
}

/// Creates sessions against a grid address
pub trait SessionFactory: Send + Sync {
    /// Session type produced
    type Session: Session + 'static;

    /// Connect to `address` with `capabilities`
    fn create(&self, address: &str, capabilities: &Capabilities) -> EsperarResult<Self::Session>;
}

/// Search context restricted to the descendants of one element
pub struct ElementScope<'s, S: ?Sized> {
    session: &'s S,
    parent: ElementHandle,
}

impl<'s, S: Session + ?Sized> ElementScope<'s, S> {
    /// Scope searches below `parent`
    #[must_use]
    pub const fn new(session: &'s S, parent: ElementHandle) -> Self {
        Self { session, parent }
    }

    /// The container element
    #[must_use]
    pub const fn parent(&self) -> &ElementHandle {
        &self.parent
    }
}

impl<S: ?Sized> fmt::Debug for ElementScope<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementScope")
            .field("parent", &self.parent.id)
            .finish()
    }
}

impl<S: Session + ?Sized> SearchContext for ElementScope<'_, S> {
    fn find_elements(&self, selector: &Selector) -> EsperarResult<Vec<ElementHandle>> {
        self.session.find_elements_within(&self.parent, selector)
    }
}

// =============================================================================
// MOCK SESSION
// =============================================================================

#[derive(Debug)]
enum Script {
    /// Matches switch at offsets on the session clock
    Timeline(Vec<(Duration, Vec<ElementHandle>)>),
    /// Each query consumes one sample; the last sample repeats
    Sequence(VecDeque<Vec<ElementHandle>>),
    /// Every query fails with a session error
    Failing(String),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock session for unit testing
///
/// Answers are scripted per selector, either as a timeline read from the
/// session clock or as a sequence consumed one query at a time.
#[derive(Debug)]
pub struct MockSession {
    session_id: String,
    clock: SharedClock,
    scripts: Mutex<HashMap<Selector, Script>>,
    call_history: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MockSession {
    /// Create a mock session on the system clock
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            clock: system_clock(),
            scripts: Mutex::new(HashMap::new()),
            call_history: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Read timelines from `clock`
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// `selector` matches `elements` from t=0
    #[must_use]
    pub fn with_elements(self, selector: Selector, elements: Vec<ElementHandle>) -> Self {
        self.with_elements_at(selector, Duration::ZERO, elements)
    }

    /// `selector` matches `elements` from `offset` until the next scripted change
    #[must_use]
    pub fn with_elements_at(
        self,
        selector: Selector,
        offset: Duration,
        elements: Vec<ElementHandle>,
    ) -> Self {
        self.script_at(selector, offset, elements);
        self
    }

    /// Successive queries for `selector` return successive samples
    #[must_use]
    pub fn with_sequence(self, selector: Selector, samples: Vec<Vec<ElementHandle>>) -> Self {
        lock(&self.scripts).insert(selector, Script::Sequence(samples.into()));
        self
    }

    /// Queries for `selector` fail as if the session were gone
    #[must_use]
    pub fn with_failure(self, selector: Selector, message: impl Into<String>) -> Self {
        lock(&self.scripts).insert(selector, Script::Failing(message.into()));
        self
    }

    /// Add a timeline entry to a live session
    pub fn script_at(&self, selector: Selector, offset: Duration, elements: Vec<ElementHandle>) {
        let mut scripts = lock(&self.scripts);
        let entry = scripts
            .entry(selector)
            .or_insert_with(|| Script::Timeline(Vec::new()));
        if !matches!(entry, Script::Timeline(_)) {
            *entry = Script::Timeline(Vec::new());
        }
        if let Script::Timeline(steps) = entry {
            steps.push((offset, elements));
            steps.sort_by_key(|(at, _)| *at);
        }
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        lock(&self.call_history).clone()
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        lock(&self.call_history)
            .iter()
            .any(|c| c.starts_with(method))
    }

    /// Number of top-level queries issued for `selector`
    #[must_use]
    pub fn find_count(&self, selector: &Selector) -> usize {
        let call = format!("find:{selector}");
        lock(&self.call_history)
            .iter()
            .filter(|c| **c == call)
            .count()
    }

    /// Whether `close` has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        lock(&self.call_history).push(call);
    }

    fn ensure_open(&self) -> EsperarResult<()> {
        if self.is_closed() {
            Err(EsperarError::session(format!(
                "session {} is closed",
                self.session_id
            )))
        } else {
            Ok(())
        }
    }

    fn resolve(&self, selector: &Selector) -> EsperarResult<Vec<ElementHandle>> {
        self.ensure_open()?;
        selector.validate()?;
        let now = self.clock.now();
        let mut scripts = lock(&self.scripts);
        let Some(script) = scripts.get_mut(selector) else {
            return Ok(Vec::new());
        };
        match script {
            Script::Timeline(steps) => Ok(steps
                .iter()
                .rev()
                .find(|(at, _)| *at <= now)
                .map(|(_, elements)| elements.clone())
                .unwrap_or_default()),
            Script::Sequence(samples) => {
                if samples.len() > 1 {
                    Ok(samples.pop_front().unwrap_or_default())
                } else {
                    Ok(samples.front().cloned().unwrap_or_default())
                }
            }
            Script::Failing(message) => Err(EsperarError::session(message.clone())),
        }
    }
}

impl SearchContext for MockSession {
    fn find_elements(&self, selector: &Selector) -> EsperarResult<Vec<ElementHandle>> {
        self.record(format!("find:{selector}"));
        self.resolve(selector)
    }
}

impl Session for MockSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn find_elements_within(
        &self,
        parent: &ElementHandle,
        selector: &Selector,
    ) -> EsperarResult<Vec<ElementHandle>> {
        self.record(format!("find_within:{}:{selector}", parent.id));
        self.resolve(selector)
    }

    fn move_to(&self, element: &ElementHandle) -> EsperarResult<()> {
        self.ensure_open()?;
        self.record(format!("move_to:{}", element.id));
        Ok(())
    }

    fn click(&self, element: &ElementHandle) -> EsperarResult<()> {
        self.ensure_open()?;
        self.record(format!("click:{}", element.id));
        Ok(())
    }

    fn send_keys(&self, element: &ElementHandle, keys: &str) -> EsperarResult<()> {
        self.ensure_open()?;
        self.record(format!("send_keys:{}:{keys}", element.id));
        Ok(())
    }

    fn close(&self) -> EsperarResult<()> {
        self.record("close".to_string());
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hook applied to every session a [`MockSessionFactory`] creates
pub type MockScript = Arc<dyn Fn(MockSession) -> MockSession + Send + Sync>;

/// Factory producing scripted [`MockSession`]s
pub struct MockSessionFactory {
    clock: SharedClock,
    script: MockScript,
    failure: Option<String>,
    anonymous: bool,
    created: AtomicUsize,
    addresses: Mutex<Vec<String>>,
}

impl MockSessionFactory {
    /// Sessions with no scripted elements
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: system_clock(),
            script: Arc::new(|session| session),
            failure: None,
            anonymous: false,
            created: AtomicUsize::new(0),
            addresses: Mutex::new(Vec::new()),
        }
    }

    /// Clock given to created sessions
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Script applied to each new session
    #[must_use]
    pub fn with_script(
        mut self,
        script: impl Fn(MockSession) -> MockSession + Send + Sync + 'static,
    ) -> Self {
        self.script = Arc::new(script);
        self
    }

    /// Every `create` call fails
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Created sessions report an empty session id
    #[must_use]
    pub const fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }

    /// Number of sessions created
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Addresses `create` was called with
    #[must_use]
    pub fn addresses(&self) -> Vec<String> {
        lock(&self.addresses).clone()
    }
}

impl Default for MockSessionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockSessionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockSessionFactory")
            .field("failure", &self.failure)
            .field("created", &self.created())
            .finish()
    }
}

impl SessionFactory for MockSessionFactory {
    type Session = MockSession;

    fn create(&self, address: &str, _capabilities: &Capabilities) -> EsperarResult<MockSession> {
        lock(&self.addresses).push(address.to_string());
        if let Some(message) = &self.failure {
            return Err(EsperarError::session(message.clone()));
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let id = if self.anonymous {
            String::new()
        } else {
            format!("mock-session-{n}")
        };
        Ok((self.script)(
            MockSession::new(id).with_clock(self.clock.clone()),
        ))
    }
}
