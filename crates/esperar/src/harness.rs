//! Test discovery: descriptors, suites and selection.
//!
//! Discovery produces [`TestUnit`] descriptors paired with their bodies.
//! Execution is the runner's job; nothing here runs a test.

use crate::result::{EsperarError, EsperarResult};
use crate::runner::TestContext;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identity of one test method
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestUnit {
    /// Declaring suite, e.g. `checkout::CartTest`
    pub suite: String,
    /// Method within the suite
    pub method: String,
    /// Capabilities the test declares (device, browser, ...)
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Excluded from normal runs
    #[serde(default)]
    pub quarantined: bool,
}

impl TestUnit {
    /// Create a descriptor
    #[must_use]
    pub fn new(suite: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            method: method.into(),
            capabilities: Vec::new(),
            quarantined: false,
        }
    }

    /// Declare a capability
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    /// Mark as quarantined
    #[must_use]
    pub const fn quarantined(mut self) -> Self {
        self.quarantined = true;
        self
    }

    /// `Suite#method`
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}#{}", self.suite, self.method)
    }

    /// Last path segment of the suite
    #[must_use]
    pub fn short_suite(&self) -> &str {
        self.suite
            .rsplit(|c: char| c == ':' || c == '.')
            .next()
            .unwrap_or(&self.suite)
    }

    /// `Suite:method`, as listed for quarantined tests
    #[must_use]
    pub fn quarantine_label(&self) -> String {
        format!("{}:{}", self.suite, self.method)
    }

    /// Job name reported to integrations: `uniqueId:ShortSuite:method`
    #[must_use]
    pub fn job_name(&self, unique_id: &str) -> String {
        format!("{unique_id}:{}:{}", self.short_suite(), self.method)
    }
}

impl fmt::Display for TestUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.suite, self.method)
    }
}

/// Executable body of a test
pub type TestBody = Arc<dyn Fn(&TestContext) -> EsperarResult<()> + Send + Sync>;

/// A descriptor paired with its body
#[derive(Clone)]
pub struct TestCase {
    /// Descriptor
    pub unit: TestUnit,
    body: TestBody,
}

impl TestCase {
    /// Pair `unit` with `body`
    pub fn new(
        unit: TestUnit,
        body: impl Fn(&TestContext) -> EsperarResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            unit,
            body: Arc::new(body),
        }
    }

    /// Pair `unit` with an already shared body
    #[must_use]
    pub fn from_body(unit: TestUnit, body: TestBody) -> Self {
        Self { unit, body }
    }

    /// Invoke the body
    pub fn invoke(&self, context: &TestContext) -> EsperarResult<()> {
        (self.body)(context)
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase").field("unit", &self.unit).finish()
    }
}

/// Builder grouping the methods of one suite
#[derive(Debug)]
pub struct TestSuite {
    name: String,
    capabilities: Vec<String>,
    cases: Vec<TestCase>,
}

impl TestSuite {
    /// Create a new test suite
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: Vec::new(),
            cases: Vec::new(),
        }
    }

    /// Capability declared by every method added afterwards
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    fn unit(&self, method: impl Into<String>) -> TestUnit {
        let mut unit = TestUnit::new(self.name.clone(), method);
        unit.capabilities.clone_from(&self.capabilities);
        unit
    }

    /// Add a test method
    #[must_use]
    pub fn test(
        mut self,
        method: impl Into<String>,
        body: impl Fn(&TestContext) -> EsperarResult<()> + Send + Sync + 'static,
    ) -> Self {
        let unit = self.unit(method);
        self.cases.push(TestCase::new(unit, body));
        self
    }

    /// Add a quarantined test method
    #[must_use]
    pub fn quarantined_test(
        mut self,
        method: impl Into<String>,
        body: impl Fn(&TestContext) -> EsperarResult<()> + Send + Sync + 'static,
    ) -> Self {
        let unit = self.unit(method).quarantined();
        self.cases.push(TestCase::new(unit, body));
        self
    }

    /// Add a method with a shared body, e.g. one built by `SessionTest`
    #[must_use]
    pub fn test_body(mut self, method: impl Into<String>, body: TestBody) -> Self {
        let unit = self.unit(method);
        self.cases.push(TestCase::from_body(unit, body));
        self
    }

    /// Get the number of tests
    #[must_use]
    pub fn test_count(&self) -> usize {
        self.cases.len()
    }
}

// =============================================================================
// SELECTION
// =============================================================================

/// How quarantined tests are treated when selecting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuarantineMode {
    /// Skip quarantined tests
    #[default]
    Exclude,
    /// Run only quarantined tests
    Only,
    /// Run everything
    Include,
}

impl QuarantineMode {
    const fn admits(self, quarantined: bool) -> bool {
        match self {
            Self::Exclude => !quarantined,
            Self::Only => quarantined,
            Self::Include => true,
        }
    }
}

/// Which registered tests to run
#[derive(Debug, Clone, Default)]
pub struct TestFilter {
    suites: Vec<String>,
    pattern: Option<Regex>,
    quarantine: QuarantineMode,
}

impl TestFilter {
    /// Everything except quarantined tests
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to suites, by full or short name
    #[must_use]
    pub fn with_suites(mut self, suites: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.suites = suites.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict to qualified names matching `pattern`
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid regex.
    pub fn with_pattern(mut self, pattern: &str) -> EsperarResult<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| EsperarError::config(format!("invalid test filter {pattern:?}: {e}")))?;
        self.pattern = Some(regex);
        Ok(self)
    }

    /// Set quarantine handling
    #[must_use]
    pub const fn with_quarantine(mut self, mode: QuarantineMode) -> Self {
        self.quarantine = mode;
        self
    }

    /// Whether `unit` is selected
    #[must_use]
    pub fn matches(&self, unit: &TestUnit) -> bool {
        let suite_ok = self.suites.is_empty()
            || self
                .suites
                .iter()
                .any(|s| *s == unit.suite || s == unit.short_suite());
        let pattern_ok = self
            .pattern
            .as_ref()
            .map_or(true, |re| re.is_match(&unit.qualified_name()));
        suite_ok && pattern_ok && self.quarantine.admits(unit.quarantined)
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Discovered tests, in registration order
#[derive(Debug, Clone, Default)]
pub struct TestRegistry {
    cases: Vec<TestCase>,
}

impl TestRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one case
    pub fn register(&mut self, case: TestCase) {
        self.cases.push(case);
    }

    /// Register every method of `suite`
    #[must_use]
    pub fn with_suite(mut self, suite: TestSuite) -> Self {
        self.cases.extend(suite.cases);
        self
    }

    /// Number of registered tests
    #[must_use]
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// All descriptors
    pub fn units(&self) -> impl Iterator<Item = &TestUnit> {
        self.cases.iter().map(|c| &c.unit)
    }

    /// Look up by `Suite#method`
    #[must_use]
    pub fn find(&self, qualified_name: &str) -> Option<&TestCase> {
        self.cases
            .iter()
            .find(|c| c.unit.qualified_name() == qualified_name)
    }

    /// Cases selected by `filter`
    #[must_use]
    pub fn select(&self, filter: &TestFilter) -> Vec<TestCase> {
        self.cases
            .iter()
            .filter(|c| filter.matches(&c.unit))
            .cloned()
            .collect()
    }

    /// `Suite:method` labels of quarantined tests in `suites` (all when empty)
    #[must_use]
    pub fn quarantined(&self, suites: &[String]) -> Vec<String> {
        let filter = TestFilter::new()
            .with_suites(suites.iter().cloned())
            .with_quarantine(QuarantineMode::Only);
        self.units()
            .filter(|u| filter.matches(u))
            .map(TestUnit::quarantine_label)
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn ok(_: &TestContext) -> EsperarResult<()> {
        Ok(())
    }

    fn registry() -> TestRegistry {
        TestRegistry::new()
            .with_suite(
                TestSuite::new("shop::CartTest")
                    .test("adds_item", ok)
                    .test("removes_item", ok)
                    .quarantined_test("applies_coupon", ok),
            )
            .with_suite(
                TestSuite::new("auth::LoginTest")
                    .with_capability("chrome")
                    .test("logs_in", ok),
            )
    }

    mod unit_tests {
        use super::*;

        #[test]
        fn test_names() {
            let unit = TestUnit::new("shop::CartTest", "adds_item");
            assert_eq!(unit.qualified_name(), "shop::CartTest#adds_item");
            assert_eq!(unit.to_string(), "shop::CartTest#adds_item");
            assert_eq!(unit.short_suite(), "CartTest");
            assert_eq!(unit.quarantine_label(), "shop::CartTest:adds_item");
            assert_eq!(unit.job_name("0123456789"), "0123456789:CartTest:adds_item");
        }

        #[test]
        fn test_short_suite_dotted_and_plain() {
            assert_eq!(TestUnit::new("com.acme.Login", "m").short_suite(), "Login");
            assert_eq!(TestUnit::new("Login", "m").short_suite(), "Login");
        }
    }

    mod filter_tests {
        use super::*;

        #[test]
        fn test_default_excludes_quarantine() {
            let selected = registry().select(&TestFilter::new());
            assert_eq!(selected.len(), 3);
            assert!(selected.iter().all(|c| !c.unit.quarantined));
        }

        #[test]
        fn test_suite_by_short_name() {
            let selected = registry().select(&TestFilter::new().with_suites(["LoginTest"]));
            assert_eq!(selected.len(), 1);
            assert_eq!(selected[0].unit.capabilities, vec!["chrome"]);
        }

        #[test]
        fn test_pattern() {
            let filter = TestFilter::new().with_pattern("_item$").unwrap();
            assert_eq!(registry().select(&filter).len(), 2);
        }

        #[test]
        fn test_invalid_pattern() {
            let err = TestFilter::new().with_pattern("(").unwrap_err();
            assert!(matches!(err, EsperarError::Config { .. }));
        }

        #[test]
        fn test_quarantine_modes() {
            let reg = registry();
            let only = TestFilter::new().with_quarantine(QuarantineMode::Only);
            assert_eq!(reg.select(&only).len(), 1);
            let all = TestFilter::new().with_quarantine(QuarantineMode::Include);
            assert_eq!(reg.select(&all).len(), 4);
        }
    }

    mod registry_tests {
        use super::*;

        #[test]
        fn test_quarantined_labels() {
            let reg = registry();
            assert_eq!(reg.quarantined(&[]), vec!["shop::CartTest:applies_coupon"]);
            assert!(reg.quarantined(&["LoginTest".to_string()]).is_empty());
        }

        #[test]
        fn test_find_and_len() {
            let reg = registry();
            assert_eq!(reg.len(), 4);
            assert!(reg.find("auth::LoginTest#logs_in").is_some());
            assert!(reg.find("auth::LoginTest#missing").is_none());
        }
    }
}
