//! Result and error types for Esperar.

use std::time::Duration;
use thiserror::Error;

use crate::conditions::ConditionKind;

/// Result type for Esperar operations
pub type EsperarResult<T> = Result<T, EsperarError>;

/// Errors that can occur in Esperar
#[derive(Debug, Error)]
pub enum EsperarError {
    /// A wait predicate never converged within its budget
    #[error("Element {locator} {kind} after {timeout_secs} seconds")]
    Timeout {
        /// Predicate that was waited on
        kind: ConditionKind,
        /// Locator the predicate was evaluated against
        locator: String,
        /// Budget in seconds
        timeout_secs: u64,
        /// Time actually spent polling
        elapsed: Duration,
        /// Number of evaluations performed
        attempts: usize,
        /// Last reason the predicate reported for not being ready
        last_observed: Option<String>,
    },

    /// The remote session is unusable
    #[error("Session error: {message}")]
    Session {
        /// Error message
        message: String,
    },

    /// The locator cannot be evaluated by the session
    #[error("Invalid locator {locator}: {message}")]
    InvalidLocator {
        /// Offending locator
        locator: String,
        /// Error message
        message: String,
    },

    /// A lazily bound session was used outside of a running test
    #[error("Session has not been started; it is only available inside a running test")]
    SessionNotStarted,

    /// Resource setup or teardown failed around a test execution
    #[error("Test infrastructure failure: {message}")]
    Infrastructure {
        /// Error message
        message: String,
    },

    /// An integration or report listener call failed
    #[error("Integration {integration} failed: {message}")]
    IntegrationDelivery {
        /// Integration name
        integration: String,
        /// Error message
        message: String,
    },

    /// Assertion failed inside a test body
    #[error("Assertion failed: {message}")]
    AssertionFailed {
        /// Error message
        message: String,
    },

    /// Configuration is missing or inconsistent
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Logging could not be installed
    #[error("Logging error: {message}")]
    Logging {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl EsperarError {
    /// Create a session error
    #[must_use]
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Create an infrastructure error
    #[must_use]
    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::Infrastructure {
            message: message.into(),
        }
    }

    /// Create an integration delivery error
    #[must_use]
    pub fn delivery(integration: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IntegrationDelivery {
            integration: integration.into(),
            message: message.into(),
        }
    }

    /// Create an assertion failure
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailed {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// True for a wait that ran out of budget
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// True for errors that abort a poll loop without retry
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Session { .. } | Self::InvalidLocator { .. } | Self::SessionNotStarted
        )
    }
}

/// Fail the current test body with an assertion error unless `condition` holds.
///
/// # Errors
///
/// Returns [`EsperarError::AssertionFailed`] carrying `message`.
pub fn ensure(condition: bool, message: impl Into<String>) -> EsperarResult<()> {
    if condition {
        Ok(())
    } else {
        Err(EsperarError::assertion(message))
    }
}
