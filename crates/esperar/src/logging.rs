//! Structured logging for esperar
//!
//! Two layers of `tracing` output:
//!
//! - **Process logging**: [`init_logging`] installs the global subscriber once
//!   (pretty or JSON, stderr or file, `RUST_LOG` overrides the level).
//! - **Per-test capture**: [`capture_subscriber`] builds a subscriber that
//!   writes into one test's [`OutputSink`]. The runner installs it with
//!   `tracing::subscriber::with_default`, so it only sees events from the
//!   thread running that test.

use crate::result::{EsperarError, EsperarResult};
use crate::runner::OutputSink;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock, PoisonError};
use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

static LOGGING_INITIALIZED: OnceLock<()> = OnceLock::new();
static INSTALL_LOCK: Mutex<()> = Mutex::new(());

/// Output format of process logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-friendly lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level filter (trace, debug, info, warn, error); `RUST_LOG` wins
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Append to this file instead of stderr
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Install the global subscriber. Later calls, including concurrent ones, are no-ops.
///
/// # Errors
///
/// [`EsperarError::Logging`] for an unusable level, an unopenable log file,
/// or when another global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> EsperarResult<()> {
    if LOGGING_INITIALIZED.get().is_some() {
        return Ok(());
    }
    let _guard = INSTALL_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    if LOGGING_INITIALIZED.get().is_some() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| EsperarError::Logging {
            message: format!("invalid log level '{}': {e}", config.level),
        })?;

    let (writer, ansi) = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| EsperarError::Logging {
                    message: format!("cannot open log file {}: {e}", path.display()),
                })?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let installed = match config.format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(ansi),
            ),
        ),
        LogFormat::Json => tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(writer).with_target(true)),
        ),
    };
    installed.map_err(|e| EsperarError::Logging {
        message: format!("cannot install subscriber: {e}"),
    })?;

    let _ = LOGGING_INITIALIZED.set(());
    Ok(())
}

/// Whether [`init_logging`] has succeeded in this process
#[must_use]
pub fn is_initialized() -> bool {
    LOGGING_INITIALIZED.get().is_some()
}

/// Subscriber writing plain, untimed lines into `sink`
pub fn capture_subscriber(sink: OutputSink) -> impl tracing::Subscriber + Send + Sync + 'static {
    fmt()
        .with_writer(sink)
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .with_max_level(Level::DEBUG)
        .finish()
}
