//! Esperador: command-line interface for Esperar suites
//!
//! ## Usage
//!
//! ```bash
//! esperador run                          # Run all non-quarantined tests
//! esperador run --filter "^checkout" -j 4
//! esperador quarantine --suites CartTest # List quarantined tests
//! esperador config --conf ci.yaml        # Show the effective configuration
//! esperador init                         # Write esperar.yaml
//! ```
//!
//! The stock binary has no registered tests; embed a registry with
//! `esperador::run_with_registry` in your own test binary.

use esperar::TestRegistry;
use std::process::ExitCode;

fn main() -> ExitCode {
    esperador::run_with_registry(&TestRegistry::new())
}
