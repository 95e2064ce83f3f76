//! Esperador CLI Library
//!
//! Command-line interface for the Esperar harness. A test binary can embed
//! its own registry with [`run_with_registry`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod handlers;
mod output;
mod runner;

pub use commands::{
    Cli, ColorArg, Commands, ConfigArgs, InitArgs, QuarantineArg, QuarantineArgs, RunArgs,
};
pub use config::{effective_jobs, CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{describe_entry, ProgressReporter};
pub use runner::{apply_overrides, build_filter, junit_destination, load_harness_config, SuiteRunner};

use clap::Parser;
use esperar::TestRegistry;
use std::process::ExitCode;

/// Parse the process arguments and run against `registry`
#[must_use]
pub fn run_with_registry(registry: &TestRegistry) -> ExitCode {
    match run_cli(Cli::parse(), registry) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Build the CLI configuration from parsed flags
#[must_use]
pub fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else {
        match cli.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    };

    let color: ColorChoice = cli.color.clone().into();

    CliConfig::new()
        .with_verbosity(verbosity)
        .with_color(color)
        .with_harness_config(cli.conf.clone())
}

/// Dispatch a parsed command line
///
/// Failing tests surface as [`CliError::TestExecution`].
pub fn run_cli(cli: Cli, registry: &TestRegistry) -> CliResult<()> {
    let config = build_config(&cli);

    match cli.command {
        Commands::Run(args) => {
            let outcome = SuiteRunner::new(config, registry).run(&args)?;
            if outcome.all_passed() {
                Ok(())
            } else {
                Err(CliError::test_execution(format!(
                    "{} of {} tests failed",
                    outcome.failed_count(),
                    outcome.total()
                )))
            }
        }
        Commands::Quarantine(args) => {
            handlers::execute_quarantine(registry, &args);
            Ok(())
        }
        Commands::Config(args) => handlers::execute_config(&config, &args),
        Commands::Init(args) => handlers::execute_init(&args).map(|_| ()),
    }
}
