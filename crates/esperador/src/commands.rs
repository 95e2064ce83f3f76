//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use esperar::QuarantineMode;
use std::path::PathBuf;

/// Esperador: run, filter and quarantine Esperar UI-automation suites
#[derive(Parser, Debug)]
#[command(name = "esperador")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Harness configuration file
    #[arg(long, global = true, env = "ESPERAR_CONF")]
    pub conf: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run registered tests
    Run(RunArgs),

    /// List quarantined tests as Suite:method
    Quarantine(QuarantineArgs),

    /// Show or validate the effective configuration
    Config(ConfigArgs),

    /// Write a default esperar.yaml
    Init(InitArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Only these suites (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub suites: Vec<String>,

    /// Regex matched against method and Suite#method
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Parallel workers (0 = one per CPU)
    #[arg(short = 'j', long, default_value = "1")]
    pub parallel: usize,

    /// Re-runs for a failing test (overrides max_retries)
    #[arg(long)]
    pub retries: Option<u32>,

    /// How quarantined tests are treated
    #[arg(long, value_enum, default_value = "exclude")]
    pub quarantine: QuarantineArg,

    /// Write a JUnit XML report here
    #[arg(long)]
    pub junit: Option<PathBuf>,

    /// Run against Sauce Labs (overrides sauce.enabled)
    #[arg(long)]
    pub sauce: bool,
}

/// Arguments for the quarantine command
#[derive(Parser, Debug, Default)]
pub struct QuarantineArgs {
    /// Only these suites (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub suites: Vec<String>,
}

/// Arguments for the config command
#[derive(Parser, Debug, Default)]
pub struct ConfigArgs {
    /// Validate without printing the configuration
    #[arg(long)]
    pub validate: bool,
}

/// Arguments for the init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Directory to write esperar.yaml into
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite an existing esperar.yaml
    #[arg(short, long)]
    pub force: bool,
}

/// Quarantine handling on the command line
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QuarantineArg {
    /// Skip quarantined tests
    #[default]
    Exclude,
    /// Run only quarantined tests
    Only,
    /// Run everything
    Include,
}

impl From<QuarantineArg> for QuarantineMode {
    fn from(arg: QuarantineArg) -> Self {
        match arg {
            QuarantineArg::Exclude => Self::Exclude,
            QuarantineArg::Only => Self::Only,
            QuarantineArg::Include => Self::Include,
        }
    }
}

/// Color output argument
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    mod cli_parsing_tests {
        use super::*;

        #[test]
        fn test_verify_cli() {
            use clap::CommandFactory;
            Cli::command().debug_assert();
        }

        #[test]
        fn test_run_defaults() {
            let cli = Cli::try_parse_from(["esperador", "run"]).unwrap();
            let Commands::Run(args) = cli.command else {
                panic!("expected run");
            };
            assert!(args.suites.is_empty());
            assert_eq!(args.parallel, 1);
            assert_eq!(args.quarantine, QuarantineArg::Exclude);
            assert!(args.retries.is_none());
            assert!(!args.sauce);
        }

        #[test]
        fn test_run_all_flags() {
            let cli = Cli::try_parse_from([
                "esperador",
                "-vv",
                "--conf",
                "ci.yaml",
                "run",
                "--suites",
                "Login,Cart",
                "--filter",
                "^checkout",
                "-j",
                "4",
                "--retries",
                "0",
                "--quarantine",
                "only",
                "--junit",
                "out/junit.xml",
                "--sauce",
            ])
            .unwrap();
            assert_eq!(cli.verbose, 2);
            assert_eq!(cli.conf, Some(PathBuf::from("ci.yaml")));
            let Commands::Run(args) = cli.command else {
                panic!("expected run");
            };
            assert_eq!(args.suites, vec!["Login", "Cart"]);
            assert_eq!(args.filter.as_deref(), Some("^checkout"));
            assert_eq!(args.parallel, 4);
            assert_eq!(args.retries, Some(0));
            assert_eq!(QuarantineMode::from(args.quarantine), QuarantineMode::Only);
            assert!(args.sauce);
        }

        #[test]
        fn test_quarantine_suites() {
            let cli = Cli::try_parse_from(["esperador", "quarantine", "--suites", "A,B"]).unwrap();
            let Commands::Quarantine(args) = cli.command else {
                panic!("expected quarantine");
            };
            assert_eq!(args.suites, vec!["A", "B"]);
        }

        #[test]
        fn test_init_force() {
            let cli = Cli::try_parse_from(["esperador", "init", "proj", "--force"]).unwrap();
            let Commands::Init(args) = cli.command else {
                panic!("expected init");
            };
            assert_eq!(args.path, PathBuf::from("proj"));
            assert!(args.force);
        }

        #[test]
        fn test_unknown_quarantine_mode_rejected() {
            assert!(Cli::try_parse_from(["esperador", "run", "--quarantine", "sometimes"]).is_err());
        }
    }
}
