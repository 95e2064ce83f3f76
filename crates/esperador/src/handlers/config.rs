//! Config command handler

use crate::config::CliConfig;
use crate::error::CliResult;
use crate::runner::load_harness_config;
use crate::ConfigArgs;

/// Execute the config command
pub fn execute_config(config: &CliConfig, args: &ConfigArgs) -> CliResult<()> {
    let harness = load_harness_config(config.harness_config.as_deref())?;
    harness.validate()?;

    if args.validate {
        println!("Configuration is valid");
    } else {
        print!("{}", harness.to_yaml()?);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        execute_config(&CliConfig::new(), &ConfigArgs { validate: true }).unwrap();
    }

    #[test]
    fn test_invalid_file_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("esperar.yaml");
        std::fs::write(&path, "sauce:\n  enabled: true\n").unwrap();
        let config = CliConfig::new().with_harness_config(Some(path));
        assert!(execute_config(&config, &ConfigArgs { validate: true }).is_err());
    }

    #[test]
    fn test_prints_loaded_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("esperar.yaml");
        std::fs::write(&path, "max_retries: 0\n").unwrap();
        let config = CliConfig::new().with_harness_config(Some(path));
        execute_config(&config, &ConfigArgs::default()).unwrap();
    }
}
