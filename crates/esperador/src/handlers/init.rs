//! Init command handler

use crate::error::{CliError, CliResult};
use crate::InitArgs;
use esperar::HarnessConfig;
use std::path::PathBuf;

/// File written by `init`
pub const CONFIG_FILE_NAME: &str = "esperar.yaml";

/// Default configuration as YAML, without a fixed run id
///
/// `unique_id` is left out so every run loading the file gets a fresh one.
pub fn default_config_yaml() -> CliResult<String> {
    let mut document = serde_yaml_ng::to_value(HarnessConfig::default())?;
    if let Some(mapping) = document.as_mapping_mut() {
        mapping.remove("unique_id");
    }
    Ok(serde_yaml_ng::to_string(&document)?)
}

/// Execute the init command, returning the written path
pub fn execute_init(args: &InitArgs) -> CliResult<PathBuf> {
    std::fs::create_dir_all(&args.path)?;

    let target = args.path.join(CONFIG_FILE_NAME);
    if target.exists() && !args.force {
        return Err(CliError::config(format!(
            "{} already exists (use --force to overwrite)",
            target.display()
        )));
    }

    std::fs::write(&target, default_config_yaml()?)?;
    println!("Created: {}", target.display());
    Ok(target)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(path: PathBuf, force: bool) -> InitArgs {
        InitArgs { path, force }
    }

    #[test]
    fn test_default_yaml_round_trips_without_unique_id() {
        let yaml = default_config_yaml().unwrap();
        assert!(!yaml.contains("unique_id"));
        assert!(yaml.contains("local_address"));

        let config = HarnessConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(config.local_address, HarnessConfig::default().local_address);
        assert_eq!(config.unique_id.len(), 10);
    }

    #[test]
    fn test_init_creates_directory_and_file() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("new_project");
        let written = execute_init(&args(dir.clone(), false)).unwrap();
        assert_eq!(written, dir.join(CONFIG_FILE_NAME));
        assert!(written.exists());
    }

    #[test]
    fn test_init_refuses_overwrite() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE_NAME), "teamcity: true\n").unwrap();
        let err = execute_init(&args(temp.path().to_path_buf(), false)).unwrap_err();
        assert!(err.to_string().contains("--force"));

        let kept = std::fs::read_to_string(temp.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(kept, "teamcity: true\n");
    }

    #[test]
    fn test_init_force_overwrites() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE_NAME), "teamcity: true\n").unwrap();
        execute_init(&args(temp.path().to_path_buf(), true)).unwrap();
        let written = std::fs::read_to_string(temp.path().join(CONFIG_FILE_NAME)).unwrap();
        assert!(written.contains("local_address"));
    }
}
