//! Command handlers - extracted from lib.rs for testability

pub mod config;
pub mod init;
pub mod quarantine;

pub use config::execute_config;
pub use init::{default_config_yaml, execute_init, CONFIG_FILE_NAME};
pub use quarantine::execute_quarantine;
