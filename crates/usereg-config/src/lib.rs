// usereg-config: configuration loading and credential resolution

pub mod config;
pub mod error;

pub use config::{Config, PortalSettings, config_path, load_config, load_config_from};
pub use error::ConfigError;
