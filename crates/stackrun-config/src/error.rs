use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("Invalid configuration file {}: {reason}", path.display())]
    InvalidFile { path: PathBuf, reason: String },

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid plugin entry '{name}': {reason}")]
    InvalidPlugin { name: String, reason: String },

    #[error("Invalid --set argument '{0}': expected KEY=VALUE")]
    InvalidAssignment(String),

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },
}
