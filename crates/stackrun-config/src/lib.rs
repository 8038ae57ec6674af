//! Configuration for stackrun runs.
//!
//! Precedence is CLI flags > config file > built-in defaults. The config file
//! is `.stackrun/config.toml`, discovered by searching upward from the
//! working directory.

mod discovery;
pub mod error;
pub mod model;

pub use error::ConfigError;
pub use model::{CliArgs, Config, ConfigSource, PluginSpec};
