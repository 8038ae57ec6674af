use std::path::PathBuf;
use thiserror::Error;

use stackrun_runner::RunnerError;

/// A plugin source could not be materialized. Always fatal, never retried.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Fetching plugin '{plugin}' from {repo} at '{git_ref}' failed with status {status}")]
    Failed {
        plugin: String,
        repo: String,
        git_ref: String,
        status: i32,
    },

    #[error("Could not run git for plugin '{plugin}': {source}")]
    Git {
        plugin: String,
        #[source]
        source: RunnerError,
    },

    #[error("Could not prepare checkout directory for plugin '{plugin}': {reason}")]
    Io { plugin: String, reason: String },

    #[error("Local plugin '{plugin}' is missing its directory {}", path.display())]
    MissingLocalPath { plugin: String, path: PathBuf },

    #[error("Plugin '{0}' is not registered")]
    UnknownPlugin(String),
}

impl FetchError {
    /// Name of the plugin whose source failed.
    #[must_use]
    pub fn plugin(&self) -> &str {
        match self {
            Self::Failed { plugin, .. }
            | Self::Git { plugin, .. }
            | Self::Io { plugin, .. }
            | Self::MissingLocalPath { plugin, .. } => plugin,
            Self::UnknownPlugin(name) => name,
        }
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Plugin '{0}' is not registered")]
    UnknownPlugin(String),

    #[error("Failed to discover hooks of plugin '{plugin}': {reason}")]
    Discovery { plugin: String, reason: String },
}
