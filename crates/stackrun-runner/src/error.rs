//! Error types for runner module

use thiserror::Error;

/// Errors raised while spawning or waiting on a command.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Program not found: {program}")]
    ProgramNotFound { program: String },

    #[error("Failed to spawn '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Failed to wait for '{program}': {reason}")]
    WaitFailed { program: String, reason: String },
}
