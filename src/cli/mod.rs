//! Command-line interface for stackrun
//!
//! - `args`: clap definitions
//! - `run`: entry point and command dispatch
//! - `commands`: command implementations

pub mod args;
mod commands;
mod run;


pub use args::{Cli, Commands, build_cli};
pub use run::run;
