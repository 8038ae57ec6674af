//! CLI argument definitions

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

/// stackrun - phase-driven installation runs assembled from plugins
#[derive(Parser, Debug)]
#[command(name = "stackrun")]
#[command(about = "Run a phased installation assembled from independently versioned plugins")]
#[command(long_about = r#"
stackrun drives a long installation through a fixed sequence of phases. Each
plugin contributes hooks for the phases it cares about; hooks run one at a
time, in the order the plugins are listed, and share an ordered key/value
context.

EXAMPLES:
  # Perform a run with the discovered configuration
  stackrun run

  # Override context values for this run
  stackrun run --set DATABASE_TYPE=postgresql --set SERVICE_HOST=10.0.0.5

  # Show every step's output on the terminal
  stackrun --verbose run

  # List plugins in registration order with the phases they implement
  stackrun plugins

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults
  Config file is discovered by searching upward from CWD for .stackrun/config.toml
  Use --config to specify an explicit config file path

PHASES:
  override-defaults → source → pre-install → install → post-config → extra → test-config
  A failing hook stops the run; the process exits with the hook's status

LOGS:
  Each run writes P.<timestamp> (detail) and P.summary.<timestamp> (summary);
  P and P.summary always point at the newest run
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Echo every captured line to the terminal
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Never draw the progress indicator
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Base path of the detail log
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Delete dated logs older than this many days at startup
    #[arg(long, global = true, value_name = "DAYS")]
    pub log_retention_days: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Perform the installation run
    Run {
        /// Context override applied after the config file's [context] table
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Print the fixed phase sequence
    Phases,

    /// List registered plugins with their source and implemented phases
    Plugins,

    /// Print the effective configuration and where each value came from
    Config,
}

/// The clap command tree, for completions and argument tests.
#[must_use]
pub fn build_cli() -> clap::Command {
    Cli::command()
}
