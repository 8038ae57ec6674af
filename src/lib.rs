//! stackrun - phase-driven installation runs assembled from plugins
//!
//! A run walks a fixed sequence of phases. In every phase, each enabled
//! plugin's hook for that phase runs, one at a time, in the order the
//! plugins were registered. Output is captured into a detail log and a
//! summary log; any failure or interrupt ends the run through a single
//! fault path that cleans up every helper job before the process exits.
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! # Show the phase sequence
//! stackrun phases
//!
//! # List plugins and the phases they implement
//! stackrun plugins
//!
//! # Perform a run, overriding one context value
//! stackrun run --set DATABASE_TYPE=postgresql
//! ```
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use stackrun::{CliArgs, Config, Installer, LineSink};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::discover(&CliArgs::default())?;
//! let (detail, detail_rx) = LineSink::channel();
//! let code = Installer::new(config).run(detail, detail_rx).await;
//! std::process::exit(code.as_i32());
//! # }
//! ```
//!
//! # Crate layout
//!
//! | Crate | Contents |
//! |-------|----------|
//! | `stackrun-utils` | `Phase`, `ExitCode`, tracing setup |
//! | `stackrun-runner` | `ProcessSupervisor`, `LineSink`, streamed command execution |
//! | `stackrun-phase-api` | `Hook`, `HookSet`, `InstallContext`, `PluginUnit` |
//! | `stackrun-config` | `Config` discovery and validation |
//! | `stackrun-plugins` | `PluginCatalog`, git fetching, script hooks |
//! | `stackrun-engine` | `PhaseScheduler`, `OutputRouter`, `FaultController`, `Installer` |

pub mod cli;

pub use stackrun_config::{CliArgs, Config, ConfigError, ConfigSource, PluginSpec};
pub use stackrun_engine::{
    Fault, FaultController, Installer, OutputRouter, PhaseFailure, PhaseScheduler, RouterOptions,
};
pub use stackrun_phase_api::{
    FnHook, Hook, HookCall, HookFailure, HookIo, HookSet, InstallContext, PluginUnit,
};
pub use stackrun_plugins::{GitFetcher, PluginCatalog, ScriptPlugin, SourceFetcher};
pub use stackrun_runner::{CommandSpec, LineSink, ProcessSupervisor};
pub use stackrun_utils::{ExitCode, Phase};
