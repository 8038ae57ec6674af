//! Run orchestration for stackrun.
//!
//! [`Installer`] wires the pieces together: the plugin catalog is populated
//! and materialized, the [`OutputRouter`] opens the run's logs, and the
//! [`PhaseScheduler`] walks the fixed phase sequence. Every way a run can
//! end, including an interrupt, goes through the [`FaultController`].

pub mod fault;
pub mod install;
pub mod output;
pub mod scheduler;
mod signals;

pub use fault::{Fault, FaultController, RunRecord};
pub use install::Installer;
pub use output::{LogPaths, OutputRouter, RouterError, RouterOptions};
pub use scheduler::{Announce, InFlight, PhaseFailure, PhaseReport, PhaseScheduler, RunningHook};
