//! Process plumbing for stackrun.
//!
//! Every helper a run spawns (stream-copiers, the progress indicator, hook
//! commands) is registered with the [`ProcessSupervisor`], which is the only
//! component allowed to terminate it.
//!
//! # Security Model
//!
//! All process execution goes through [`CommandSpec`] to ensure argv-style invocation.
//! Arguments are passed as discrete elements rather than shell strings.

pub mod command_spec;
pub mod error;
pub mod exec;
pub mod job;
mod platform;
pub mod sink;
pub mod supervisor;

pub use command_spec::CommandSpec;
pub use error::RunnerError;
pub use exec::run_streaming;
pub use job::{Job, JobHandle, JobId, JobRole, JobSummary};
pub use sink::LineSink;
pub use supervisor::{DEFAULT_GRACE_PERIOD, ProcessSupervisor, TerminationReport};
