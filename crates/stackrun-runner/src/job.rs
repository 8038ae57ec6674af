use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Identifier handed out by the supervisor at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(pub(crate) u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// What a supervised helper is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobRole {
    /// Terminal spinner driven by announce calls
    ProgressIndicator,
    /// Single writer that drains one channel into one log file
    StreamCopier,
    /// Hook or collector subprocess, registered only while it runs
    Command,
}

impl JobRole {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ProgressIndicator => "progress-indicator",
            Self::StreamCopier => "stream-copier",
            Self::Command => "command",
        }
    }
}

impl fmt::Display for JobRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the supervisor reaches a job when it has to stop it.
#[derive(Debug)]
pub enum JobHandle {
    /// In-process task. Cancelling the token asks it to wind down; the join
    /// handle is aborted if it does not finish within the grace period.
    Task {
        cancel: CancellationToken,
        join: JoinHandle<()>,
    },
    /// Subprocess leading its own process group. `finished` is cancelled by
    /// the owner once the process has been reaped.
    Process {
        pid: u32,
        finished: CancellationToken,
    },
}

impl JobHandle {
    /// True once the job has exited on its own.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        match self {
            Self::Task { join, .. } => join.is_finished(),
            Self::Process { finished, .. } => finished.is_cancelled(),
        }
    }
}

/// A supervised helper.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub role: JobRole,
    /// Human-readable tag, e.g. the log file a copier writes
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub(crate) handle: JobHandle,
}

impl Job {
    #[must_use]
    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            role: self.role,
            label: self.label.clone(),
            created_at: self.created_at,
            finished: self.handle.is_finished(),
        }
    }
}

/// Read-only view of a registered job.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub id: JobId,
    pub role: JobRole,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub finished: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_names() {
        assert_eq!(JobRole::ProgressIndicator.as_str(), "progress-indicator");
        assert_eq!(JobRole::StreamCopier.to_string(), "stream-copier");
        assert_eq!(JobRole::Command.as_str(), "command");
    }

    #[test]
    fn test_process_handle_tracks_finished_token() {
        let finished = CancellationToken::new();
        let handle = JobHandle::Process {
            pid: 42,
            finished: finished.clone(),
        };
        assert!(!handle.is_finished());
        finished.cancel();
        assert!(handle.is_finished());
    }
}
