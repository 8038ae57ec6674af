//! Ownership and termination of helper jobs.
//!
//! The supervisor is the only component that may stop a job. Other
//! components hold a [`JobId`] and ask the supervisor to terminate it.
//! `terminate_all` runs on every exit path of a run; dropping the last
//! supervisor handle kills whatever is still registered.

use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::job::{Job, JobHandle, JobId, JobRole, JobSummary};
use crate::platform::{GroupSignal, signal_group};

/// How long a job gets between the polite request and the hard stop.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Outcome of a termination sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminationReport {
    /// Jobs that were still registered when the sweep started
    pub terminated: usize,
    /// Jobs that ignored the polite request and had to be aborted or killed
    pub forced: usize,
}

/// Cloneable handle to the run's job registry.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    inner: Arc<SupervisorInner>,
}

#[derive(Debug)]
struct SupervisorInner {
    jobs: Mutex<Vec<Job>>,
    next_id: AtomicU64,
    grace: Duration,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor {
    #[must_use]
    pub fn new() -> Self {
        Self::with_grace_period(DEFAULT_GRACE_PERIOD)
    }

    #[must_use]
    pub fn with_grace_period(grace: Duration) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                jobs: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                grace,
            }),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, Vec<Job>> {
        self.inner
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a spawned helper and return its id.
    pub fn register(&self, role: JobRole, label: impl Into<String>, handle: JobHandle) -> JobId {
        let id = JobId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let label = label.into();
        tracing::debug!(%id, %role, %label, "registered job");
        self.jobs().push(Job {
            id,
            role,
            label,
            created_at: Utc::now(),
            handle,
        });
        id
    }

    /// Spawn a cancellable task and register it.
    ///
    /// The closure receives the token the supervisor cancels when it wants
    /// the task to stop; the task should finish promptly once it fires.
    pub fn spawn_task<F, Fut>(&self, role: JobRole, label: impl Into<String>, task: F) -> JobId
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let join = tokio::spawn(task(cancel.clone()));
        self.register(role, label, JobHandle::Task { cancel, join })
    }

    /// Forget a job that has already exited on its own.
    pub fn release(&self, id: JobId) -> bool {
        let mut jobs = self.jobs();
        match jobs.iter().position(|job| job.id == id) {
            Some(index) => {
                jobs.remove(index);
                true
            }
            None => false,
        }
    }

    /// Snapshot of the registry.
    #[must_use]
    pub fn active(&self) -> Vec<JobSummary> {
        self.jobs().iter().map(Job::summary).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs().is_empty()
    }

    /// Terminate a single job. Returns false if it was not registered.
    pub async fn terminate(&self, id: JobId) -> bool {
        let job = {
            let mut jobs = self.jobs();
            jobs.iter()
                .position(|job| job.id == id)
                .map(|index| jobs.remove(index))
        };
        match job {
            Some(job) => {
                stop_job(job, self.inner.grace).await;
                true
            }
            None => false,
        }
    }

    /// Terminate every registered job.
    ///
    /// Safe to call any number of times: the registry is drained up front,
    /// so a second call finds nothing to do. Jobs that already exited are
    /// dropped without waiting.
    pub async fn terminate_all(&self) -> TerminationReport {
        let jobs = std::mem::take(&mut *self.jobs());
        let mut report = TerminationReport {
            terminated: jobs.len(),
            forced: 0,
        };

        // Commands first: copiers must stay up to record their last lines.
        let (commands, helpers): (Vec<Job>, Vec<Job>) = jobs
            .into_iter()
            .partition(|job| job.role == JobRole::Command);

        for job in commands.into_iter().chain(helpers.into_iter().rev()) {
            if stop_job(job, self.inner.grace).await {
                report.forced += 1;
            }
        }

        if report.terminated > 0 {
            tracing::debug!(
                terminated = report.terminated,
                forced = report.forced,
                "supervised jobs terminated"
            );
        }
        report
    }
}

/// Stop one job; true if it had to be forced.
async fn stop_job(job: Job, grace: Duration) -> bool {
    let Job {
        id, role, handle, ..
    } = job;

    match handle {
        JobHandle::Task { cancel, mut join } => {
            cancel.cancel();
            if join.is_finished() {
                return false;
            }
            match tokio::time::timeout(grace, &mut join).await {
                Ok(_) => false,
                Err(_) => {
                    tracing::warn!(%id, %role, "job ignored cancellation; aborting");
                    join.abort();
                    true
                }
            }
        }
        JobHandle::Process { pid, finished } => {
            if finished.is_cancelled() {
                return false;
            }
            signal_group(pid, GroupSignal::Terminate);
            match tokio::time::timeout(grace, finished.cancelled()).await {
                Ok(()) => false,
                Err(_) => {
                    tracing::warn!(%id, %role, pid, "process group ignored SIGTERM; killing");
                    signal_group(pid, GroupSignal::Kill);
                    true
                }
            }
        }
    }
}

impl Drop for SupervisorInner {
    fn drop(&mut self) {
        let jobs = self
            .jobs
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for job in jobs.drain(..) {
            match job.handle {
                JobHandle::Task { cancel, join } => {
                    cancel.cancel();
                    join.abort();
                }
                JobHandle::Process { pid, finished } => {
                    if !finished.is_cancelled() {
                        signal_group(pid, GroupSignal::Kill);
                    }
                }
            }
        }
    }
}
