//! Fan-out of run output into the detail log, the summary log, and the
//! terminal.
//!
//! Each log file has exactly one stream-copier job draining a channel into
//! it; everything else writes through [`LineSink`] clones. Copiers and the
//! progress indicator are supervised jobs, so the router never stops them
//! itself: it asks the [`ProcessSupervisor`].

mod copier;
mod paths;
mod progress;

pub use copier::LINE_PREFIX_FORMAT;
pub use paths::{LogPaths, TIMESTAMP_FORMAT, purge_stale, retention};

use paths::repoint;

use chrono::{DateTime, Local};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::mpsc;

use stackrun_config::Config;
use stackrun_runner::{JobId, JobRole, LineSink, ProcessSupervisor};

use crate::scheduler::Announce;

/// The run's logs could not be set up. Fatal before any phase runs.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Cannot create log directory {}: {reason}", path.display())]
    CreateDir { path: PathBuf, reason: String },

    #[error("Cannot create log file {}: {reason}", path.display())]
    CreateFile { path: PathBuf, reason: String },

    #[error("Cannot purge old logs next to {}: {reason}", path.display())]
    Purge { path: PathBuf, reason: String },

    #[error("Cannot point {} at the current log: {reason}", path.display())]
    Link { path: PathBuf, reason: String },
}

/// How the router should present the run.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Base path `P` of the detail log
    pub base: PathBuf,
    pub retention_days: u32,
    /// Echo the detail stream to stdout
    pub verbose: bool,
    /// Allow the spinner; it is still only used on a terminal
    pub progress: bool,
    pub started: DateTime<Local>,
}

impl RouterOptions {
    #[must_use]
    pub fn new(base: impl Into<PathBuf>, retention_days: u32) -> Self {
        Self {
            base: base.into(),
            retention_days,
            verbose: false,
            progress: false,
            started: Local::now(),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            verbose: config.verbose,
            progress: config.progress,
            ..Self::new(&config.log_file, config.log_retention_days)
        }
    }

    #[must_use]
    pub fn started_at(mut self, started: DateTime<Local>) -> Self {
        self.started = started;
        self
    }
}

#[derive(Debug)]
enum Presentation {
    /// Announcements drive the spinner job
    Progress {
        job: JobId,
        messages: mpsc::UnboundedSender<String>,
    },
    /// The detail copier echoes everything, announcements included
    Trace,
    Plain,
}

/// Handle to the run's output streams.
#[derive(Debug, Clone)]
pub struct OutputRouter {
    inner: Arc<RouterInner>,
}

#[derive(Debug)]
struct RouterInner {
    paths: LogPaths,
    detail: LineSink,
    summary: LineSink,
    supervisor: ProcessSupervisor,
    trace: Arc<AtomicBool>,
    presentation: Mutex<Presentation>,
}

impl OutputRouter {
    /// Create this run's log files and start their copiers.
    ///
    /// `detail` and `detail_rx` are the two ends of the detail stream. They
    /// are created before the router so that anything written earlier
    /// (tracing events, fetch output) lands at the top of the detail log.
    pub async fn open(
        options: RouterOptions,
        detail: LineSink,
        detail_rx: mpsc::UnboundedReceiver<String>,
        supervisor: ProcessSupervisor,
    ) -> Result<Self, RouterError> {
        let paths = LogPaths::new(&options.base, options.started);
        let dir = paths.dir().to_path_buf();

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| RouterError::CreateDir {
                path: dir.clone(),
                reason: e.to_string(),
            })?;

        let purged = purge_stale(
            &paths.base,
            retention(options.retention_days),
            SystemTime::now(),
        )
        .map_err(|e| RouterError::Purge {
            path: paths.base.clone(),
            reason: e.to_string(),
        })?;

        let detail_file = create(&paths.detail).await?;
        let summary_file = create(&paths.summary).await?;
        for (link, target) in [
            (&paths.base, &paths.detail),
            (&paths.summary_link, &paths.summary),
        ] {
            repoint(link, target).map_err(|e| RouterError::Link {
                path: link.clone(),
                reason: e.to_string(),
            })?;
        }

        let trace = Arc::new(AtomicBool::new(options.verbose));
        let echo = Arc::clone(&trace);
        supervisor.spawn_task(JobRole::StreamCopier, "detail log copier", |cancel| {
            copier::copy_lines(detail_rx, detail_file, cancel, Some(echo))
        });

        let (summary, summary_rx) = LineSink::channel();
        supervisor.spawn_task(JobRole::StreamCopier, "summary log copier", |cancel| {
            copier::copy_lines(summary_rx, summary_file, cancel, None)
        });

        let presentation = if options.verbose {
            Presentation::Trace
        } else if options.progress && std::io::stdout().is_terminal() {
            let (messages, rx) = mpsc::unbounded_channel();
            let job = supervisor.spawn_task(JobRole::ProgressIndicator, "progress indicator", |cancel| {
                progress::spin(rx, cancel)
            });
            Presentation::Progress { job, messages }
        } else {
            Presentation::Plain
        };

        tracing::debug!(
            detail = %paths.detail.display(),
            summary = %paths.summary.display(),
            purged = purged.len(),
            "log streams established"
        );
        for path in &purged {
            tracing::debug!(path = %path.display(), "purged stale log");
        }

        Ok(Self {
            inner: Arc::new(RouterInner {
                paths,
                detail,
                summary,
                supervisor,
                trace,
                presentation: Mutex::new(presentation),
            }),
        })
    }

    /// Writer end of the detail stream.
    #[must_use]
    pub fn detail_sink(&self) -> &LineSink {
        &self.inner.detail
    }

    /// Stable path of the detail log (`P`).
    #[must_use]
    pub fn log_location(&self) -> &Path {
        &self.inner.paths.base
    }

    #[must_use]
    pub fn paths(&self) -> &LogPaths {
        &self.inner.paths
    }

    /// Record a progress line in both logs and show it on the terminal.
    pub fn announce(&self, message: &str) {
        self.inner.summary.line(message);
        self.inner.detail.line(message);

        let presentation = self
            .inner
            .presentation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match &*presentation {
            Presentation::Progress { messages, .. } => {
                let _ = messages.send(message.to_string());
            }
            Presentation::Trace => {}
            Presentation::Plain => println!("{message}"),
        }
    }

    /// Stop echoing the detail stream.
    pub fn disable_trace(&self) {
        self.inner.trace.store(false, Ordering::Relaxed);
    }

    /// Return the terminal to plain line output.
    ///
    /// Tracing is disabled and the progress indicator, if any, is stopped
    /// through the supervisor so its last message is finalized. Safe to call
    /// more than once.
    pub async fn quiesce(&self) {
        self.disable_trace();
        let previous = {
            let mut presentation = self
                .inner
                .presentation
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *presentation, Presentation::Plain)
        };
        if let Presentation::Progress { job, .. } = previous {
            self.inner.supervisor.terminate(job).await;
        }
    }

    /// Record a failure line in both logs and on stderr.
    pub fn report_failure(&self, message: &str) {
        self.inner.summary.line(message);
        self.inner.detail.line(message);
        eprintln!("{message}");
    }
}

impl Announce for OutputRouter {
    fn announce(&self, line: &str) {
        OutputRouter::announce(self, line);
    }
}

async fn create(path: &Path) -> Result<tokio::fs::File, RouterError> {
    tokio::fs::File::create(path)
        .await
        .map_err(|e| RouterError::CreateFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}
