//! The fault path.
//!
//! Every way a run can end funnels through [`FaultController`]: a fetch
//! failure, a failed hook, an interrupt, a log-setup failure, or success.
//! The controller runs its sequence exactly once; later callers get the
//! first caller's exit code.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Instant;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use stackrun_config::Config;
use stackrun_plugins::{CatalogError, FetchError};
use stackrun_runner::{CommandSpec, LineSink, ProcessSupervisor, run_streaming};
use stackrun_utils::ExitCode;

use crate::output::{OutputRouter, RouterError};
use crate::scheduler::{PhaseFailure, RunningHook};

/// A condition that ends the run.
#[derive(Error, Debug)]
pub enum Fault {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Hook(#[from] PhaseFailure),

    #[error("interrupted by signal {signal}{}", during_suffix(.during))]
    Interrupted {
        signal: i32,
        /// Hook that was running when the signal arrived
        during: Option<RunningHook>,
    },

    #[error(transparent)]
    LogSetup(#[from] RouterError),

    #[error(transparent)]
    Discovery(#[from] CatalogError),

    #[error("{reason}")]
    Internal { reason: String },
}

impl Fault {
    /// Status the process exits with.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Fetch(_) => ExitCode::FETCH_FAILED,
            Self::Hook(failure) => ExitCode::from_failure_status(failure.failure.status),
            Self::Interrupted { signal, .. } => ExitCode::from_signal(*signal),
            Self::LogSetup(_) => ExitCode::LOG_SETUP,
            Self::Discovery(_) | Self::Internal { .. } => ExitCode::INTERNAL,
        }
    }

    fn phase(&self) -> Option<String> {
        match self {
            Self::Hook(failure) => Some(failure.phase.to_string()),
            Self::Interrupted {
                during: Some(hook), ..
            } => Some(hook.phase.to_string()),
            _ => None,
        }
    }

    fn plugin(&self) -> Option<String> {
        match self {
            Self::Hook(failure) => Some(failure.plugin.clone()),
            Self::Fetch(err) => Some(err.plugin().to_string()),
            Self::Interrupted {
                during: Some(hook), ..
            } => Some(hook.plugin.clone()),
            _ => None,
        }
    }
}

fn during_suffix(during: &Option<RunningHook>) -> String {
    during
        .as_ref()
        .map(|hook| format!(" during {hook}"))
        .unwrap_or_default()
}

/// Machine-readable outcome of one run, appended as a JSON line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    /// `pass` or `fail`
    pub outcome: &'static str,
    pub exit_code: i32,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub struct FaultController {
    supervisor: ProcessSupervisor,
    detail: LineSink,
    router: OnceLock<OutputRouter>,
    root: PathBuf,
    collector: Option<Vec<String>>,
    results_file: Option<PathBuf>,
    started_at: DateTime<Utc>,
    started: Instant,
    outcome: Mutex<Option<ExitCode>>,
}

impl FaultController {
    #[must_use]
    pub fn new(config: &Config, supervisor: ProcessSupervisor, detail: LineSink) -> Self {
        Self {
            supervisor,
            detail,
            router: OnceLock::new(),
            root: config.root.clone(),
            collector: config.collector.clone(),
            results_file: config.results_file.clone(),
            started_at: Utc::now(),
            started: Instant::now(),
            outcome: Mutex::new(None),
        }
    }

    /// Route later reports through the run's logs. Only the first router sticks.
    pub fn attach_router(&self, router: OutputRouter) -> bool {
        self.router.set(router).is_ok()
    }

    /// Run the failure sequence for `fault` and return the exit code.
    pub async fn trigger(&self, fault: Fault) -> ExitCode {
        let mut outcome = self.outcome.lock().await;
        if let Some(code) = *outcome {
            tracing::debug!(%fault, first = code.as_i32(), "fault path already ran");
            return code;
        }

        let code = fault.exit_code();

        if let Some(router) = self.router.get() {
            router.quiesce().await;
        }

        let location = self
            .router
            .get()
            .map(|r| format!("; full log: {}", r.log_location().display()))
            .unwrap_or_default();
        let message = format!("stackrun failed (exit {}): {fault}{location}", code.as_i32());
        match self.router.get() {
            Some(router) => router.report_failure(&message),
            None => eprintln!("{message}"),
        }

        self.collect_diagnostics(code).await;
        self.record(RunRecord {
            outcome: "fail",
            exit_code: code.as_i32(),
            started_at: self.started_at,
            duration_secs: self.started.elapsed().as_secs_f64(),
            phase: fault.phase(),
            plugin: fault.plugin(),
            reason: Some(fault.to_string()),
        })
        .await;
        self.supervisor.terminate_all().await;

        *outcome = Some(code);
        code
    }

    /// Run the success sequence and return [`ExitCode::SUCCESS`].
    pub async fn finish_success(&self) -> ExitCode {
        let mut outcome = self.outcome.lock().await;
        if let Some(code) = *outcome {
            return code;
        }

        let elapsed = self.started.elapsed();
        if let Some(router) = self.router.get() {
            router.quiesce().await;
            router.announce(&format!(
                "stackrun completed in {}s; full log: {}",
                elapsed.as_secs(),
                router.log_location().display()
            ));
        }
        self.record(RunRecord {
            outcome: "pass",
            exit_code: 0,
            started_at: self.started_at,
            duration_secs: elapsed.as_secs_f64(),
            phase: None,
            plugin: None,
            reason: None,
        })
        .await;
        self.supervisor.terminate_all().await;

        *outcome = Some(ExitCode::SUCCESS);
        ExitCode::SUCCESS
    }

    /// Best effort: a missing or failing collector is logged, never fatal.
    async fn collect_diagnostics(&self, code: ExitCode) {
        let Some((program, args)) = self.collector.as_deref().and_then(<[String]>::split_first)
        else {
            return;
        };
        let Some(resolved) = locate(program, &self.root) else {
            tracing::warn!(%program, "diagnostic collector not found; skipping");
            return;
        };

        let mut cmd = CommandSpec::new(resolved)
            .args(args)
            .cwd(&self.root)
            .env("STACKRUN_EXIT_CODE", code.as_i32().to_string());
        if let Some(router) = self.router.get() {
            cmd = cmd.env("STACKRUN_LOG", router.log_location());
        }

        self.detail.line(format!("+ {cmd}"));
        match run_streaming(&cmd, &self.detail, &self.supervisor).await {
            Ok(0) => tracing::debug!("diagnostic collector finished"),
            Ok(status) => tracing::warn!(status, "diagnostic collector failed"),
            Err(e) => tracing::warn!(error = %e, "diagnostic collector could not run"),
        }
    }

    async fn record(&self, record: RunRecord) {
        let Some(path) = &self.results_file else {
            return;
        };
        if let Err(e) = append_record(path, &record).await {
            tracing::warn!(path = %path.display(), error = %e, "could not write run record");
        }
    }
}

/// Resolve the collector program: a path is checked on disk, a bare name on `PATH`.
fn locate(program: &str, root: &Path) -> Option<PathBuf> {
    let path = Path::new(program);
    if path.components().count() > 1 {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };
        path.is_file().then_some(path)
    } else {
        which::which(program).ok()
    }
}

async fn append_record(path: &Path, record: &RunRecord) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut line = serde_json::to_string(record).map_err(std::io::Error::other)?;
    line.push('\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::RouterOptions;
    use stackrun_config::CliArgs;
    use stackrun_phase_api::{HookFailure, Phase};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn config(root: &Path) -> Config {
        fs::create_dir_all(root.join(".git")).unwrap();
        Config::discover_from(root, &CliArgs::default()).unwrap()
    }

    fn hook_fault(status: i32) -> Fault {
        Fault::Hook(PhaseFailure {
            phase: Phase::Install,
            plugin: "mysql".to_string(),
            failure: HookFailure::status(status).with_command("hooks/install"),
        })
    }

    async fn controller_with_router(config: &Config) -> (FaultController, OutputRouter) {
        let supervisor = ProcessSupervisor::new();
        let (detail, rx) = LineSink::channel();
        let controller = FaultController::new(config, supervisor.clone(), detail.clone());
        let router = OutputRouter::open(
            RouterOptions::from_config(config),
            detail,
            rx,
            supervisor,
        )
        .await
        .unwrap();
        assert!(controller.attach_router(router.clone()));
        (controller, router)
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(hook_fault(17).exit_code().as_i32(), 17);
        assert_eq!(hook_fault(0).exit_code(), ExitCode::INTERNAL);
        assert_eq!(
            Fault::Interrupted {
                signal: 15,
                during: None
            }
            .exit_code()
            .as_i32(),
            143
        );
        assert_eq!(
            Fault::Fetch(FetchError::UnknownPlugin("x".into())).exit_code(),
            ExitCode::FETCH_FAILED
        );
    }

    #[tokio::test]
    async fn test_hook_failure_exits_with_its_status_and_names_the_step() {
        let temp = TempDir::new().unwrap();
        let config = config(temp.path());
        let (controller, router) = controller_with_router(&config).await;

        let code = controller.trigger(hook_fault(17)).await;

        assert_eq!(code.as_i32(), 17);
        let summary = fs::read_to_string(&router.paths().summary).unwrap();
        let failure_lines: Vec<&str> = summary
            .lines()
            .filter(|l| l.contains("stackrun failed"))
            .collect();
        assert_eq!(failure_lines.len(), 1);
        assert!(failure_lines[0].contains("install: mysql"));
        assert!(failure_lines[0].contains("exit 17"));
    }

    #[tokio::test]
    async fn test_repeated_triggers_run_once() {
        let temp = TempDir::new().unwrap();
        let config = config(temp.path());
        let (controller, router) = controller_with_router(&config).await;
        let controller = Arc::new(controller);

        let first = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.trigger(hook_fault(17)).await })
        };
        let second = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.trigger(hook_fault(17)).await })
        };
        let first = first.await.unwrap();
        let second = second.await.unwrap();
        let third = controller
            .trigger(Fault::Interrupted {
                signal: 2,
                during: None,
            })
            .await;
        let success = controller.finish_success().await;

        assert_eq!(first, second);
        assert_eq!(third, first);
        assert_eq!(success, first);
        let summary = fs::read_to_string(&router.paths().summary).unwrap();
        assert_eq!(summary.matches("stackrun failed").count(), 1);
    }

    #[tokio::test]
    async fn test_success_records_pass_and_stops_jobs() {
        let temp = TempDir::new().unwrap();
        let mut config = config(temp.path());
        config.results_file = Some(temp.path().join("results/runs.jsonl"));
        let (controller, router) = controller_with_router(&config).await;

        let code = controller.finish_success().await;

        assert_eq!(code, ExitCode::SUCCESS);
        let record: serde_json::Value = serde_json::from_str(
            fs::read_to_string(temp.path().join("results/runs.jsonl"))
                .unwrap()
                .trim(),
        )
        .unwrap();
        assert_eq!(record["outcome"], "pass");
        assert_eq!(record["exit_code"], 0);
        assert!(record.get("phase").is_none());
        let summary = fs::read_to_string(&router.paths().summary).unwrap();
        assert!(summary.contains("stackrun completed"));
    }

    #[tokio::test]
    async fn test_interrupt_names_the_running_hook() {
        let temp = TempDir::new().unwrap();
        let mut config = config(temp.path());
        config.results_file = Some(temp.path().join("runs.jsonl"));
        let (controller, router) = controller_with_router(&config).await;

        let code = controller
            .trigger(Fault::Interrupted {
                signal: 15,
                during: Some(RunningHook {
                    phase: Phase::Install,
                    plugin: "alpha".to_string(),
                }),
            })
            .await;

        assert_eq!(code.as_i32(), 143);
        let summary = fs::read_to_string(&router.paths().summary).unwrap();
        let failure = summary
            .lines()
            .find(|l| l.contains("stackrun failed"))
            .unwrap();
        assert!(failure.contains("interrupted by signal 15 during install: alpha"));
        let text = fs::read_to_string(temp.path().join("runs.jsonl")).unwrap();
        let record: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(record["exit_code"], 143);
        assert_eq!(record["phase"], "install");
        assert_eq!(record["plugin"], "alpha");
    }

    #[tokio::test]
    async fn test_failure_without_router_still_records() {
        let temp = TempDir::new().unwrap();
        let mut config = config(temp.path());
        config.results_file = Some(temp.path().join("runs.jsonl"));
        let (detail, _rx) = LineSink::channel();
        let controller = FaultController::new(&config, ProcessSupervisor::new(), detail);

        let code = controller
            .trigger(Fault::Fetch(FetchError::Failed {
                plugin: "heat".into(),
                repo: "https://x".into(),
                git_ref: "master".into(),
                status: 128,
            }))
            .await;

        assert_eq!(code, ExitCode::FETCH_FAILED);
        let text = fs::read_to_string(temp.path().join("runs.jsonl")).unwrap();
        let record: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(record["outcome"], "fail");
        assert_eq!(record["exit_code"], 3);
        assert_eq!(record["plugin"], "heat");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_collector_output_lands_in_detail_log() {
        let temp = TempDir::new().unwrap();
        let mut config = config(temp.path());
        config.collector = Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo \"collecting after exit $STACKRUN_EXIT_CODE\"".to_string(),
        ]);
        let (controller, router) = controller_with_router(&config).await;

        controller.trigger(hook_fault(5)).await;

        let detail = fs::read_to_string(&router.paths().detail).unwrap();
        assert!(detail.contains("collecting after exit 5"));
    }

    #[tokio::test]
    async fn test_missing_collector_is_not_an_error() {
        let temp = TempDir::new().unwrap();
        let mut config = config(temp.path());
        config.collector = Some(vec!["tools/no-such-collector".to_string()]);
        let (controller, _router) = controller_with_router(&config).await;

        assert_eq!(controller.trigger(hook_fault(9)).await.as_i32(), 9);
    }
}
