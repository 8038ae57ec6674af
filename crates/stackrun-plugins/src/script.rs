//! Script plugins: hooks are executables under `<plugin>/hooks/<phase>`.
//!
//! # Environment
//!
//! A script hook runs with the plugin directory as its working directory and
//! receives:
//! - every [`InstallContext`] entry as an environment variable
//! - `STACKRUN_PHASE`: the phase name (e.g. `install`)
//! - `STACKRUN_PLUGIN`: the plugin name
//! - `STACKRUN_PLUGIN_DIR`: the plugin directory
//! - `STACKRUN_CONTEXT_OUT`: a file the hook may append `KEY=VALUE` lines to
//!
//! Lines written to `STACKRUN_CONTEXT_OUT` are merged into the context after
//! the hook exits successfully. Only the exit status decides success.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stackrun_phase_api::{Hook, HookCall, HookFailure, HookSet, InstallContext, Phase, PluginUnit};
use stackrun_runner::{CommandSpec, RunnerError, run_streaming};

/// Directory inside a plugin holding its hook executables
pub const HOOKS_DIR: &str = "hooks";

/// A materialized plugin whose hooks are executables on disk.
#[derive(Debug, Clone)]
pub struct ScriptPlugin {
    name: String,
    hooks: HookSet,
}

impl ScriptPlugin {
    /// Scan `<dir>/hooks` for executables named after phases.
    ///
    /// A missing directory yields an empty hook set. Files that are not
    /// named after a phase are ignored; phase-named files that are not
    /// executable are skipped with a warning.
    pub fn discover(name: &str, dir: &Path) -> io::Result<Self> {
        let mut hooks = HookSet::new();
        let hooks_dir = dir.join(HOOKS_DIR);

        if hooks_dir.is_dir() {
            for entry in std::fs::read_dir(&hooks_dir)? {
                let entry = entry?;
                let file_name = entry.file_name();
                let Some(phase) = file_name.to_str().and_then(|s| s.parse::<Phase>().ok()) else {
                    tracing::debug!(plugin = name, file = ?file_name, "ignoring non-phase file in hooks/");
                    continue;
                };
                let path = entry.path();
                if !is_executable(&path)? {
                    tracing::warn!(plugin = name, %phase, path = %path.display(), "hook is not executable; skipping");
                    continue;
                }
                hooks.insert(phase, Arc::new(ScriptHook::new(dir, path)));
            }
        }

        tracing::debug!(plugin = name, hooks = hooks.len(), "discovered script hooks");
        Ok(Self {
            name: name.to_string(),
            hooks,
        })
    }

    #[must_use]
    pub fn into_hooks(self) -> HookSet {
        self.hooks
    }
}

impl PluginUnit for ScriptPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn hooks(&self) -> HookSet {
        self.hooks.clone()
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let meta = std::fs::metadata(path)?;
    Ok(meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> io::Result<bool> {
    Ok(std::fs::metadata(path)?.is_file())
}

/// One hook executable.
#[derive(Debug, Clone)]
pub struct ScriptHook {
    plugin_dir: PathBuf,
    program: PathBuf,
}

impl ScriptHook {
    #[must_use]
    pub fn new(plugin_dir: impl Into<PathBuf>, program: impl Into<PathBuf>) -> Self {
        Self {
            plugin_dir: plugin_dir.into(),
            program: program.into(),
        }
    }

    fn failure(&self, status: i32) -> HookFailure {
        HookFailure::status(status).with_command(self.program.display().to_string())
    }
}

#[async_trait]
impl Hook for ScriptHook {
    async fn run(&self, call: &HookCall<'_>, ctx: &mut InstallContext) -> Result<(), HookFailure> {
        let context_out = tempfile::Builder::new()
            .prefix("stackrun-context-")
            .tempfile()
            .map_err(|e| self.failure(1).with_message(format!("cannot create context file: {e}")))?;

        let cmd = CommandSpec::new(&self.program)
            .cwd(&self.plugin_dir)
            .envs(ctx.iter())
            .env("STACKRUN_PHASE", call.phase.as_str())
            .env("STACKRUN_PLUGIN", call.plugin)
            .env("STACKRUN_PLUGIN_DIR", &self.plugin_dir)
            .env("STACKRUN_CONTEXT_OUT", context_out.path());

        call.io.detail.line(format!("+ {cmd}"));
        let status = run_streaming(&cmd, &call.io.detail, &call.io.supervisor)
            .await
            .map_err(|e| {
                let status = match e {
                    RunnerError::ProgramNotFound { .. } => 127,
                    _ => 126,
                };
                self.failure(status).with_message(e.to_string())
            })?;

        if status != 0 {
            return Err(self.failure(status));
        }

        let written = tokio::fs::read_to_string(context_out.path())
            .await
            .map_err(|e| self.failure(1).with_message(format!("cannot read context file: {e}")))?;
        for line in ctx.merge_assignments(&written) {
            tracing::warn!(plugin = call.plugin, phase = %call.phase, %line, "ignoring malformed context line");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.program.display().to_string()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use stackrun_phase_api::HookIo;
    use stackrun_runner::{LineSink, ProcessSupervisor};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_hook(plugin_dir: &Path, phase: &str, body: &str, mode: u32) -> PathBuf {
        let hooks = plugin_dir.join(HOOKS_DIR);
        fs::create_dir_all(&hooks).unwrap();
        let path = hooks.join(phase);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    fn io() -> (HookIo, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let (detail, rx) = LineSink::channel();
        (
            HookIo {
                detail,
                supervisor: ProcessSupervisor::new(),
            },
            rx,
        )
    }

    #[test]
    fn test_discover_picks_executable_phase_files() {
        let temp = TempDir::new().unwrap();
        write_hook(temp.path(), "install", "exit 0", 0o755);
        write_hook(temp.path(), "extra", "exit 0", 0o644);
        write_hook(temp.path(), "README", "not a hook", 0o755);

        let plugin = ScriptPlugin::discover("mysql", temp.path()).unwrap();
        let phases: Vec<Phase> = plugin.hooks().phases().collect();

        assert_eq!(plugin.name(), "mysql");
        assert_eq!(phases, vec![Phase::Install]);
    }

    #[test]
    fn test_discover_without_hooks_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        let plugin = ScriptPlugin::discover("bare", temp.path()).unwrap();
        assert!(plugin.into_hooks().is_empty());
    }

    #[tokio::test]
    async fn test_script_sees_context_and_writes_back() {
        let temp = TempDir::new().unwrap();
        let program = write_hook(
            temp.path(),
            "install",
            r##"echo "installing for $DATABASE_TYPE in $STACKRUN_PHASE by $STACKRUN_PLUGIN"
echo "DATABASE_HOST=10.0.0.9" >> "$STACKRUN_CONTEXT_OUT"
echo "# comment" >> "$STACKRUN_CONTEXT_OUT"
echo "bogus line" >> "$STACKRUN_CONTEXT_OUT"
pwd"##,
            0o755,
        );
        let hook = ScriptHook::new(temp.path(), &program);
        let (io, mut rx) = io();
        let call = HookCall {
            phase: Phase::Install,
            plugin: "mysql",
            io: &io,
        };
        let mut ctx: InstallContext = [("DATABASE_TYPE", "mysql")].into_iter().collect();

        hook.run(&call, &mut ctx).await.unwrap();

        assert_eq!(ctx.get("DATABASE_HOST"), Some("10.0.0.9"));
        assert_eq!(ctx.len(), 2);
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        assert!(lines[0].starts_with("+ "));
        assert!(lines.contains(&"installing for mysql in install by mysql".to_string()));
        let cwd = fs::canonicalize(temp.path()).unwrap();
        assert!(lines.iter().any(|l| fs::canonicalize(l).is_ok_and(|p| p == cwd)));
        assert!(io.supervisor.is_empty());
    }

    #[tokio::test]
    async fn test_failing_script_reports_status_and_skips_merge() {
        let temp = TempDir::new().unwrap();
        let program = write_hook(
            temp.path(),
            "install",
            "echo \"LEAKED=1\" >> \"$STACKRUN_CONTEXT_OUT\"\nexit 17",
            0o755,
        );
        let hook = ScriptHook::new(temp.path(), &program);
        let (io, _rx) = io();
        let call = HookCall {
            phase: Phase::Install,
            plugin: "mysql",
            io: &io,
        };
        let mut ctx = InstallContext::new();

        let failure = hook.run(&call, &mut ctx).await.unwrap_err();

        assert_eq!(failure.status, 17);
        assert_eq!(failure.command, Some(program.display().to_string()));
        assert!(!ctx.contains("LEAKED"));
    }

    #[tokio::test]
    async fn test_missing_program_maps_to_127() {
        let temp = TempDir::new().unwrap();
        let hook = ScriptHook::new(temp.path(), temp.path().join("hooks/install"));
        let (io, _rx) = io();
        let call = HookCall {
            phase: Phase::Install,
            plugin: "ghost",
            io: &io,
        };

        let failure = hook.run(&call, &mut InstallContext::new()).await.unwrap_err();
        assert_eq!(failure.status, 127);
    }
}
