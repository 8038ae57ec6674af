use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use stackrun_runner::{LineSink, ProcessSupervisor};
use stackrun_utils::Phase;

use crate::context::InstallContext;

/// Output and process handles available to every hook.
#[derive(Debug, Clone)]
pub struct HookIo {
    /// Detail log stream; command output and hook chatter go here
    pub detail: LineSink,
    /// Subprocesses a hook starts must be registered here
    pub supervisor: ProcessSupervisor,
}

/// Identifies the invocation a hook is serving.
#[derive(Debug, Clone, Copy)]
pub struct HookCall<'a> {
    pub phase: Phase,
    pub plugin: &'a str,
    pub io: &'a HookIo,
}

/// A hook reported failure. Only the status is authoritative; the rest is
/// diagnostic context for the fault report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookFailure {
    pub status: i32,
    pub command: Option<String>,
    pub message: Option<String>,
}

impl HookFailure {
    #[must_use]
    pub fn status(status: i32) -> Self {
        Self {
            status,
            command: None,
            message: None,
        }
    }

    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for HookFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}", self.status)?;
        if let Some(command) = &self.command {
            write!(f, " from '{command}'")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for HookFailure {}

/// A plugin's callable for one phase.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Run the hook. Mutations of `ctx` are visible to every later hook.
    async fn run(&self, call: &HookCall<'_>, ctx: &mut InstallContext) -> Result<(), HookFailure>;

    /// Short description for listings, e.g. the script path.
    fn describe(&self) -> String {
        "built-in".to_string()
    }
}

type HookFn = dyn Fn(&mut InstallContext) -> Result<(), HookFailure> + Send + Sync;

/// Hook backed by a synchronous closure; used by built-in plugins.
pub struct FnHook {
    f: Box<HookFn>,
}

impl FnHook {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut InstallContext) -> Result<(), HookFailure> + Send + Sync + 'static,
    {
        Self { f: Box::new(f) }
    }
}

#[async_trait]
impl Hook for FnHook {
    async fn run(&self, _call: &HookCall<'_>, ctx: &mut InstallContext) -> Result<(), HookFailure> {
        (self.f)(ctx)
    }
}

/// Per-plugin map from phase to hook. Phases without an entry are no-ops.
#[derive(Clone, Default)]
pub struct HookSet {
    hooks: BTreeMap<Phase, Arc<dyn Hook>>,
}

impl HookSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert; replaces an existing hook for `phase`.
    #[must_use]
    pub fn with(mut self, phase: Phase, hook: impl Hook + 'static) -> Self {
        self.insert(phase, Arc::new(hook));
        self
    }

    pub fn insert(&mut self, phase: Phase, hook: Arc<dyn Hook>) {
        self.hooks.insert(phase, hook);
    }

    #[must_use]
    pub fn get(&self, phase: Phase) -> Option<&Arc<dyn Hook>> {
        self.hooks.get(&phase)
    }

    /// Implemented phases in execution order.
    pub fn phases(&self) -> impl Iterator<Item = Phase> + '_ {
        self.hooks.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.hooks.iter().map(|(phase, hook)| (phase, hook.describe())))
            .finish()
    }
}

/// In-process plugin registered programmatically.
pub trait PluginUnit: Send + Sync {
    fn name(&self) -> &str;

    fn hooks(&self) -> HookSet;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io() -> HookIo {
        let (detail, _rx) = LineSink::channel();
        HookIo {
            detail,
            supervisor: ProcessSupervisor::new(),
        }
    }

    #[test]
    fn test_failure_display() {
        let failure = HookFailure::status(17)
            .with_command("hooks/install")
            .with_message("mysqld did not start");
        assert_eq!(
            failure.to_string(),
            "status 17 from 'hooks/install': mysqld did not start"
        );
        assert_eq!(HookFailure::status(2).to_string(), "status 2");
    }

    #[test]
    fn test_hook_set_orders_by_phase() {
        let noop = || FnHook::new(|_| Ok(()));
        let set = HookSet::new()
            .with(Phase::Extra, noop())
            .with(Phase::PreInstall, noop())
            .with(Phase::Install, noop());

        let phases: Vec<Phase> = set.phases().collect();
        assert_eq!(phases, vec![Phase::PreInstall, Phase::Install, Phase::Extra]);
        assert!(set.get(Phase::Source).is_none());
        assert_eq!(set.len(), 3);
    }

    #[tokio::test]
    async fn test_fn_hook_mutates_context() {
        let hook = FnHook::new(|ctx| {
            ctx.set("MYSQL_HOST", "127.0.0.1");
            Ok(())
        });
        let io = io();
        let call = HookCall {
            phase: Phase::Install,
            plugin: "mysql",
            io: &io,
        };
        let mut ctx = InstallContext::new();

        hook.run(&call, &mut ctx).await.unwrap();
        assert_eq!(ctx.get("MYSQL_HOST"), Some("127.0.0.1"));
        assert_eq!(hook.describe(), "built-in");
    }
}
