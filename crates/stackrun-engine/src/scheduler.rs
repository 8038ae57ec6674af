//! Phase sequencing.
//!
//! Hooks run one at a time on the calling task, in registration order,
//! phase after phase. The first failure ends the run: nothing later is
//! attempted, nothing earlier is undone.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tracing::Instrument;

use stackrun_phase_api::{HookCall, HookFailure, HookIo, InstallContext, Phase};
use stackrun_plugins::PluginCatalog;
use stackrun_utils::logging::phase_span;

/// Receives one human-facing line per hook invocation.
pub trait Announce: Send + Sync {
    fn announce(&self, line: &str);
}

/// A hook failed; the run stops here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{phase}: {plugin} failed with {failure}")]
pub struct PhaseFailure {
    pub phase: Phase,
    pub plugin: String,
    pub failure: HookFailure,
}

/// Plugins that ran during one phase, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub ran: Vec<String>,
}

/// A hook invocation that has started and not yet returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningHook {
    pub phase: Phase,
    pub plugin: String,
}

impl fmt::Display for RunningHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.phase, self.plugin)
    }
}

/// Shared view of the hook currently running.
///
/// The scheduler fills it in before each invocation and clears it after the
/// hook returns. If the run is abandoned mid-hook the entry stays, so the
/// interrupted step can still be named.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<Mutex<Option<RunningHook>>>);

impl InFlight {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> Option<RunningHook> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn enter(&self, phase: Phase, plugin: &str) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(RunningHook {
            phase,
            plugin: plugin.to_string(),
        });
    }

    fn leave(&self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

pub struct PhaseScheduler<'a> {
    catalog: &'a PluginCatalog,
    io: HookIo,
    announcer: &'a dyn Announce,
    in_flight: InFlight,
}

impl<'a> PhaseScheduler<'a> {
    #[must_use]
    pub fn new(catalog: &'a PluginCatalog, io: HookIo, announcer: &'a dyn Announce) -> Self {
        Self {
            catalog,
            io,
            announcer,
            in_flight: InFlight::new(),
        }
    }

    /// Publish the running hook into `in_flight` instead of a private cell.
    #[must_use]
    pub fn with_in_flight(mut self, in_flight: InFlight) -> Self {
        self.in_flight = in_flight;
        self
    }

    /// Invoke every enabled plugin's hook for `phase`, strictly in sequence.
    pub async fn run_phase(
        &self,
        phase: Phase,
        ctx: &mut InstallContext,
    ) -> Result<PhaseReport, PhaseFailure> {
        let span = phase_span(phase.as_str());
        async {
            let mut ran = Vec::new();
            for (plugin, hook) in self.catalog.hooks_for(phase) {
                self.announcer.announce(&format!("{phase}: {}", plugin.name));

                let call = HookCall {
                    phase,
                    plugin: &plugin.name,
                    io: &self.io,
                };
                let started = Instant::now();
                self.in_flight.enter(phase, &plugin.name);
                let result = hook.run(&call, ctx).await;
                self.in_flight.leave();
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

                match result {
                    Ok(()) => {
                        tracing::debug!(plugin = %plugin.name, duration_ms, status = 0, "hook finished");
                        ran.push(plugin.name.clone());
                    }
                    Err(failure) => {
                        tracing::error!(
                            plugin = %plugin.name,
                            duration_ms,
                            status = failure.status,
                            "hook failed"
                        );
                        return Err(PhaseFailure {
                            phase,
                            plugin: plugin.name.clone(),
                            failure,
                        });
                    }
                }
            }
            Ok(PhaseReport { phase, ran })
        }
        .instrument(span)
        .await
    }

    /// Run every phase of [`Phase::ALL`] in order, stopping at the first failure.
    pub async fn run_all(&self, ctx: &mut InstallContext) -> Result<Vec<PhaseReport>, PhaseFailure> {
        let mut reports = Vec::with_capacity(Phase::ALL.len());
        for phase in Phase::ALL {
            reports.push(self.run_phase(phase, ctx).await?);
        }
        Ok(reports)
    }
}
