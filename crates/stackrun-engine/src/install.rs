use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use stackrun_config::Config;
use stackrun_phase_api::{HookIo, InstallContext, PluginUnit};
use stackrun_plugins::{GitFetcher, PluginCatalog, SourceFetcher};
use stackrun_runner::{LineSink, ProcessSupervisor};
use stackrun_utils::ExitCode;

use crate::fault::{Fault, FaultController};
use crate::output::{OutputRouter, RouterOptions};
use crate::scheduler::{InFlight, PhaseScheduler};
use crate::signals::Interrupts;

/// One installation run.
///
/// Startup order: plugins are registered and materialized, the logs are
/// opened, script hooks are discovered, the context is seeded, then every
/// phase runs. Whatever happens, the run ends in the [`FaultController`]
/// and every supervised job is stopped before [`run`](Self::run) returns.
pub struct Installer {
    config: Config,
    supervisor: ProcessSupervisor,
    units: Vec<Arc<dyn PluginUnit>>,
    fetcher: Option<Arc<dyn SourceFetcher>>,
}

impl Installer {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            supervisor: ProcessSupervisor::new(),
            units: Vec::new(),
            fetcher: None,
        }
    }

    #[must_use]
    pub fn with_supervisor(mut self, supervisor: ProcessSupervisor) -> Self {
        self.supervisor = supervisor;
        self
    }

    /// Register an in-process plugin after the configured ones.
    #[must_use]
    pub fn with_unit(mut self, unit: impl PluginUnit + 'static) -> Self {
        self.units.push(Arc::new(unit));
        self
    }

    /// Replace the default git fetcher.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: impl SourceFetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Perform the run and return the status the process should exit with.
    ///
    /// `detail` and `detail_rx` are the detail stream; the caller usually
    /// has already pointed tracing at `detail`.
    pub async fn run(self, detail: LineSink, detail_rx: UnboundedReceiver<String>) -> ExitCode {
        let fault = FaultController::new(&self.config, self.supervisor.clone(), detail.clone());

        let mut interrupts = match Interrupts::install() {
            Ok(interrupts) => interrupts,
            Err(e) => {
                return fault
                    .trigger(Fault::Internal {
                        reason: format!("cannot install signal handlers: {e}"),
                    })
                    .await;
            }
        };

        // Dropping the drive future on interrupt drops the running hook,
        // which kills its process group.
        let in_flight = InFlight::new();
        let outcome = tokio::select! {
            result = self.drive(&fault, detail, detail_rx, in_flight.clone()) => result,
            signal = interrupts.recv() => {
                let during = in_flight.current();
                match &during {
                    Some(hook) => tracing::warn!(signal, running = %hook, "interrupted"),
                    None => tracing::warn!(signal, "interrupted"),
                }
                Err(Fault::Interrupted { signal, during })
            }
        };

        match outcome {
            Ok(()) => fault.finish_success().await,
            Err(cause) => fault.trigger(cause).await,
        }
    }

    async fn drive(
        &self,
        fault: &FaultController,
        detail: LineSink,
        mut detail_rx: UnboundedReceiver<String>,
        in_flight: InFlight,
    ) -> Result<(), Fault> {
        let mut catalog = PluginCatalog::from_config(&self.config);
        for unit in &self.units {
            catalog.register_unit(unit.as_ref());
        }

        let git;
        let fetcher: &dyn SourceFetcher = match &self.fetcher {
            Some(fetcher) => fetcher.as_ref(),
            None => {
                git = GitFetcher::new(detail.clone(), self.supervisor.clone());
                &git
            }
        };
        if let Err(e) = catalog.materialize_all(fetcher).await {
            // No log file exists yet; show what was captured so far.
            while let Ok(line) = detail_rx.try_recv() {
                eprintln!("{line}");
            }
            return Err(e.into());
        }

        let router = OutputRouter::open(
            RouterOptions::from_config(&self.config),
            detail.clone(),
            detail_rx,
            self.supervisor.clone(),
        )
        .await?;
        fault.attach_router(router.clone());

        catalog.discover_script_hooks()?;

        let mut ctx: InstallContext = self.config.context.iter().cloned().collect();
        tracing::info!(
            plugins = catalog.len(),
            context = ctx.len(),
            log = %router.log_location().display(),
            "starting run"
        );

        let io = HookIo {
            detail,
            supervisor: self.supervisor.clone(),
        };
        PhaseScheduler::new(&catalog, io, &router)
            .with_in_flight(in_flight)
            .run_all(&mut ctx)
            .await?;
        Ok(())
    }
}
