//! CLI command implementations
//!
//! `run` owns the async runtime; the inspection commands are synchronous and
//! only read configuration and the plugin directories.

use anyhow::{Context, Result};
use std::io::Write;

use stackrun_config::Config;
use stackrun_engine::Installer;
use stackrun_plugins::PluginCatalog;
use stackrun_runner::LineSink;
use stackrun_utils::logging::init_tracing;
use stackrun_utils::{ExitCode, Phase};

/// Perform an installation run and map its outcome to the exit status.
pub fn execute_run(config: Config) -> Result<(), ExitCode> {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("stackrun: cannot start async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    // Lines buffer in the channel until the run opens the detail log.
    let (detail, detail_rx) = LineSink::channel();
    if let Err(e) = init_tracing(config.verbose, Some(detail.clone())) {
        eprintln!("stackrun: tracing unavailable: {e}");
    }

    let code = runtime.block_on(Installer::new(config).run(detail, detail_rx));
    if code == ExitCode::SUCCESS {
        Ok(())
    } else {
        Err(code)
    }
}

/// Print the phase sequence, one per line, in execution order.
pub fn print_phases() -> Result<()> {
    let mut out = std::io::stdout().lock();
    for (position, phase) in Phase::ALL.iter().enumerate() {
        writeln!(out, "{:>2}  {phase}", position + 1)?;
    }
    Ok(())
}

/// List configured plugins in registration order with the phases they implement.
///
/// Plugins that are not on disk yet are marked; their phases are unknown
/// until the first run fetches them.
pub fn print_plugins(config: &Config) -> Result<()> {
    let mut catalog = PluginCatalog::from_config(config);
    catalog
        .discover_script_hooks()
        .context("Failed to scan plugin hook directories")?;

    let mut out = std::io::stdout().lock();
    if catalog.is_empty() {
        writeln!(out, "No plugins configured")?;
        return Ok(());
    }

    for (plugin, phases) in catalog.coverage() {
        let state = match (plugin.enabled, plugin.path().is_some_and(|p| p.is_dir())) {
            (false, _) => "disabled",
            (true, false) => "not fetched",
            (true, true) => "enabled",
        };
        let phases = if phases.is_empty() {
            "-".to_string()
        } else {
            phases
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        writeln!(
            out,
            "{:>2}  {:<20} {:<12} {}",
            plugin.order + 1,
            plugin.name,
            state,
            plugin.source
        )?;
        writeln!(out, "    phases: {phases}")?;
    }
    Ok(())
}

/// Print the effective configuration with the source of each value.
pub fn print_config(config: &Config) -> Result<()> {
    let mut out = std::io::stdout().lock();

    match &config.config_path {
        Some(path) => writeln!(out, "Config file: {}", path.display())?,
        None => writeln!(out, "Config file: none (using defaults)")?,
    }
    writeln!(out, "Project root: {}", config.root.display())?;
    writeln!(out)?;

    for (key, value, source) in config.effective_config() {
        writeln!(out, "  {key} = {value}  [{source}]")?;
    }

    if !config.context.is_empty() {
        writeln!(out)?;
        writeln!(out, "Context:")?;
        for (key, value) in &config.context {
            writeln!(out, "  {key}={value}")?;
        }
    }
    Ok(())
}
