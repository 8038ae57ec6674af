use clap::Parser;

use stackrun_config::{CliArgs, Config};
use stackrun_runner::LineSink;
use stackrun_utils::ExitCode;
use stackrun_utils::logging::init_tracing;

use super::args::{Cli, Commands};
use super::commands;

/// Parse the command line and execute it.
///
/// Every error is reported here; the caller only maps the code to the
/// process exit status.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();
    let cli_args = cli_args(&cli);

    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("stackrun: {err}");
            return Err(ExitCode::CLI_ARGS);
        }
    };

    if let Commands::Run { .. } = cli.command {
        return commands::execute_run(config);
    }

    if let Err(e) = init_tracing(config.verbose, None::<LineSink>) {
        eprintln!("stackrun: tracing unavailable: {e}");
    }
    let result = match cli.command {
        Commands::Phases => commands::print_phases(),
        Commands::Plugins => commands::print_plugins(&config),
        Commands::Config => commands::print_config(&config),
        Commands::Run { .. } => Ok(()),
    };
    result.map_err(|err| {
        eprintln!("stackrun: {err:#}");
        ExitCode::INTERNAL
    })
}

/// CLI overrides for configuration discovery; flags not given stay `None`.
pub(crate) fn cli_args(cli: &Cli) -> CliArgs {
    CliArgs {
        config_path: cli.config.clone(),
        verbose: cli.verbose.then_some(true),
        progress: cli.no_progress.then_some(false),
        log_file: cli.log_file.clone(),
        log_retention_days: cli.log_retention_days,
        set: match &cli.command {
            Commands::Run { set } => set.clone(),
            _ => Vec::new(),
        },
    }
}
