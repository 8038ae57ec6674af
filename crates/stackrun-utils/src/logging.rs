//! Tracing setup for stackrun.
//!
//! Internal diagnostics go through `tracing`. Two layers are installed:
//! a compact layer on stderr for the operator, and an optional plain-text
//! layer that feeds the run's detail log so the log holds the full trace.

use std::io::IsTerminal;
use tracing::{Level, span};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::LevelFilter,
    fmt::{self, MakeWriter, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

/// Check if colored output should be used on stderr.
fn use_color() -> bool {
    std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Default filter directives when `RUST_LOG` is not set.
///
/// Debug events are kept whenever something consumes them: the verbose
/// stderr layer or the detail log.
#[must_use]
pub fn default_directives(keep_debug: bool) -> &'static str {
    if keep_debug {
        "stackrun=debug,info"
    } else {
        "stackrun=info,warn"
    }
}

/// Initialize the global tracing subscriber.
///
/// # Arguments
/// * `verbose` - without a detail log, lower the stderr threshold from WARN to DEBUG
/// * `detail` - writer for the detail log; every event that passes the filter is copied there
pub fn init_tracing<W>(verbose: bool, detail: Option<W>) -> Result<(), TryInitError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(verbose || detail.is_some())))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // With a detail log attached, verbose runs already echo it to stdout.
    let stderr_level = if verbose && detail.is_none() {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(use_color())
        .with_target(verbose)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_span_events(if verbose { FmtSpan::CLOSE } else { FmtSpan::NONE })
        .compact()
        .with_filter(stderr_level);

    let detail_layer = detail.map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .without_time()
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(detail_layer)
        .try_init()
}

/// Span wrapping every hook invocation of one phase.
pub fn phase_span(phase: &str) -> tracing::Span {
    span!(Level::INFO, "phase", phase = %phase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_follow_verbosity() {
        assert!(default_directives(true).contains("debug"));
        assert!(!default_directives(false).contains("debug"));
    }

    #[test]
    fn test_phase_span_is_constructible_without_subscriber() {
        let span = phase_span("install");
        let _guard = span.enter();
    }
}
