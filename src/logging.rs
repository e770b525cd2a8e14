//! Diagnostic logging.
//!
//! Log events go to stderr so they never mix with the report on stdout.
//! `RUST_LOG` overrides the level derived from the verbosity flags.

use tracing_subscriber::EnvFilter;

use crate::cli::VerbosityLevel;

/// Default filter directive for a verbosity level
pub fn default_directive(verbosity: VerbosityLevel) -> &'static str {
    match verbosity {
        VerbosityLevel::Quiet => "error",
        VerbosityLevel::Normal => "warn",
        VerbosityLevel::Verbose => "info",
        VerbosityLevel::Debug => "debug",
    }
}

/// Install the global subscriber. A second call leaves the first one in place.
pub fn init(verbosity: VerbosityLevel) {
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity == VerbosityLevel::Debug);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
