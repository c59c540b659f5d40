//! Tracing subscriber setup for the binary.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `passtree=debug`.
pub const LOG_ENV: &str = "PASSTREE_LOG";

/// Install the global subscriber, writing to stderr.
///
/// `PASSTREE_LOG` wins when set; otherwise `verbose` selects between
/// `passtree=debug` and `warn`. Calling it twice is harmless.
pub fn init(verbose: bool) {
    let fallback = if verbose { "passtree=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
