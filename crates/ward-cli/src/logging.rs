//! Diagnostic tracing for the CLI.
//!
//! Check results go to stdout; tracing output from `ward-core` (deploy,
//! analysis, commit events) goes to stderr and is controlled by `RUST_LOG`,
//! unless `--quiet` is given.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn` if unset. With `quiet`, only
/// errors are emitted and `RUST_LOG` is ignored.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=ward_core=debug ward-cli check contract.cpp
/// ```
pub fn init(quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
