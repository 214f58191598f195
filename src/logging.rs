//! Tracing setup for the `myslt` binary.
//!
//! Filter directives come from `MYSLT_LOG` (e.g. `MYSLT_LOG=myslt=debug`),
//! falling back to `info`. Output goes to stderr so `--json` stdout stays
//! clean.

use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV_VAR: &str = "MYSLT_LOG";

pub fn filter_from_env() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. Calling it twice is a no-op.
pub fn init() {
    let _ = fmt()
        .with_env_filter(filter_from_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
