//! One-line `tracing` setup for binaries and tests.

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber reading `RUST_LOG`, falling back to
/// `default_filter` when unset or unparsable. Safe to call more than once
/// (e.g. from several test modules) — later calls are no-ops.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter.to_string()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
