//! Tracing setup for hosts that do not install their own subscriber.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
/// Returns `false` if a global subscriber was already set.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).try_init().is_ok()
}
