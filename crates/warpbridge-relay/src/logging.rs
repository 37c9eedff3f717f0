//! Tracing setup for hosts that do not install their own subscriber.

use tracing_subscriber::EnvFilter;
use warpbridge_types::RelayConfig;

/// Build the filter: `RUST_LOG` if set, else `config.log_level`, else `info`.
pub fn env_filter(config: &RelayConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a stderr fmt subscriber.
///
/// Returns `false` if a global subscriber was already set, which is left in place.
pub fn init_tracing(config: &RelayConfig) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
