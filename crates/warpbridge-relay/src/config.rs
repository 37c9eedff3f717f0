//! Configuration loading from `~/.warpbridge/relay.toml` with defaults.

use std::path::{Path, PathBuf};
use tracing::info;
use warpbridge_types::{RelayConfig, RelayError, RelayResult};

/// Environment variable overriding the configuration directory.
pub const HOME_ENV: &str = "WARPBRIDGE_HOME";

/// Default configuration file location.
pub fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var(HOME_ENV) {
        return PathBuf::from(home).join("relay.toml");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".warpbridge")
        .join("relay.toml")
}

/// Parse relay configuration from TOML text.
pub fn parse_config(contents: &str) -> RelayResult<RelayConfig> {
    toml::from_str(contents).map_err(|e| RelayError::Config(e.to_string()))
}

/// Load relay configuration from a TOML file, with defaults.
///
/// A missing, unreadable, or malformed file yields the default configuration.
pub fn load_config(path: Option<&Path>) -> RelayConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        return RelayConfig::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(contents) => match parse_config(&contents) {
            Ok(config) => {
                info!(path = %config_path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to parse config, using defaults"
                );
                RelayConfig::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to read config file, using defaults"
            );
            RelayConfig::default()
        }
    }
}
