//! Relay configuration.

use serde::{Deserialize, Serialize};

/// Behaviour of `quit()` on a relay that already reached `Quit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatQuitPolicy {
    /// Report `InvalidState`.
    #[default]
    Fail,
    /// Return success without touching the engine.
    Ignore,
}

/// Handling of outbound packets whose source is the `NONE` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoneSourcePolicy {
    /// Log the packet and forward it.
    #[default]
    Warn,
    /// Drop the packet with `NoneSourceOutbound`.
    Reject,
}

/// Top-level relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// What a second `quit()` does.
    pub repeat_quit: RepeatQuitPolicy,
    /// What an outbound `NONE` source does.
    pub none_source_outbound: NoneSourcePolicy,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            repeat_quit: RepeatQuitPolicy::default(),
            none_source_outbound: NoneSourcePolicy::default(),
            log_level: "info".to_string(),
        }
    }
}
