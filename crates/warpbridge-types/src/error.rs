//! Error types for the relay and its collaborators.

use thiserror::Error;

/// Errors reported by relay operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Lifecycle misuse, e.g. initializing twice or quitting a relay that is not active.
    #[error("Relay is in invalid state '{current}' for operation '{operation}'")]
    InvalidState {
        /// The current lifecycle state.
        current: String,
        /// The operation that was attempted.
        operation: String,
    },

    /// A relay call arrived outside the active window. The packet was dropped.
    #[error("Relay is not active (state '{state}'), dropped {operation} packet")]
    NotActive {
        /// The lifecycle state observed by the call.
        state: String,
        /// Direction of the dropped packet.
        operation: String,
    },

    /// An inbound packet named a different process. The packet was dropped.
    #[error("Packet for process '{actual}' delivered to relay of process '{expected}'")]
    ProcessMismatch {
        /// Process-id owned by the relay.
        expected: String,
        /// Process-id carried by the packet.
        actual: String,
    },

    /// An outbound packet claimed a third-party node as its source.
    #[error("Outbound packet source '{source_nid}' is neither this node '{my_nid}' nor a sentinel")]
    ForeignSource {
        /// Source carried by the packet.
        source_nid: String,
        /// This relay's node-id.
        my_nid: String,
    },

    /// An outbound packet used the `NONE` source sentinel and policy rejects it.
    #[error("Outbound packet has an unknown source")]
    NoneSourceOutbound,

    /// The engine refused to start the process. The relay must be discarded.
    #[error("Engine failed to start: {0}")]
    EngineStart(String),

    /// The engine could not accept a packet.
    #[error("Engine rejected packet: {0}")]
    EngineRejected(String),

    /// No relay is registered for the process-id.
    #[error("Unknown process: {0}")]
    UnknownProcess(String),

    /// A relay for the process-id is already registered.
    #[error("Process already registered: {0}")]
    DuplicateProcess(String),

    /// Packet content could not be built from the caller's parameters.
    #[error("Invalid packet content: {0}")]
    InvalidContent(String),

    /// The identity passed to initialize is unusable.
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RelayError {
    /// Whether the error concerns a single misdirected packet.
    ///
    /// Packet-local errors leave the relay usable. Everything else is either a
    /// broken lifecycle, after which the caller must stop issuing calls on that
    /// relay instance, or a caller bug that retrying cannot fix.
    pub fn is_packet_local(&self) -> bool {
        matches!(
            self,
            Self::NotActive { .. }
                | Self::ProcessMismatch { .. }
                | Self::ForeignSource { .. }
                | Self::NoneSourceOutbound
                | Self::EngineRejected(_)
                | Self::UnknownProcess(_)
        )
    }
}

/// Alias for Result with RelayError.
pub type RelayResult<T> = Result<T, RelayError>;

/// Failure reported by an engine collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
