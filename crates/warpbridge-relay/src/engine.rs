//! Engine binding: the interface to the native VM engine.
//!
//! The engine is started once per relay and handed an [`OutboundSink`]. It
//! may call the sink from any thread, at any time; calls made outside the
//! relay's active window come back as `NotActive` and must be tolerated.

use crate::relay::Relay;
use serde_json::{Map, Value};
use std::sync::{Arc, Weak};
use warpbridge_types::{
    content, CommandPacket, EngineError, Module, ProcessIdentity, RelayError, RelayResult,
};

/// Opaque handle returned by the engine when a process starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineHandle(pub u64);

impl std::fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Trait implemented by the native engine.
///
/// `start` and `stop` are invoked synchronously by the relay and are expected
/// to return in bounded time. Each is called at most once per relay.
pub trait EngineBinding: Send + Sync + 'static {
    /// Create the process described by `identity`.
    fn start(
        &self,
        identity: &ProcessIdentity,
        outbound: OutboundSink,
    ) -> Result<EngineHandle, EngineError>;

    /// Hand an inbound packet to the engine for execution.
    fn deliver(&self, packet: CommandPacket) -> Result<(), EngineError>;

    /// Tear down the process.
    fn stop(&self, pid: &str);
}

/// Callback path from the engine into the relay.
///
/// Holds a weak reference so an engine keeping the sink alive does not keep
/// the relay alive.
#[derive(Clone)]
pub struct OutboundSink {
    relay: Weak<Relay>,
}

impl OutboundSink {
    pub(crate) fn new(relay: &Arc<Relay>) -> Self {
        Self {
            relay: Arc::downgrade(relay),
        }
    }

    /// Emit a packet through the relay to the transport.
    pub fn send(&self, packet: CommandPacket) -> RelayResult<()> {
        match self.relay.upgrade() {
            Some(relay) => relay.relay_outbound(packet),
            None => Err(RelayError::NotActive {
                state: "dropped".to_string(),
                operation: "outbound".to_string(),
            }),
        }
    }

    /// Build a packet from this process and node, then emit it.
    ///
    /// The content is `params` with `command` inserted.
    pub fn send_command(
        &self,
        dst_nid: &str,
        module: Module,
        command: &str,
        params: Map<String, Value>,
    ) -> RelayResult<()> {
        let relay = self.relay.upgrade().ok_or_else(|| RelayError::NotActive {
            state: "dropped".to_string(),
            operation: "outbound".to_string(),
        })?;
        let identity = relay.identity().ok_or_else(|| RelayError::NotActive {
            state: relay.state().to_string(),
            operation: "outbound".to_string(),
        })?;
        let body = content::compose(command, params)?;
        let packet = CommandPacket::new(
            identity.my_pid.clone(),
            dst_nid,
            identity.my_nid.clone(),
            module,
            body,
        );
        relay.relay_outbound(packet)
    }

    /// Whether the relay behind this sink still exists.
    pub fn is_attached(&self) -> bool {
        self.relay.strong_count() > 0
    }
}

impl std::fmt::Debug for OutboundSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundSink")
            .field("attached", &self.is_attached())
            .finish()
    }
}
