//! Transport delegate: the host's outbound path.

use tokio::sync::mpsc;
use tracing::debug;
use warpbridge_types::CommandPacket;

/// Trait implemented by the host to move packets off this process.
///
/// `send` is fire-and-forget: delivery failures are the transport's own
/// concern and are never reported back through the relay.
pub trait TransportDelegate: Send + Sync + 'static {
    fn send(&self, packet: CommandPacket);
}

/// Transport that queues packets on an unbounded tokio channel.
///
/// The host drains the receiver, typically with
/// [`pump_to_writer`](crate::pump::pump_to_writer).
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<CommandPacket>,
}

impl ChannelTransport {
    /// Create a transport and the receiver for its packets.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CommandPacket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Whether the receiving side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl TransportDelegate for ChannelTransport {
    fn send(&self, packet: CommandPacket) {
        if let Err(e) = self.tx.send(packet) {
            debug!(pid = %e.0.process_id(), "Transport receiver closed, packet discarded");
        }
    }
}
