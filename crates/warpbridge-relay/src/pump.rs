//! Stream pumps: connect relays to a framed byte stream.
//!
//! [`pump_to_writer`] drains a [`ChannelTransport`](crate::ChannelTransport)
//! receiver into framed writes; [`serve_reader`] reads frames and dispatches
//! them to a [`RelayRegistry`].

use crate::registry::RelayRegistry;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use warpbridge_types::CommandPacket;
use warpbridge_wire::{read_frame, write_frame, FrameBody, RelayFrame, WireError};

/// Write every queued packet as a `relay_command` frame until the channel closes.
///
/// A packet too large to frame is dropped with a warning. Returns the number
/// of frames written.
pub async fn pump_to_writer<W>(
    mut rx: mpsc::UnboundedReceiver<CommandPacket>,
    writer: &mut W,
) -> Result<u64, WireError>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(packet) = rx.recv().await {
        let pid = packet.process_id().to_string();
        match write_frame(writer, &RelayFrame::from_packet(packet)).await {
            Ok(()) => written += 1,
            Err(WireError::FrameTooLarge { size, max }) => {
                warn!(pid = %pid, size, max, "Outbound packet too large, dropped");
            }
            Err(e) => return Err(e),
        }
    }
    debug!(written, "Outbound pump finished");
    Ok(written)
}

/// Read frames until the peer closes the stream, routing each to `registry`.
///
/// Routing failures concern a single packet and are logged; only stream
/// errors end the loop.
pub async fn serve_reader<R>(reader: &mut R, registry: &RelayRegistry) -> Result<(), WireError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = match read_frame(reader).await {
            Ok(f) => f,
            Err(WireError::ConnectionClosed) => {
                info!("Transport stream closed");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let RelayFrame { id: frame_id, body } = frame;
        match body {
            FrameBody::RelayCommand {
                pid,
                dst_nid,
                src_nid,
                module,
                content,
            } => {
                let packet = CommandPacket::new(pid, dst_nid, src_nid, module, content);
                if let Err(e) = registry.route_inbound(packet) {
                    warn!(frame_id = %frame_id, error = %e, "Inbound frame dropped");
                }
            }
            FrameBody::Quit { pid } => {
                let Some(relay) = registry.remove(&pid) else {
                    warn!(frame_id = %frame_id, pid = %pid, "Quit frame for unknown process");
                    continue;
                };
                // quit() blocks until in-flight relay calls drain.
                match tokio::task::spawn_blocking(move || relay.quit()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(frame_id = %frame_id, pid = %pid, error = %e, "Quit frame failed");
                    }
                    Err(e) => {
                        warn!(frame_id = %frame_id, pid = %pid, error = %e, "Quit task failed");
                    }
                }
            }
        }
    }
}
