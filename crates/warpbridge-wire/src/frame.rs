//! Frame types and the length-prefixed JSON codec.

use crate::stream::WireError;
use serde::{Deserialize, Serialize};
use warpbridge_types::{CommandPacket, Module};

/// Maximum single frame size (16 MB).
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// A framed message exchanged with the host transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayFrame {
    /// Unique frame ID.
    pub id: String,
    /// Frame variant.
    #[serde(flatten)]
    pub body: FrameBody,
}

/// The different kinds of frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum FrameBody {
    /// A command packet travelling between a relay and the transport.
    #[serde(rename = "relay_command")]
    RelayCommand {
        pid: String,
        dst_nid: String,
        src_nid: String,
        module: Module,
        /// Opaque JSON payload, carried as a string.
        content: String,
    },
    /// Request to tear down the relay of a process.
    #[serde(rename = "quit")]
    Quit { pid: String },
}

impl RelayFrame {
    /// Wrap a packet in a frame with a fresh ID.
    pub fn from_packet(packet: CommandPacket) -> Self {
        let (pid, dst_nid, src_nid, module, content) = packet.into_parts();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            body: FrameBody::RelayCommand {
                pid,
                dst_nid,
                src_nid,
                module,
                content,
            },
        }
    }

    /// Build a quit frame for a process.
    pub fn quit(pid: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            body: FrameBody::Quit { pid: pid.into() },
        }
    }

    /// Process-id the frame refers to.
    pub fn process_id(&self) -> &str {
        match &self.body {
            FrameBody::RelayCommand { pid, .. } | FrameBody::Quit { pid } => pid,
        }
    }

    /// Unwrap the packet carried by a `relay_command` frame.
    pub fn into_packet(self) -> Option<CommandPacket> {
        match self.body {
            FrameBody::RelayCommand {
                pid,
                dst_nid,
                src_nid,
                module,
                content,
            } => Some(CommandPacket::new(pid, dst_nid, src_nid, module, content)),
            FrameBody::Quit { .. } => None,
        }
    }
}

/// Encode a frame to bytes (4-byte big-endian length + JSON).
///
/// Bodies over [`MAX_FRAME_SIZE`] are refused, since no reader would accept them.
pub fn encode_frame(frame: &RelayFrame) -> Result<Vec<u8>, WireError> {
    let json = serde_json::to_vec(frame)?;
    let len = u32::try_from(json.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_SIZE)
        .ok_or(WireError::FrameTooLarge {
            size: json.len(),
            max: MAX_FRAME_SIZE as usize,
        })?;
    let mut bytes = Vec::with_capacity(4 + json.len());
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(&json);
    Ok(bytes)
}

/// Decode the length prefix from a 4-byte header.
pub fn decode_length(header: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*header)
}

/// Parse a JSON body into a RelayFrame.
pub fn decode_frame(body: &[u8]) -> Result<RelayFrame, serde_json::Error> {
    serde_json::from_slice(body)
}
