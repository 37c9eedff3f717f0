//! Host transport framing for command packets.
//!
//! A host that moves packets over a byte stream (a local socket to a
//! frontend, a TCP link to another node) wraps each [`CommandPacket`] in a
//! [`RelayFrame`] and writes it with a 4-byte big-endian length header.
//!
//! [`CommandPacket`]: warpbridge_types::CommandPacket

pub mod frame;
pub mod stream;

pub use frame::{decode_frame, decode_length, encode_frame, FrameBody, RelayFrame, MAX_FRAME_SIZE};
pub use stream::{read_frame, write_frame, WireError};
