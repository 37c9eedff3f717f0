//! Command relay between an embedded VM engine and the host transport.
//!
//! ## Architecture
//!
//! - **Relay**: owns one process identity, validates packets and forwards them
//!   in both directions, and enforces the `Uninitialized -> Active -> Quit` lifecycle
//! - **EngineBinding**: trait for the native engine; receives an [`OutboundSink`]
//!   at start so it can emit packets back through the relay
//! - **TransportDelegate**: trait for the host's outbound transport
//! - **RelayRegistry**: routes inbound packets to the relay owning their process
//! - **pump**: framed stream loops connecting a registry and a channel transport
//!   to a byte stream

pub mod config;
pub mod engine;
pub mod logging;
pub mod pump;
pub mod registry;
pub mod relay;
pub mod transport;

pub use engine::{EngineBinding, EngineHandle, OutboundSink};
pub use registry::RelayRegistry;
pub use relay::{Relay, RelayState, RelayStats};
pub use transport::{ChannelTransport, TransportDelegate};
pub use warpbridge_types::{
    CommandPacket, EngineError, Module, ProcessIdentity, RelayConfig, RelayError, RelayResult,
    SpecialNid,
};
