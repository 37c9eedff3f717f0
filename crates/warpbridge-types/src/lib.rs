//! Core types for the warpbridge engine relay.
//!
//! This crate defines the data shared by the relay core, the host transport
//! framing, and engine implementations: command packets, addressing
//! sentinels, process identity, configuration, and the error taxonomy.
//! It contains no routing logic.

pub mod config;
pub mod content;
pub mod error;
pub mod identity;
pub mod packet;

pub use config::{NoneSourcePolicy, RelayConfig, RepeatQuitPolicy};
pub use error::{EngineError, RelayError, RelayResult};
pub use identity::{Module, ProcessIdentity, SpecialNid, SpecialPid};
pub use packet::CommandPacket;
