//! Command packet: one unit of routed control traffic.

use crate::identity::{Module, SpecialNid};
use serde::{Deserialize, Serialize};

/// A routed command addressed to a module on some node.
///
/// Packets are immutable: every field is fixed at construction and only
/// exposed through accessors. No validation happens here because the meaning
/// of the source and destination sentinels depends on relay state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPacket {
    pid: String,
    dst_nid: String,
    src_nid: String,
    module: Module,
    content: String,
}

impl CommandPacket {
    /// Build a packet from its five fields.
    pub fn new(
        pid: impl Into<String>,
        dst_nid: impl Into<String>,
        src_nid: impl Into<String>,
        module: impl Into<Module>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            pid: pid.into(),
            dst_nid: dst_nid.into(),
            src_nid: src_nid.into(),
            module: module.into(),
            content: content.into(),
        }
    }

    /// Process-id this packet belongs to.
    pub fn process_id(&self) -> &str {
        &self.pid
    }

    /// Destination node-id (may be the broadcast sentinel).
    pub fn destination_node(&self) -> &str {
        &self.dst_nid
    }

    /// Source node-id as written by the producer (may be a sentinel).
    pub fn source_node(&self) -> &str {
        &self.src_nid
    }

    /// Target module selector inside the receiving node.
    pub fn module(&self) -> Module {
        self.module
    }

    /// Opaque JSON payload.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Source node-id with the `THIS` sentinel replaced by `my_nid`.
    pub fn resolved_source<'a>(&'a self, my_nid: &'a str) -> &'a str {
        if SpecialNid::is_this(&self.src_nid) {
            my_nid
        } else {
            &self.src_nid
        }
    }

    /// Whether the packet is addressed to every known node.
    pub fn is_broadcast(&self) -> bool {
        SpecialNid::is_broadcast(&self.dst_nid)
    }

    /// Consume the packet, returning `(pid, dst_nid, src_nid, module, content)`.
    pub fn into_parts(self) -> (String, String, String, Module, String) {
        (self.pid, self.dst_nid, self.src_nid, self.module, self.content)
    }
}

impl std::fmt::Display for CommandPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pid={} {} -> {} module={} ({} bytes)",
            self.pid,
            display_nid(&self.src_nid),
            display_nid(&self.dst_nid),
            self.module,
            self.content.len()
        )
    }
}

fn display_nid(nid: &str) -> &str {
    if SpecialNid::is_none(nid) {
        "<none>"
    } else {
        nid
    }
}
