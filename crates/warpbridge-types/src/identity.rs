//! Node, process, and module addressing.

use crate::error::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};

/// Reserved node-id values with routing meaning.
///
/// These strings are shared with every other node on the network and must
/// not change.
pub struct SpecialNid;

impl SpecialNid {
    /// Source unknown or unspecified. Only expected on inbound packets.
    pub const NONE: &'static str = "";
    /// The relay's own node-id, resolved by the relay at send time.
    pub const THIS: &'static str = "THIS";
    /// Destination meaning every known node.
    pub const BROADCAST: &'static str = "BROADCAST";

    pub fn is_none(nid: &str) -> bool {
        nid == Self::NONE
    }

    pub fn is_this(nid: &str) -> bool {
        nid == Self::THIS
    }

    pub fn is_broadcast(nid: &str) -> bool {
        nid == Self::BROADCAST
    }

    /// Whether `nid` is any reserved value rather than a concrete node-id.
    pub fn is_special(nid: &str) -> bool {
        Self::is_none(nid) || Self::is_this(nid) || Self::is_broadcast(nid)
    }
}

/// Reserved process-id values.
pub struct SpecialPid;

impl SpecialPid {
    /// Process-id used for packets addressed to every process.
    pub const BROADCAST: &'static str = "";
}

/// Opaque selector for the receiving subsystem inside a node.
///
/// The relay never interprets the value; the well-known constants exist for
/// engine implementations and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Module(i32);

impl Module {
    pub const MEMORY: Module = Module(0);
    pub const VM: Module = Module(1);
    pub const CONTROLLER: Module = Module(2);
    pub const GUI: Module = Module(3);
    pub const SCHEDULER: Module = Module(4);
    pub const NETWORK: Module = Module(5);

    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i32 {
        self.0
    }

    /// Human-readable name for well-known selectors.
    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::MEMORY => Some("memory"),
            Self::VM => Some("vm"),
            Self::CONTROLLER => Some("controller"),
            Self::GUI => Some("gui"),
            Self::SCHEDULER => Some("scheduler"),
            Self::NETWORK => Some("network"),
            _ => None,
        }
    }
}

impl From<i32> for Module {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl From<Module> for i32 {
    fn from(module: Module) -> Self {
        module.0
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}({})", name, self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Process-wide identity fixed once when a relay is initialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessIdentity {
    /// Node-id of this node.
    pub my_nid: String,
    /// Process-id owned by the relay.
    pub my_pid: String,
    /// Root thread-id, an index into the engine's thread table.
    pub root_tid: u64,
    /// Address of the process record in the engine's process table.
    pub proc_addr: u64,
    /// Node treated as authoritative for this process.
    pub master_nid: String,
}

impl ProcessIdentity {
    pub fn new(
        my_nid: impl Into<String>,
        my_pid: impl Into<String>,
        root_tid: u64,
        proc_addr: u64,
        master_nid: impl Into<String>,
    ) -> Self {
        Self {
            my_nid: my_nid.into(),
            my_pid: my_pid.into(),
            root_tid,
            proc_addr,
            master_nid: master_nid.into(),
        }
    }

    /// Check that the node-id and process-id are concrete values.
    pub fn validate(&self) -> RelayResult<()> {
        if SpecialNid::is_special(&self.my_nid) {
            return Err(RelayError::InvalidIdentity(format!(
                "node-id must be concrete, got {:?}",
                self.my_nid
            )));
        }
        if self.my_pid == SpecialPid::BROADCAST {
            return Err(RelayError::InvalidIdentity(
                "process-id must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `nid` names this node, either literally or through `THIS`.
    pub fn is_own_node(&self, nid: &str) -> bool {
        SpecialNid::is_this(nid) || nid == self.my_nid
    }
}
