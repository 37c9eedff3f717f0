//! Relay registry: one relay per process, looked up by process-id.
//!
//! The host keeps every live relay here so packets arriving from the
//! transport can be routed to the relay that owns their process.

use crate::relay::{Relay, RelayState};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};
use warpbridge_types::{CommandPacket, RelayError, RelayResult};

/// Thread-safe map of process-id to relay.
#[derive(Debug, Default)]
pub struct RelayRegistry {
    relays: DashMap<String, Arc<Relay>>,
}

impl RelayRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an active relay under its process-id.
    pub fn register(&self, relay: Arc<Relay>) -> RelayResult<()> {
        let state = relay.state();
        if state != RelayState::Active {
            return Err(RelayError::InvalidState {
                current: state.to_string(),
                operation: "register".to_string(),
            });
        }
        let pid = match relay.identity() {
            Some(identity) => identity.my_pid.clone(),
            None => {
                return Err(RelayError::InvalidState {
                    current: state.to_string(),
                    operation: "register".to_string(),
                })
            }
        };

        match self.relays.entry(pid.clone()) {
            Entry::Occupied(_) => return Err(RelayError::DuplicateProcess(pid)),
            Entry::Vacant(slot) => {
                slot.insert(relay);
            }
        }
        info!(pid = %pid, total = self.relays.len(), "Relay registered");
        Ok(())
    }

    /// Route an inbound packet to the relay owning its process.
    pub fn route_inbound(&self, packet: CommandPacket) -> RelayResult<()> {
        let relay = self.relay_for(packet.process_id())?;
        relay.relay_inbound(packet)
    }

    /// Remove a process's relay and quit it.
    pub fn quit(&self, pid: &str) -> RelayResult<()> {
        let relay = self
            .remove(pid)
            .ok_or_else(|| RelayError::UnknownProcess(pid.to_string()))?;
        relay.quit()
    }

    /// Unregister a process's relay without quitting it.
    pub fn remove(&self, pid: &str) -> Option<Arc<Relay>> {
        let (_, relay) = self.relays.remove(pid)?;
        info!(pid = %pid, "Relay unregistered");
        Some(relay)
    }

    /// Quit and remove every relay. Returns the failures, if any.
    pub fn quit_all(&self) -> Vec<(String, RelayError)> {
        let mut failures = Vec::new();
        for pid in self.process_ids() {
            if let Err(e) = self.quit(&pid) {
                warn!(pid = %pid, error = %e, "Relay quit failed");
                failures.push((pid, e));
            }
        }
        failures
    }

    /// Get the relay for a process.
    pub fn get(&self, pid: &str) -> Option<Arc<Relay>> {
        self.relays.get(pid).map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, pid: &str) -> bool {
        self.relays.contains_key(pid)
    }

    /// Process-ids of all registered relays.
    pub fn process_ids(&self) -> Vec<String> {
        self.relays.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    // The map guard is released before the relay runs, so engine callbacks
    // may re-enter the registry.
    fn relay_for(&self, pid: &str) -> RelayResult<Arc<Relay>> {
        self.get(pid)
            .ok_or_else(|| RelayError::UnknownProcess(pid.to_string()))
    }
}
