//! Relay core: lifecycle state machine and two-way packet forwarding.
//!
//! A [`Relay`] serves exactly one process for its whole life:
//!
//! ```text
//! Uninitialized --initialize--> Starting --engine ok--> Active --quit--> Quitting --> Quit
//!                                        \--engine err--> Failed
//! ```
//!
//! Identity and collaborators are written once before the relay becomes
//! `Active`; the transition is published under the gate mutex, so every
//! relay call that observes `Active` also observes them. Relay calls register
//! themselves as in-flight while forwarding, and `quit()` waits for them to
//! drain before it stops the engine. A call that arrives after `quit()` began
//! sees `Quitting` and returns `NotActive` without touching the engine.
//!
//! `quit()` may also run from inside an engine or transport callback. Calls
//! the quitting thread itself has in flight are excluded from the drain,
//! otherwise the wait could never finish.

use crate::engine::{EngineBinding, EngineHandle, OutboundSink};
use crate::transport::TransportDelegate;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};
use tracing::{debug, error, info, trace, warn};
use warpbridge_types::{
    CommandPacket, NoneSourcePolicy, ProcessIdentity, RelayConfig, RelayError, RelayResult,
    RepeatQuitPolicy, SpecialNid,
};

/// Lifecycle state of a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Created, identity not yet set.
    Uninitialized,
    /// `initialize` is running the engine's `start`.
    Starting,
    /// Routing packets.
    Active,
    /// `quit` is draining in-flight calls and stopping the engine.
    Quitting,
    /// Engine torn down. Terminal.
    Quit,
    /// Engine refused to start. Terminal; the relay must be discarded.
    Failed,
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayState::Uninitialized => write!(f, "uninitialized"),
            RelayState::Starting => write!(f, "starting"),
            RelayState::Active => write!(f, "active"),
            RelayState::Quitting => write!(f, "quitting"),
            RelayState::Quit => write!(f, "quit"),
            RelayState::Failed => write!(f, "failed"),
        }
    }
}

/// Forwarding counters snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Packets handed to the transport.
    pub outbound_forwarded: u64,
    /// Packets handed to the engine.
    pub inbound_forwarded: u64,
    /// Packets dropped in either direction.
    pub dropped: u64,
}

thread_local! {
    /// Relays with a call in flight on this thread, one entry per call.
    static HELD: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

struct Gate {
    state: RelayState,
    in_flight: usize,
}

/// Identity and collaborators, fixed at initialize.
struct Binding {
    identity: ProcessIdentity,
    engine: Arc<dyn EngineBinding>,
    transport: Arc<dyn TransportDelegate>,
}

/// The relay between one engine process and the host transport.
pub struct Relay {
    config: RelayConfig,
    gate: Mutex<Gate>,
    drained: Condvar,
    binding: OnceLock<Binding>,
    handle: OnceLock<EngineHandle>,
    outbound_forwarded: AtomicU64,
    inbound_forwarded: AtomicU64,
    dropped: AtomicU64,
}

/// Marks one relay call as in-flight until dropped.
struct InFlight<'a> {
    relay: &'a Relay,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let key = self.relay.key();
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|k| *k == key) {
                held.swap_remove(pos);
            }
        });
        let mut gate = self.relay.lock_gate();
        gate.in_flight -= 1;
        if gate.in_flight == 0 {
            self.relay.drained.notify_all();
        }
    }
}

impl Relay {
    /// Create an uninitialized relay.
    pub fn new(config: RelayConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            gate: Mutex::new(Gate {
                state: RelayState::Uninitialized,
                in_flight: 0,
            }),
            drained: Condvar::new(),
            binding: OnceLock::new(),
            handle: OnceLock::new(),
            outbound_forwarded: AtomicU64::new(0),
            inbound_forwarded: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    /// Fix the process identity, start the engine, and become `Active`.
    ///
    /// Valid only once, from `Uninitialized`. If the engine fails to start the
    /// relay moves to `Failed` and must be discarded.
    pub fn initialize(
        self: &Arc<Self>,
        identity: ProcessIdentity,
        engine: Arc<dyn EngineBinding>,
        transport: Arc<dyn TransportDelegate>,
    ) -> RelayResult<()> {
        {
            let mut gate = self.lock_gate();
            if gate.state != RelayState::Uninitialized {
                return Err(invalid_state(gate.state, "initialize"));
            }
            identity.validate()?;
            gate.state = RelayState::Starting;
        }

        let binding = self.binding.get_or_init(|| Binding {
            identity,
            engine,
            transport,
        });
        let identity = &binding.identity;

        match binding.engine.start(identity, OutboundSink::new(self)) {
            Ok(handle) => {
                let _ = self.handle.set(handle);
                self.lock_gate().state = RelayState::Active;
                info!(
                    pid = %identity.my_pid,
                    nid = %identity.my_nid,
                    master_nid = %identity.master_nid,
                    root_tid = identity.root_tid,
                    proc_addr = identity.proc_addr,
                    handle = %handle,
                    "Relay active"
                );
                Ok(())
            }
            Err(e) => {
                self.lock_gate().state = RelayState::Failed;
                error!(pid = %identity.my_pid, error = %e, "Engine failed to start");
                Err(RelayError::EngineStart(e.to_string()))
            }
        }
    }

    /// Stop the engine and move to `Quit`.
    ///
    /// Waits for in-flight relay calls on other threads to finish first, so
    /// none of them sees a stopped engine. When called from inside an engine
    /// or transport callback of this relay, the calling thread's own calls are
    /// not waited for; they return normally once the callback unwinds.
    pub fn quit(&self) -> RelayResult<()> {
        let own = self.held_by_current_thread();
        let mut gate = self.lock_gate();
        match gate.state {
            RelayState::Active => {}
            RelayState::Quit | RelayState::Quitting
                if self.config.repeat_quit == RepeatQuitPolicy::Ignore =>
            {
                debug!(state = %gate.state, "Ignoring repeated quit");
                return Ok(());
            }
            other => return Err(invalid_state(other, "quit")),
        }
        gate.state = RelayState::Quitting;
        if own > 0 {
            debug!(own, "Quit requested from inside a relay call");
        }
        while gate.in_flight > own {
            gate = self
                .drained
                .wait(gate)
                .unwrap_or_else(|e| e.into_inner());
        }
        drop(gate);

        if let Some(binding) = self.binding.get() {
            binding.engine.stop(&binding.identity.my_pid);
            info!(pid = %binding.identity.my_pid, "Relay quit");
        }
        self.lock_gate().state = RelayState::Quit;
        Ok(())
    }

    /// Forward a packet produced by the engine to the transport.
    ///
    /// The destination is not checked. The source must name this node, either
    /// literally or with `THIS`; `NONE` is handled per configuration.
    pub fn relay_outbound(&self, packet: CommandPacket) -> RelayResult<()> {
        let _guard = self.enter("outbound").map_err(|e| self.drop_packet(e))?;
        let binding = self.binding()?;
        let identity = &binding.identity;
        let src = packet.source_node();

        if SpecialNid::is_none(src) {
            match self.config.none_source_outbound {
                NoneSourcePolicy::Warn => {
                    warn!(
                        pid = %packet.process_id(),
                        dst_nid = %packet.destination_node(),
                        "Outbound packet with unknown source"
                    );
                }
                NoneSourcePolicy::Reject => {
                    warn!(
                        pid = %packet.process_id(),
                        "Rejected outbound packet with unknown source"
                    );
                    return Err(self.drop_packet(RelayError::NoneSourceOutbound));
                }
            }
        } else if !identity.is_own_node(src) {
            warn!(src_nid = %src, my_nid = %identity.my_nid, "Outbound packet with foreign source");
            return Err(self.drop_packet(RelayError::ForeignSource {
                source_nid: src.to_string(),
                my_nid: identity.my_nid.clone(),
            }));
        }

        trace!(packet = %packet, "Relaying outbound");
        binding.transport.send(packet);
        self.outbound_forwarded.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Forward a packet received from the transport into the engine.
    pub fn relay_inbound(&self, packet: CommandPacket) -> RelayResult<()> {
        let _guard = self.enter("inbound").map_err(|e| self.drop_packet(e))?;
        let binding = self.binding()?;
        let my_pid = &binding.identity.my_pid;

        if packet.process_id() != my_pid {
            warn!(
                expected = %my_pid,
                actual = %packet.process_id(),
                module = %packet.module(),
                "Inbound packet for another process"
            );
            return Err(self.drop_packet(RelayError::ProcessMismatch {
                expected: my_pid.clone(),
                actual: packet.process_id().to_string(),
            }));
        }

        trace!(packet = %packet, "Relaying inbound");
        match binding.engine.deliver(packet) {
            Ok(()) => {
                self.inbound_forwarded.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                warn!(pid = %my_pid, error = %e, "Engine rejected packet");
                Err(self.drop_packet(RelayError::EngineRejected(e.to_string())))
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RelayState {
        self.lock_gate().state
    }

    /// Identity fixed at initialize, if any.
    pub fn identity(&self) -> Option<&ProcessIdentity> {
        self.binding.get().map(|b| &b.identity)
    }

    /// Handle returned by the engine's `start`, if it succeeded.
    pub fn engine_handle(&self) -> Option<EngineHandle> {
        self.handle.get().copied()
    }

    /// Forwarding counters.
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            outbound_forwarded: self.outbound_forwarded.load(Ordering::Relaxed),
            inbound_forwarded: self.inbound_forwarded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn enter(&self, operation: &str) -> RelayResult<InFlight<'_>> {
        let mut gate = self.lock_gate();
        if gate.state != RelayState::Active {
            debug!(state = %gate.state, operation, "Relay not active, dropping packet");
            return Err(RelayError::NotActive {
                state: gate.state.to_string(),
                operation: operation.to_string(),
            });
        }
        gate.in_flight += 1;
        HELD.with(|held| held.borrow_mut().push(self.key()));
        Ok(InFlight { relay: self })
    }

    fn held_by_current_thread(&self) -> usize {
        let key = self.key();
        HELD.with(|held| held.borrow().iter().filter(|k| **k == key).count())
    }

    fn key(&self) -> usize {
        self as *const Relay as usize
    }

    fn binding(&self) -> RelayResult<&Binding> {
        self.binding.get().ok_or_else(|| RelayError::NotActive {
            state: RelayState::Uninitialized.to_string(),
            operation: "relay".to_string(),
        })
    }

    fn drop_packet(&self, err: RelayError) -> RelayError {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        err
    }

    fn lock_gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("state", &self.state())
            .field("pid", &self.identity().map(|i| i.my_pid.as_str()))
            .field("stats", &self.stats())
            .finish()
    }
}

fn invalid_state(current: RelayState, operation: &str) -> RelayError {
    RelayError::InvalidState {
        current: current.to_string(),
        operation: operation.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32};
    use std::sync::{mpsc, Weak};
    use std::time::Duration;
    use warpbridge_types::{EngineError, Module};

    #[derive(Default)]
    struct RecordingEngine {
        starts: AtomicU32,
        stops: AtomicU32,
        fail_start: bool,
        reject: AtomicBool,
        delivered: Mutex<Vec<CommandPacket>>,
    }

    impl EngineBinding for RecordingEngine {
        fn start(
            &self,
            _identity: &ProcessIdentity,
            _outbound: OutboundSink,
        ) -> Result<EngineHandle, EngineError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(EngineError::new("out of memory"));
            }
            Ok(EngineHandle(0xABC))
        }

        fn deliver(&self, packet: CommandPacket) -> Result<(), EngineError> {
            if self.reject.load(Ordering::SeqCst) {
                return Err(EngineError::new("shutting down"));
            }
            self.delivered.lock().unwrap().push(packet);
            Ok(())
        }

        fn stop(&self, _pid: &str) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<CommandPacket>>,
    }

    impl TransportDelegate for RecordingTransport {
        fn send(&self, packet: CommandPacket) {
            self.sent.lock().unwrap().push(packet);
        }
    }

    /// Transport that quits its relay from inside `send`.
    #[derive(Default)]
    struct QuittingTransport {
        relay: OnceLock<Weak<Relay>>,
        quit_result: Mutex<Option<RelayResult<()>>>,
    }

    impl TransportDelegate for QuittingTransport {
        fn send(&self, _packet: CommandPacket) {
            if let Some(relay) = self.relay.get().and_then(Weak::upgrade) {
                *self.quit_result.lock().unwrap() = Some(relay.quit());
            }
        }
    }

    fn identity() -> ProcessIdentity {
        ProcessIdentity::new("A", "proc1", 7, 0xABC, "A")
    }

    fn active_relay(
        config: RelayConfig,
    ) -> (Arc<Relay>, Arc<RecordingEngine>, Arc<RecordingTransport>) {
        let relay = Relay::new(config);
        let engine = Arc::new(RecordingEngine::default());
        let transport = Arc::new(RecordingTransport::default());
        relay
            .initialize(identity(), engine.clone(), transport.clone())
            .unwrap();
        (relay, engine, transport)
    }

    #[test]
    fn test_initialize_then_quit() {
        let (relay, engine, _) = active_relay(RelayConfig::default());
        assert_eq!(relay.state(), RelayState::Active);
        assert_eq!(relay.engine_handle(), Some(EngineHandle(0xABC)));
        assert_eq!(relay.identity().unwrap().my_pid, "proc1");

        relay.quit().unwrap();
        assert_eq!(relay.state(), RelayState::Quit);
        assert_eq!(engine.starts.load(Ordering::SeqCst), 1);
        assert_eq!(engine.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_initialize_twice_fails() {
        let (relay, engine, transport) = active_relay(RelayConfig::default());
        let result = relay.initialize(identity(), engine.clone(), transport);
        assert!(matches!(result, Err(RelayError::InvalidState { .. })));
        assert_eq!(engine.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_identity_keeps_uninitialized() {
        let relay = Relay::new(RelayConfig::default());
        let engine = Arc::new(RecordingEngine::default());
        let result = relay.initialize(
            ProcessIdentity::new("A", "", 7, 0xABC, "A"),
            engine.clone(),
            Arc::new(RecordingTransport::default()),
        );
        assert!(matches!(result, Err(RelayError::InvalidIdentity(_))));
        assert_eq!(relay.state(), RelayState::Uninitialized);
        assert_eq!(engine.starts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_engine_start_failure_is_terminal() {
        let relay = Relay::new(RelayConfig::default());
        let engine = Arc::new(RecordingEngine {
            fail_start: true,
            ..Default::default()
        });
        let transport = Arc::new(RecordingTransport::default());
        let result = relay.initialize(identity(), engine.clone(), transport.clone());
        assert!(matches!(result, Err(RelayError::EngineStart(_))));
        assert_eq!(relay.state(), RelayState::Failed);

        let retry = relay.initialize(identity(), engine.clone(), transport);
        assert!(matches!(retry, Err(RelayError::InvalidState { .. })));
        assert!(matches!(relay.quit(), Err(RelayError::InvalidState { .. })));
        assert_eq!(engine.stops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_outbound_before_initialize_is_not_active() {
        let relay = Relay::new(RelayConfig::default());
        let result = relay.relay_outbound(CommandPacket::new("proc1", "B", "A", 1, "{}"));
        assert!(matches!(result, Err(RelayError::NotActive { .. })));
        assert_eq!(relay.stats().dropped, 1);
    }

    #[test]
    fn test_outbound_after_quit_never_reaches_transport() {
        let (relay, _, transport) = active_relay(RelayConfig::default());
        relay.quit().unwrap();
        let result = relay.relay_outbound(CommandPacket::new("proc1", "B", "A", 1, "{}"));
        assert!(matches!(result, Err(RelayError::NotActive { .. })));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_outbound_forwards_unchanged() {
        let (relay, _, transport) = active_relay(RelayConfig::default());
        let packet = CommandPacket::new("p1", "n2", SpecialNid::THIS, 3, "{}");
        relay.relay_outbound(packet.clone()).unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.as_slice(), &[packet]);
        assert_eq!(relay.stats().outbound_forwarded, 1);
    }

    #[test]
    fn test_outbound_broadcast_destination_allowed() {
        let (relay, _, transport) = active_relay(RelayConfig::default());
        relay
            .relay_outbound(CommandPacket::new("proc1", SpecialNid::BROADCAST, "A", 4, "{}"))
            .unwrap();
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_outbound_foreign_source_rejected() {
        let (relay, _, transport) = active_relay(RelayConfig::default());
        let result = relay.relay_outbound(CommandPacket::new("proc1", "B", "C", 1, "{}"));
        assert!(matches!(result, Err(RelayError::ForeignSource { .. })));
        assert!(transport.sent.lock().unwrap().is_empty());
        assert_eq!(relay.state(), RelayState::Active);
    }

    #[test]
    fn test_outbound_none_source_policy() {
        let (relay, _, transport) = active_relay(RelayConfig::default());
        relay
            .relay_outbound(CommandPacket::new("proc1", "B", SpecialNid::NONE, 1, "{}"))
            .unwrap();
        assert_eq!(transport.sent.lock().unwrap().len(), 1);

        let strict = RelayConfig {
            none_source_outbound: NoneSourcePolicy::Reject,
            ..Default::default()
        };
        let (relay, _, transport) = active_relay(strict);
        let packet = CommandPacket::new("proc1", "B", SpecialNid::NONE, 1, "{}");
        let result = relay.relay_outbound(packet);
        assert_eq!(result, Err(RelayError::NoneSourceOutbound));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_inbound_process_mismatch() {
        let (relay, engine, _) = active_relay(RelayConfig::default());
        let result = relay.relay_inbound(CommandPacket::new("proc2", "A", "B", 1, "{}"));
        assert_eq!(
            result,
            Err(RelayError::ProcessMismatch {
                expected: "proc1".to_string(),
                actual: "proc2".to_string(),
            })
        );
        assert!(engine.delivered.lock().unwrap().is_empty());
        assert_eq!(relay.state(), RelayState::Active);
        assert_eq!(relay.stats().dropped, 1);
    }

    #[test]
    fn test_inbound_forwarded_unchanged() {
        let (relay, engine, _) = active_relay(RelayConfig::default());
        let packet = CommandPacket::new("proc1", "A", SpecialNid::NONE, Module::VM, "ping");
        relay.relay_inbound(packet.clone()).unwrap();
        assert_eq!(engine.delivered.lock().unwrap().as_slice(), &[packet]);
        assert_eq!(relay.stats().inbound_forwarded, 1);
    }

    #[test]
    fn test_inbound_engine_rejection_keeps_relay_active() {
        let (relay, engine, _) = active_relay(RelayConfig::default());
        engine.reject.store(true, Ordering::SeqCst);
        let result = relay.relay_inbound(CommandPacket::new("proc1", "A", "B", 1, "{}"));
        assert!(matches!(result, Err(RelayError::EngineRejected(_))));
        assert_eq!(relay.state(), RelayState::Active);
    }

    #[test]
    fn test_inbound_outside_active_window() {
        let relay = Relay::new(RelayConfig::default());
        let result = relay.relay_inbound(CommandPacket::new("proc1", "A", "B", 1, "{}"));
        assert!(matches!(result, Err(RelayError::NotActive { .. })));

        let (relay, engine, _) = active_relay(RelayConfig::default());
        relay.quit().unwrap();
        let result = relay.relay_inbound(CommandPacket::new("proc1", "A", "B", 1, "{}"));
        assert!(matches!(result, Err(RelayError::NotActive { .. })));
        assert!(engine.delivered.lock().unwrap().is_empty());
    }

    #[test]
    fn test_repeat_quit_fail_policy() {
        let (relay, engine, _) = active_relay(RelayConfig::default());
        relay.quit().unwrap();
        assert!(matches!(relay.quit(), Err(RelayError::InvalidState { .. })));
        assert_eq!(engine.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_repeat_quit_ignore_policy() {
        let config = RelayConfig {
            repeat_quit: RepeatQuitPolicy::Ignore,
            ..Default::default()
        };
        let (relay, engine, _) = active_relay(config);
        relay.quit().unwrap();
        relay.quit().unwrap();
        assert_eq!(engine.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_quit_from_transport_callback_completes() {
        let relay = Relay::new(RelayConfig::default());
        let engine = Arc::new(RecordingEngine::default());
        let transport = Arc::new(QuittingTransport::default());
        let _ = transport.relay.set(Arc::downgrade(&relay));
        relay
            .initialize(identity(), engine.clone(), transport.clone())
            .unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let worker = {
            let relay = relay.clone();
            std::thread::spawn(move || {
                let packet = CommandPacket::new("proc1", "B", "A", 1, "bye");
                let _ = done_tx.send(relay.relay_outbound(packet));
            })
        };
        let outbound = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("outbound call did not return");
        worker.join().unwrap();

        assert_eq!(outbound, Ok(()));
        assert_eq!(*transport.quit_result.lock().unwrap(), Some(Ok(())));
        assert_eq!(relay.state(), RelayState::Quit);
        assert_eq!(engine.stops.load(Ordering::SeqCst), 1);

        let late = relay.relay_outbound(CommandPacket::new("proc1", "B", "A", 1, "{}"));
        assert!(matches!(late, Err(RelayError::NotActive { .. })));
    }

    #[test]
    fn test_quit_before_initialize_fails() {
        let relay = Relay::new(RelayConfig::default());
        assert!(matches!(relay.quit(), Err(RelayError::InvalidState { .. })));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(RelayState::Active.to_string(), "active");
        assert_eq!(RelayState::Quit.to_string(), "quit");
    }
}
