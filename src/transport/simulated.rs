//! In-process transport that pretends to be a paired WhatsApp session.
//!
//! Backs the bundled server, the demo client and the tests. It emits a pairing QR
//! on first connect, reports `Connected` after the pairing delay, accepts
//! offers and terminations, and records every operation it receives. Failures
//! can be injected per target, per call or for connects.

use super::{CallTransport, EventSender};
use crate::error::{TransportError, TransportOperation};
use crate::events::{CallEvent, CallEventKind, DisconnectReason, Event};
use crate::types::{generate_call_id, CallId, Jid};
use crate::Result;
use async_trait::async_trait;
use base64::Engine;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Operation recorded by [SimulatedTransport].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Offer {
        to: Jid,
        call_id: CallId,
        is_video: bool,
    },
    Reject {
        call_id: CallId,
        from: Jid,
    },
    Terminate {
        call_id: CallId,
    },
}

#[derive(Default)]
struct SimState {
    events: Option<EventSender>,
    active: HashSet<CallId>,
    operations: Vec<Operation>,
    failing_targets: HashSet<String>,
    failing_terminations: HashSet<CallId>,
}

/// Simulated call transport.
pub struct SimulatedTransport {
    pairing_delay: Duration,
    paired: Arc<AtomicBool>,
    fail_connect: AtomicBool,
    connects: AtomicU32,
    state: Mutex<SimState>,
}

impl SimulatedTransport {
    /// Unpaired transport: the first connect emits a QR and pairs after `pairing_delay`.
    pub fn new(pairing_delay: Duration) -> Self {
        Self {
            pairing_delay,
            paired: Arc::new(AtomicBool::new(false)),
            fail_connect: AtomicBool::new(false),
            connects: AtomicU32::new(0),
            state: Mutex::new(SimState::default()),
        }
    }

    /// Transport with an existing session: connects immediately, no QR.
    pub fn paired() -> Self {
        let transport = Self::new(Duration::ZERO);
        transport.paired.store(true, Ordering::SeqCst);
        transport
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make offers to `target` (phone number or JID user part) fail.
    pub fn fail_offers_to(&self, target: &str) {
        self.state().failing_targets.insert(target.to_string());
    }

    /// Make terminating `call_id` fail until [Self::clear_failures].
    pub fn fail_termination_of(&self, call_id: &str) {
        self.state()
            .failing_terminations
            .insert(call_id.to_string());
    }

    /// Make every subsequent connect attempt fail.
    pub fn set_connect_failure(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failing_targets.clear();
        state.failing_terminations.clear();
    }

    /// Every operation received so far, in order.
    pub fn operations(&self) -> Vec<Operation> {
        self.state().operations.clone()
    }

    /// Calls offered and not yet terminated, as the transport sees them.
    pub fn active_calls(&self) -> HashSet<CallId> {
        self.state().active.clone()
    }

    /// Number of connect attempts, failed ones included.
    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    fn emit(&self, event: Event) -> bool {
        match &self.state().events {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Drop the connection as the server would.
    pub fn simulate_disconnect(&self, reason: DisconnectReason) -> bool {
        if reason.is_logged_out() {
            self.paired.store(false, Ordering::SeqCst);
        }
        self.emit(Event::Disconnected { reason })
    }

    /// Deliver an inbound call event. Returns the call ID used.
    pub fn simulate_inbound(&self, kind: CallEventKind, from: Jid) -> CallId {
        let call_id = generate_call_id();
        let duration = (kind == CallEventKind::Ended).then_some(Duration::ZERO);
        self.emit(Event::Call(CallEvent {
            kind,
            call_id: call_id.clone(),
            from,
            duration,
        }));
        call_id
    }
}

/// Pairing payload in the `ref,noiseKey,identityKey,advSecret` layout the phone scans.
fn pairing_payload() -> String {
    let b64 = base64::engine::general_purpose::STANDARD;
    let reference = uuid::Uuid::new_v4().simple().to_string();
    let noise = b64.encode(rand::random::<[u8; 32]>());
    let identity = b64.encode(rand::random::<[u8; 32]>());
    let adv = b64.encode(rand::random::<[u8; 32]>());
    format!("2@{},{},{},{}", reference, noise, identity, adv)
}

#[async_trait]
impl CallTransport for SimulatedTransport {
    async fn connect(&self, events: EventSender) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::new(TransportOperation::Connect, "server unreachable").into());
        }
        self.state().events = Some(events.clone());
        let _ = events.send(Event::Connecting);
        if self.paired.load(Ordering::SeqCst) {
            let _ = events.send(Event::Connected);
            return Ok(());
        }
        let _ = events.send(Event::Qr {
            code: pairing_payload(),
        });
        let paired = Arc::clone(&self.paired);
        let delay = self.pairing_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            paired.store(true, Ordering::SeqCst);
            let _ = events.send(Event::Connected);
        });
        Ok(())
    }

    async fn offer_call(&self, to: &Jid, call_id: &CallId, is_video: bool) -> Result<()> {
        let mut state = self.state();
        if state.failing_targets.contains(&to.user) || state.failing_targets.contains(&to.to_string()) {
            return Err(TransportError::new(TransportOperation::Offer, format!("{} is unreachable", to))
                .with_call_id(call_id.clone())
                .into());
        }
        state.operations.push(Operation::Offer {
            to: to.clone(),
            call_id: call_id.clone(),
            is_video,
        });
        state.active.insert(call_id.clone());
        Ok(())
    }

    async fn reject_call(&self, call_id: &CallId, from: &Jid) -> Result<()> {
        self.state().operations.push(Operation::Reject {
            call_id: call_id.clone(),
            from: from.clone(),
        });
        Ok(())
    }

    async fn terminate_call(&self, call_id: &CallId) -> Result<()> {
        let mut state = self.state();
        if state.failing_terminations.contains(call_id) {
            return Err(TransportError::new(TransportOperation::Terminate, "terminate not acknowledged")
                .with_call_id(call_id.clone())
                .into());
        }
        state.operations.push(Operation::Terminate {
            call_id: call_id.clone(),
        });
        state.active.remove(call_id);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state().events = None;
        Ok(())
    }
}
