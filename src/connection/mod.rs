//! Connection ownership: drives a [CallTransport], tracks the connection
//! state and pending pairing QR, and reconnects with bounded backoff.

use crate::error::{ConnectionError, Error};
use crate::events::{CallEvent, Event};
use crate::transport::{CallTransport, EventSender};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Inbound call events buffered per subscriber before it starts lagging.
const CALL_EVENT_CAPACITY: usize = 64;

/// Connection state as reported to API callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionState {
    Disconnected,
    QrPending,
    Connecting,
    Reconnecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::QrPending => "qr-pending",
            Self::Connecting => "connecting",
            Self::Reconnecting => "reconnecting",
            Self::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Snapshot returned by `GET /api/status`.
#[derive(Clone, Debug, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub state: ConnectionState,
    pub timestamp: DateTime<Utc>,
}

/// Backoff schedule for reconnecting after a non-logout disconnect.
#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    /// Consecutive failed attempts before giving up.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Delay before attempt number `attempt` (0-based): `base * 2^attempt`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Owns the transport session. Create once, [init](Self::init) it, and
/// [shutdown](Self::shutdown) it when done; the event loop holds a reference
/// to the manager until then.
pub struct ConnectionManager {
    transport: Arc<dyn CallTransport>,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ConnectionState>,
    qr: RwLock<Option<String>>,
    calls_tx: broadcast::Sender<CallEvent>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn CallTransport>, policy: ReconnectPolicy) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (calls_tx, _) = broadcast::channel(CALL_EVENT_CAPACITY);
        Self {
            transport,
            policy,
            state_tx,
            qr: RwLock::new(None),
            calls_tx,
            event_loop: Mutex::new(None),
        }
    }

    /// Connect the transport and start processing its events. Calling it
    /// again while the event loop runs is a no-op; after a logout or once
    /// reconnecting has given up, it starts a fresh session.
    pub async fn init(self: &Arc<Self>) -> Result<()> {
        let mut event_loop = self.event_loop.lock().await;
        let running = event_loop.as_ref().is_some_and(|h| !h.is_finished());
        if running && self.state() != ConnectionState::Disconnected {
            debug!("connection already initialised");
            return Ok(());
        }
        // A loop that just gave up may not have been reaped yet.
        if let Some(stale) = event_loop.take() {
            stale.abort();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.set_state(ConnectionState::Connecting);
        info!("connecting to WhatsApp");
        if let Err(e) = self.transport.connect(tx.clone()).await {
            self.set_state(ConnectionState::Disconnected);
            return Err(e);
        }
        *event_loop = Some(tokio::spawn(Arc::clone(self).run(tx, rx)));
        Ok(())
    }

    /// Stop the event loop and close the transport session.
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(handle) = self.event_loop.lock().await.take() {
            handle.abort();
        }
        let result = self.transport.disconnect().await;
        self.set_qr(None);
        self.set_state(ConnectionState::Disconnected);
        info!("connection shut down");
        result
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn status(&self) -> ConnectionStatus {
        let state = self.state();
        ConnectionStatus {
            connected: state == ConnectionState::Connected,
            state,
            timestamp: Utc::now(),
        }
    }

    /// Pairing payload waiting to be scanned, if any.
    pub fn qr(&self) -> Option<String> {
        self.qr
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The transport, if the session is connected.
    pub fn transport(&self) -> Result<Arc<dyn CallTransport>> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        Ok(Arc::clone(&self.transport))
    }

    /// Receive inbound call events from now on.
    pub fn subscribe_calls(&self) -> broadcast::Receiver<CallEvent> {
        self.calls_tx.subscribe()
    }

    /// Wait until the state equals `wanted`, for at most `timeout`.
    pub async fn wait_for_state(&self, wanted: ConnectionState, timeout: Duration) -> Result<()> {
        let mut rx = self.state_tx.subscribe();
        let result = match tokio::time::timeout(timeout, rx.wait_for(|s| *s == wanted)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(ConnectionError::ShutDown.into()),
            Err(_) => Err(ConnectionError::Timeout.into()),
        };
        result
    }

    pub async fn wait_until_connected(&self, timeout: Duration) -> Result<()> {
        self.wait_for_state(ConnectionState::Connected, timeout)
            .await
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "connection state changed");
        }
    }

    fn set_qr(&self, code: Option<String>) {
        *self.qr.write().unwrap_or_else(PoisonError::into_inner) = code;
    }

    /// Event loop. Returns after a logout or once reconnecting has given up,
    /// which lets [init](Self::init) start over.
    async fn run(self: Arc<Self>, tx: EventSender, mut rx: mpsc::UnboundedReceiver<Event>) {
        let mut attempts = 0u32;
        let mut retry_at: Option<Instant> = None;
        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { return };
                    match event {
                        Event::Qr { code } => {
                            info!("pairing QR code available");
                            self.set_qr(Some(code));
                            self.set_state(ConnectionState::QrPending);
                        }
                        Event::Connecting => self.set_state(ConnectionState::Connecting),
                        Event::Connected => {
                            attempts = 0;
                            retry_at = None;
                            self.set_qr(None);
                            self.set_state(ConnectionState::Connected);
                            info!("connected to WhatsApp");
                        }
                        Event::Disconnected { reason } => {
                            if reason.is_logged_out() {
                                warn!(%reason, "session logged out, not reconnecting");
                                self.set_qr(None);
                                self.set_state(ConnectionState::Disconnected);
                                return;
                            }
                            if retry_at.is_some() {
                                debug!(%reason, "reconnect already scheduled");
                                continue;
                            }
                            warn!(%reason, "connection closed, reconnecting");
                            self.set_state(ConnectionState::Reconnecting);
                            match self.next_retry(&mut attempts) {
                                ControlFlow::Continue(at) => retry_at = Some(at),
                                ControlFlow::Break(()) => return,
                            }
                        }
                        Event::Call(call) => {
                            info!(kind = ?call.kind, call_id = %call.call_id, from = %call.from, "inbound call event");
                            // No subscribers is fine.
                            let _ = self.calls_tx.send(call);
                        }
                    }
                }
                _ = tokio::time::sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    retry_at = None;
                    if let Err(e) = self.transport.connect(tx.clone()).await {
                        warn!(attempt = attempts, error = %e, "reconnect failed");
                        match self.next_retry(&mut attempts) {
                            ControlFlow::Continue(at) => retry_at = Some(at),
                            ControlFlow::Break(()) => return,
                        }
                    }
                }
            }
        }
    }

    /// Deadline for the next reconnect attempt, or `Break` once the policy is used up.
    fn next_retry(&self, attempts: &mut u32) -> ControlFlow<(), Instant> {
        if *attempts >= self.policy.max_attempts {
            let err = ConnectionError::RetriesExhausted(*attempts);
            error!(error = %err, "giving up on the connection");
            self.set_state(ConnectionState::Disconnected);
            return ControlFlow::Break(());
        }
        let delay = self.policy.delay_for(*attempts);
        *attempts += 1;
        debug!(attempt = *attempts, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        ControlFlow::Continue(Instant::now() + delay)
    }
}
