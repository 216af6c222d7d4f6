//! Transport abstraction for the call-signaling layer.
//!
//! Implement this trait to plug in a WhatsApp Web client. Pairing, encryption
//! and call signaling all live behind it; this crate only drives it. Status
//! changes and inbound calls are pushed through the [EventSender] handed to
//! [CallTransport::connect].

use crate::events::Event;
use crate::types::{CallId, Jid};
use crate::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Channel the transport uses to report [Event]s.
pub type EventSender = mpsc::UnboundedSender<Event>;

/// Async trait for a call transport.
#[async_trait]
pub trait CallTransport: Send + Sync {
    /// Open (or reopen) the session. Progress is reported through `events`.
    async fn connect(&self, events: EventSender) -> Result<()>;

    /// Offer a call to `to` under the given call ID.
    async fn offer_call(&self, to: &Jid, call_id: &CallId, is_video: bool) -> Result<()>;

    /// Reject an inbound call from `from`.
    async fn reject_call(&self, call_id: &CallId, from: &Jid) -> Result<()>;

    /// Terminate a call. Whether terminating an unknown call is an error is up to the transport.
    async fn terminate_call(&self, call_id: &CallId) -> Result<()>;

    /// Close the session without logging out.
    async fn disconnect(&self) -> Result<()>;
}

pub mod simulated;

pub use simulated::SimulatedTransport;
