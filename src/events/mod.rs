//! Event types emitted by a [CallTransport](crate::CallTransport).

use crate::types::{CallId, Jid};
use serde::Serialize;
use std::time::Duration;

/// Events a transport pushes to the [ConnectionManager](crate::ConnectionManager).
#[derive(Clone, Debug)]
pub enum Event {
    /// Pairing payload to render as a QR code. Rotates while unpaired.
    Qr { code: String },

    /// Handshake with the servers started.
    Connecting,

    /// Session open and authenticated.
    Connected,

    /// Connection closed.
    Disconnected { reason: DisconnectReason },

    /// Inbound call signaling.
    Call(CallEvent),
}

/// Why a connection was closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Logged out from the phone; the session is gone and reconnecting is pointless.
    LoggedOut,
    /// Another client connected with the same session.
    StreamReplaced,
    /// Network or server side close.
    ConnectionLost(String),
    /// Server asked the client to restart the stream.
    RestartRequired,
}

impl DisconnectReason {
    pub fn is_logged_out(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoggedOut => write!(f, "logged out"),
            Self::StreamReplaced => write!(f, "stream replaced"),
            Self::ConnectionLost(msg) => write!(f, "connection lost: {}", msg),
            Self::RestartRequired => write!(f, "restart required"),
        }
    }
}

/// Inbound call notification.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    #[serde(rename = "type")]
    pub kind: CallEventKind,
    pub call_id: CallId,
    pub from: Jid,
    /// Set for [CallEventKind::Ended].
    #[serde(
        rename = "duration",
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_secs"
    )]
    pub duration: Option<Duration>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CallEventKind {
    #[serde(rename = "call.incoming")]
    Incoming,
    #[serde(rename = "call.accepted")]
    Accepted,
    #[serde(rename = "call.rejected")]
    Rejected,
    #[serde(rename = "call.ended")]
    Ended,
    #[serde(rename = "call.missed")]
    Missed,
}

impl CallEventKind {
    /// Wire name, also used as the server-sent event name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "call.incoming",
            Self::Accepted => "call.accepted",
            Self::Rejected => "call.rejected",
            Self::Ended => "call.ended",
            Self::Missed => "call.missed",
        }
    }
}

fn serialize_secs<S>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match d {
        Some(d) => s.serialize_u64(d.as_secs()),
        None => s.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ended_event_serializes_duration_in_seconds() {
        let evt = CallEvent {
            kind: CallEventKind::Ended,
            call_id: "C1".into(),
            from: Jid::from_phone("5511"),
            duration: Some(Duration::from_millis(42_500)),
        };
        let v = serde_json::to_value(&evt).unwrap();
        assert_eq!(v["type"], "call.ended");
        assert_eq!(v["callId"], "C1");
        assert_eq!(v["from"], "5511@s.whatsapp.net");
        assert_eq!(v["duration"], 42);
        assert_eq!(CallEventKind::Ended.as_str(), "call.ended");
    }

    #[test]
    fn only_logout_stops_reconnecting() {
        assert!(DisconnectReason::LoggedOut.is_logged_out());
        assert!(!DisconnectReason::StreamReplaced.is_logged_out());
        assert!(!DisconnectReason::ConnectionLost("eof".into()).is_logged_out());
    }
}
