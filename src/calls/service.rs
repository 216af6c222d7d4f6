//! Validated call operations against the connected transport.

use super::registry::CallRecord;
use crate::connection::ConnectionManager;
use crate::error::{Error, TransportError, TransportOperation, ValidationError};
use crate::types::{generate_call_id, CallId, CallMedia, Jid};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Response for an accepted call offer.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOffer {
    pub success: bool,
    pub call_id: CallId,
    pub to: Jid,
    #[serde(rename = "type")]
    pub media: CallMedia,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallAction {
    Rejected,
    Terminated,
}

/// Acknowledgment for a reject or terminate.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAck {
    pub success: bool,
    pub call_id: CallId,
    pub action: CallAction,
    pub timestamp: DateTime<Utc>,
}

impl CallAck {
    fn new(call_id: &str, action: CallAction) -> Self {
        Self {
            success: true,
            call_id: call_id.to_string(),
            action,
            timestamp: Utc::now(),
        }
    }
}

/// Call history. No store backs it, so `calls` is always empty.
#[derive(Clone, Debug, Serialize)]
pub struct CallHistory {
    pub success: bool,
    pub message: String,
    pub calls: Vec<CallRecord>,
}

/// Offers, rejects and terminates calls through the connection's transport.
pub struct CallService {
    connection: Arc<ConnectionManager>,
}

impl CallService {
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Offer a call to `target` (phone number or JID) under a fresh call ID.
    pub async fn make_call(&self, target: &str, is_video: bool) -> Result<CallOffer> {
        let to = Jid::from_target(target)?;
        let transport = self.connection.transport()?;
        let call_id = generate_call_id();
        transport
            .offer_call(&to, &call_id, is_video)
            .await
            .map_err(|e| transport_failure(e, TransportOperation::Offer, &call_id))?;
        let media = CallMedia::from_video_flag(is_video);
        info!(%call_id, %to, ?media, "call offered");
        Ok(CallOffer {
            success: true,
            call_id,
            to,
            media,
            timestamp: Utc::now(),
        })
    }

    /// Reject an inbound call.
    pub async fn reject_call(&self, call_id: &str, from: &str) -> Result<CallAck> {
        let call_id = required_call_id(call_id)?;
        if from.trim().is_empty() {
            return Err(ValidationError::MissingCaller.into());
        }
        let from = Jid::from_target(from)?;
        let transport = self.connection.transport()?;
        transport
            .reject_call(&call_id, &from)
            .await
            .map_err(|e| transport_failure(e, TransportOperation::Reject, &call_id))?;
        info!(%call_id, %from, "call rejected");
        Ok(CallAck::new(&call_id, CallAction::Rejected))
    }

    /// Terminate a call, known or not; the transport decides whether that is an error.
    pub async fn terminate_call(&self, call_id: &str) -> Result<CallAck> {
        let call_id = required_call_id(call_id)?;
        let transport = self.connection.transport()?;
        transport
            .terminate_call(&call_id)
            .await
            .map_err(|e| transport_failure(e, TransportOperation::Terminate, &call_id))?;
        info!(%call_id, "call terminated");
        Ok(CallAck::new(&call_id, CallAction::Terminated))
    }

    pub fn history(&self) -> Result<CallHistory> {
        self.connection.transport()?;
        Ok(CallHistory {
            success: true,
            message: "call history is not recorded".to_string(),
            calls: Vec::new(),
        })
    }
}

fn required_call_id(call_id: &str) -> Result<CallId> {
    let call_id = call_id.trim();
    if call_id.is_empty() {
        return Err(ValidationError::MissingCallId.into());
    }
    Ok(call_id.to_string())
}

/// Normalise whatever the transport returned into a [TransportError] tagged with the call ID.
fn transport_failure(err: Error, operation: TransportOperation, call_id: &str) -> Error {
    error!(%operation, %call_id, error = %err, "transport operation failed");
    match err {
        Error::Transport(e) if e.call_id.is_some() => Error::Transport(e),
        Error::Transport(e) => Error::Transport(e.with_call_id(call_id)),
        Error::NotConnected => Error::NotConnected,
        other => TransportError::new(operation, other.to_string())
            .with_call_id(call_id)
            .into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ReconnectPolicy;
    use crate::transport::simulated::{Operation, SimulatedTransport};
    use std::time::Duration;

    async fn service() -> (Arc<SimulatedTransport>, CallService) {
        let transport = Arc::new(SimulatedTransport::paired());
        let conn = Arc::new(ConnectionManager::new(transport.clone(), ReconnectPolicy::default()));
        conn.init().await.unwrap();
        conn.wait_until_connected(Duration::from_secs(1))
            .await
            .unwrap();
        (transport, CallService::new(conn))
    }

    #[tokio::test]
    async fn make_call_formats_target_and_offers() {
        let (transport, service) = service().await;
        let offer = service.make_call("5511999999999", true).await.unwrap();
        assert_eq!(offer.to.to_string(), "5511999999999@s.whatsapp.net");
        assert_eq!(offer.media, CallMedia::Video);
        assert_eq!(
            transport.operations(),
            vec![Operation::Offer {
                to: offer.to.clone(),
                call_id: offer.call_id.clone(),
                is_video: true,
            }]
        );

        let v = serde_json::to_value(&offer).unwrap();
        assert_eq!(v["type"], "video");
        assert_eq!(v["success"], true);
    }

    #[tokio::test]
    async fn validation_happens_before_transport() {
        let (transport, service) = service().await;
        assert!(matches!(
            service.make_call("", false).await,
            Err(Error::Validation(ValidationError::MissingTarget))
        ));
        assert!(matches!(
            service.terminate_call("  ").await,
            Err(Error::Validation(ValidationError::MissingCallId))
        ));
        assert!(matches!(
            service.reject_call("ID", "").await,
            Err(Error::Validation(ValidationError::MissingCaller))
        ));
        assert!(transport.operations().is_empty());
    }

    #[tokio::test]
    async fn not_connected_before_init() {
        let conn = Arc::new(ConnectionManager::new(
            Arc::new(SimulatedTransport::paired()),
            ReconnectPolicy::default(),
        ));
        let service = CallService::new(conn);
        assert!(matches!(service.make_call("1", false).await, Err(Error::NotConnected)));
        assert!(matches!(service.history(), Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn transport_failure_keeps_message_and_call_id() {
        let (transport, service) = service().await;
        transport.fail_termination_of("ABC");
        let err = service.terminate_call("ABC").await.unwrap_err();
        assert_eq!(err.call_id(), Some("ABC"));
        assert!(err.to_string().contains("terminate not acknowledged"));
    }

    #[tokio::test]
    async fn reject_and_history() {
        let (transport, service) = service().await;
        let ack = service.reject_call("ID1", "5511888888888").await.unwrap();
        assert_eq!(ack.action, CallAction::Rejected);
        assert_eq!(
            transport.operations(),
            vec![Operation::Reject {
                call_id: "ID1".into(),
                from: Jid::from_phone("5511888888888"),
            }]
        );
        assert!(service.history().unwrap().calls.is_empty());
    }
}
