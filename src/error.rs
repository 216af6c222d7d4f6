use thiserror::Error;

/// Library result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when placing or managing calls.
#[derive(Error, Debug)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(#[from] ValidationError),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("connection: {0}")]
    Connection(#[from] ConnectionError),

    #[error("not connected to WhatsApp")]
    NotConnected,

    #[error("qr rendering: {0}")]
    Qr(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Call identifier the failure refers to, when one is known.
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Self::Transport(e) => e.call_id.as_deref(),
            _ => None,
        }
    }
}

/// Request rejected before reaching the transport. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("target is required")]
    MissingTarget,

    #[error("call id is required")]
    MissingCallId,

    #[error("caller address is required")]
    MissingCaller,

    #[error("invalid target {0:?}")]
    InvalidTarget(String),
}

/// The transport rejected or failed an operation.
#[derive(Error, Debug, Clone)]
#[error("{operation} failed: {message}")]
pub struct TransportError {
    pub operation: TransportOperation,
    pub call_id: Option<String>,
    pub message: String,
}

impl TransportError {
    pub fn new(operation: TransportOperation, message: impl Into<String>) -> Self {
        Self {
            operation,
            call_id: None,
            message: message.into(),
        }
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }
}

/// Transport operation that produced a [TransportError].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportOperation {
    Connect,
    Offer,
    Reject,
    Terminate,
    Disconnect,
}

impl std::fmt::Display for TransportOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Offer => "offer",
            Self::Reject => "reject",
            Self::Terminate => "terminate",
            Self::Disconnect => "disconnect",
        };
        f.write_str(name)
    }
}

/// Connection-related errors.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("timeout waiting for connection")]
    Timeout,

    #[error("already shut down")]
    ShutDown,

    #[error("gave up reconnecting after {0} attempts")]
    RetriesExhausted(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_carries_call_id() {
        let err: Error = TransportError::new(TransportOperation::Terminate, "peer gone")
            .with_call_id("ABC")
            .into();
        assert_eq!(err.call_id(), Some("ABC"));
        assert_eq!(err.to_string(), "transport: terminate failed: peer gone");
    }

    #[test]
    fn validation_error_display() {
        let err: Error = ValidationError::MissingTarget.into();
        assert_eq!(err.to_string(), "validation: target is required");
        assert!(err.call_id().is_none());
    }
}
