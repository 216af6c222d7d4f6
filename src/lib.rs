//! # whatsapp-call-api
//!
//! HTTP API for placing, rejecting and terminating WhatsApp Web calls.
//!
//! The call signaling itself is done by a [CallTransport] implementation; this
//! crate owns the connection state around it, validates and shapes requests,
//! and tracks active calls.
//!
//! ## Features
//!
//! - Connection status and pairing QR code (PNG data URL)
//! - Audio and video call offers, reject and terminate
//! - Active call tracking with timed auto-termination
//! - Scheduled calls and paced batch calls
//! - Bounded reconnect with exponential backoff
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use whatsapp_call_api::{
//!     CallController, CallOptions, CallService, ConnectionManager, ReconnectPolicy,
//!     SimulatedTransport,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let transport = Arc::new(SimulatedTransport::paired());
//!     let connection = Arc::new(ConnectionManager::new(transport, ReconnectPolicy::default()));
//!     connection.init().await?;
//!     connection.wait_until_connected(Duration::from_secs(30)).await?;
//!
//!     let controller = CallController::new(Arc::new(CallService::new(connection)));
//!     let call = controller
//!         .initiate_call("5511999999999", CallOptions::audio())
//!         .await?;
//!     controller.terminate_call(&call.call_id).await?;
//!     Ok(())
//! }
//! ```

pub mod calls;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod http;
pub mod qr;
pub mod transport;
pub mod types;

pub use calls::{
    BatchOptions, BatchOutcome, CallAck, CallController, CallOffer, CallOptions, CallRecord,
    CallRegistry, CallService, Termination,
};
pub use config::Config;
pub use connection::{ConnectionManager, ConnectionState, ConnectionStatus, ReconnectPolicy};
pub use error::{Error, Result};
pub use events::{CallEvent, CallEventKind, Event};
pub use transport::{CallTransport, SimulatedTransport};
pub use types::{CallId, CallMedia, Jid};
