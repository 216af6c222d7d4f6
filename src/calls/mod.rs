//! Call lifecycle: the registry of active calls, the service that talks to
//! the transport, and the controller that ties them together with
//! auto-termination and batch pacing.
//!
//! A call moves through [CallPhase]s: it is `Requested` while the offer is in
//! flight, `Active` once registered, `Terminating` while a terminate is in
//! flight, and `Terminated` once acknowledged and removed from the registry.

mod controller;
mod registry;
mod service;

pub use controller::{
    BatchOptions, BatchOutcome, CallController, CallOptions, TerminateOutcome, Termination,
    DEFAULT_AUTO_TERMINATE, DEFAULT_BATCH_INTERVAL,
};
pub use registry::{CallPhase, CallRecord, CallRegistry};
pub use service::{CallAck, CallAction, CallHistory, CallOffer, CallService};
