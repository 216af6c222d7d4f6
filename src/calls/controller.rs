//! Call lifecycle controller.

use super::registry::{CallPhase, CallRecord, CallRegistry};
use super::service::{CallAck, CallOffer, CallService};
use crate::error::{ConnectionError, Error, ValidationError};
use crate::types::CallId;
use crate::Result;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Auto-termination delay used by [CallOptions::default].
pub const DEFAULT_AUTO_TERMINATE: Duration = Duration::from_secs(30);

/// Pause between batch calls used by [BatchOptions::default].
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(2);

/// Options for starting a call.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Whether this is a video call.
    pub video: bool,
    /// Terminate the call this long after it was accepted. `None` or zero disables it.
    pub auto_terminate_after: Option<Duration>,
}

impl CallOptions {
    pub fn audio() -> Self {
        Self::default()
    }

    pub fn video() -> Self {
        Self {
            video: true,
            ..Default::default()
        }
    }

    pub fn auto_terminate_after(mut self, after: Duration) -> Self {
        self.auto_terminate_after = Some(after);
        self
    }

    pub fn without_auto_terminate(mut self) -> Self {
        self.auto_terminate_after = None;
        self
    }
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            video: false,
            auto_terminate_after: Some(DEFAULT_AUTO_TERMINATE),
        }
    }
}

/// Options for [CallController::batch_call].
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub call: CallOptions,
    /// Wait between consecutive targets. Not applied after the last one.
    pub interval: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            call: CallOptions::default(),
            interval: DEFAULT_BATCH_INTERVAL,
        }
    }
}

/// Result for one target of a batch.
#[derive(Clone, Debug, Serialize)]
pub struct BatchOutcome {
    pub target: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<CallOffer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Acknowledged termination.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Termination {
    #[serde(flatten)]
    pub ack: CallAck,
    /// How long the call was tracked. `None` if it was not in the registry.
    #[serde(
        rename = "durationMs",
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_millis"
    )]
    pub duration: Option<Duration>,
}

/// Result for one call of [CallController::terminate_all].
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateOutcome {
    pub call_id: CallId,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Termination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn serialize_millis<S: Serializer>(d: &Option<Duration>, s: S) -> std::result::Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_u64(d.as_millis() as u64),
        None => s.serialize_none(),
    }
}

/// Tracks active calls, terminates them on a timer, and paces batches.
///
/// Cheap to clone; clones share the registry and the timer table.
#[derive(Clone)]
pub struct CallController {
    service: Arc<CallService>,
    registry: Arc<CallRegistry>,
    timers: Arc<Mutex<HashMap<CallId, JoinHandle<()>>>>,
}

impl CallController {
    pub fn new(service: Arc<CallService>) -> Self {
        Self {
            service,
            registry: Arc::new(CallRegistry::new()),
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn service(&self) -> &Arc<CallService> {
        &self.service
    }

    pub fn registry(&self) -> &CallRegistry {
        &self.registry
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<CallId, JoinHandle<()>>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer a call, register it, and arm its auto-terminate timer.
    pub async fn initiate_call(&self, target: &str, options: CallOptions) -> Result<CallOffer> {
        if target.trim().is_empty() {
            return Err(ValidationError::MissingTarget.into());
        }
        debug!(target, phase = ?CallPhase::Requested, video = options.video, "requesting call");
        let offer = self.service.make_call(target, options.video).await?;
        self.registry.put(CallRecord::from_offer(&offer));
        info!(call_id = %offer.call_id, to = %offer.to, phase = ?CallPhase::Active, "call started");

        if let Some(after) = options.auto_terminate_after.filter(|d| !d.is_zero()) {
            self.arm_auto_terminate(offer.call_id.clone(), after);
        }
        Ok(offer)
    }

    fn arm_auto_terminate(&self, call_id: CallId, after: Duration) {
        let controller = self.clone();
        let id = call_id.clone();
        // Held across spawn + insert so the task cannot look itself up before it is stored.
        let mut timers = self.timers();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            controller.timers().remove(&id);
            debug!(call_id = %id, "auto-terminate timer fired");
            if let Err(e) = controller.terminate_call(&id).await {
                warn!(call_id = %id, error = %e, "auto-terminate failed");
            }
        });
        if let Some(previous) = timers.insert(call_id, handle) {
            previous.abort();
        }
    }

    fn disarm_auto_terminate(&self, call_id: &str) {
        if let Some(handle) = self.timers().remove(call_id) {
            handle.abort();
            debug!(call_id, "auto-terminate timer cancelled");
        }
    }

    /// Terminate a call. Untracked IDs are forwarded to the transport as-is;
    /// on failure the registry entry is kept so the terminate can be retried.
    pub async fn terminate_call(&self, call_id: &str) -> Result<Termination> {
        if call_id.trim().is_empty() {
            return Err(ValidationError::MissingCallId.into());
        }
        let tracked = self.registry.set_phase(call_id, CallPhase::Terminating);
        let ack = match self.service.terminate_call(call_id).await {
            Ok(ack) => ack,
            Err(e) => {
                if tracked {
                    self.registry.set_phase(call_id, CallPhase::Active);
                }
                return Err(e);
            }
        };

        self.disarm_auto_terminate(call_id);
        let duration = self
            .registry
            .remove(call_id)
            .map(|record| record.start_time.elapsed());
        match duration {
            Some(d) => info!(
                call_id,
                phase = ?CallPhase::Terminated,
                duration_ms = d.as_millis() as u64,
                "call ended"
            ),
            None => debug!(call_id, "terminate forwarded for untracked call"),
        }
        Ok(Termination { ack, duration })
    }

    /// Wait `delay`, then [initiate_call](Self::initiate_call).
    pub async fn schedule_call(
        &self,
        target: &str,
        delay: Duration,
        options: CallOptions,
    ) -> Result<CallOffer> {
        info!(target, delay_ms = delay.as_millis() as u64, "call scheduled");
        tokio::time::sleep(delay).await;
        self.initiate_call(target, options).await
    }

    /// Call each target in order, one at a time, pausing `interval` between
    /// attempts. A failed target never stops the batch.
    pub async fn batch_call<S: AsRef<str>>(
        &self,
        targets: &[S],
        options: BatchOptions,
    ) -> Vec<BatchOutcome> {
        let mut results = Vec::with_capacity(targets.len());
        for (i, target) in targets.iter().enumerate() {
            let target = target.as_ref();
            let outcome = match self.initiate_call(target, options.call.clone()).await {
                Ok(offer) => {
                    info!(target, call_id = %offer.call_id, "batch call started");
                    BatchOutcome {
                        target: target.to_string(),
                        success: true,
                        data: Some(offer),
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(target, error = %e, "batch call failed");
                    BatchOutcome {
                        target: target.to_string(),
                        success: false,
                        data: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(outcome);

            if i + 1 < targets.len() && !options.interval.is_zero() {
                tokio::time::sleep(options.interval).await;
            }
        }
        results
    }

    /// Terminate every tracked call concurrently and report each outcome.
    pub async fn terminate_all(&self) -> Vec<TerminateOutcome> {
        let ids = self.registry.ids();
        info!(count = ids.len(), "terminating all calls");
        let terminations = ids.into_iter().map(|call_id| async move {
            let result = self.terminate_call(&call_id).await;
            (call_id, result)
        });
        futures::future::join_all(terminations)
            .await
            .into_iter()
            .map(|(call_id, result)| match result {
                Ok(termination) => TerminateOutcome {
                    call_id,
                    success: true,
                    data: Some(termination),
                    error: None,
                },
                Err(e) => TerminateOutcome {
                    call_id,
                    success: false,
                    data: None,
                    error: Some(e.to_string()),
                },
            })
            .collect()
    }

    pub fn active_calls(&self) -> Vec<CallRecord> {
        self.registry.list_active()
    }

    /// Check the connection status up to `max_attempts` times (at least
    /// once), `poll_interval` apart. No wait follows the last check.
    pub async fn wait_for_connection(&self, max_attempts: u32, poll_interval: Duration) -> Result<()> {
        let connection = self.service.connection();
        let checks = max_attempts.max(1);
        for attempt in 1..=checks {
            if connection.is_connected() {
                info!("WhatsApp connected");
                return Ok(());
            }
            debug!(attempt, max_attempts = checks, state = %connection.state(), "waiting for connection");
            if attempt < checks {
                tokio::time::sleep(poll_interval).await;
            }
        }
        Err(Error::Connection(ConnectionError::Timeout))
    }

    /// Cancel every pending auto-terminate timer. Tracked calls stay tracked.
    pub fn shutdown(&self) {
        let mut timers = self.timers();
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::CallAction;
    use crate::connection::{ConnectionManager, ReconnectPolicy};
    use crate::transport::simulated::{Operation, SimulatedTransport};
    use tokio_test::assert_ok;

    async fn controller() -> (Arc<SimulatedTransport>, CallController) {
        let transport = Arc::new(SimulatedTransport::paired());
        let conn = Arc::new(ConnectionManager::new(transport.clone(), ReconnectPolicy::default()));
        conn.init().await.unwrap();
        conn.wait_until_connected(Duration::from_secs(1))
            .await
            .unwrap();
        (transport, CallController::new(Arc::new(CallService::new(conn))))
    }

    #[test]
    fn default_options() {
        let opts = CallOptions::default();
        assert!(!opts.video);
        assert_eq!(opts.auto_terminate_after, Some(DEFAULT_AUTO_TERMINATE));
        assert!(CallOptions::video().video);
        assert!(CallOptions::audio().without_auto_terminate().auto_terminate_after.is_none());
        assert_eq!(BatchOptions::default().interval, DEFAULT_BATCH_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_terminate_cancels_timer() {
        let (transport, controller) = controller().await;
        let offer = controller
            .initiate_call("1", CallOptions::audio().auto_terminate_after(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(controller.timers().len(), 1);

        controller.terminate_call(&offer.call_id).await.unwrap();
        assert!(controller.timers().is_empty());

        tokio::time::sleep(Duration::from_secs(20)).await;
        let terminates = transport
            .operations()
            .into_iter()
            .filter(|op| matches!(op, Operation::Terminate { .. }))
            .count();
        assert_eq!(terminates, 1);
    }

    #[tokio::test]
    async fn failed_terminate_keeps_call_active() {
        let (transport, controller) = controller().await;
        let offer = controller
            .initiate_call("1", CallOptions::audio().without_auto_terminate())
            .await
            .unwrap();
        transport.fail_termination_of(&offer.call_id);

        assert!(controller.terminate_call(&offer.call_id).await.is_err());
        let record = controller.registry().get(&offer.call_id).unwrap();
        assert_eq!(record.phase, CallPhase::Active);

        transport.clear_failures();
        let termination = controller.terminate_call(&offer.call_id).await.unwrap();
        assert!(termination.duration.is_some());
        assert!(controller.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_auto_terminate_is_swallowed() {
        let (transport, controller) = controller().await;
        let offer = controller
            .initiate_call("1", CallOptions::audio().auto_terminate_after(Duration::from_secs(5)))
            .await
            .unwrap();
        transport.fail_termination_of(&offer.call_id);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(controller.registry().get(&offer.call_id).is_some());
        assert!(controller.timers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_disarms_timers() {
        let (_transport, controller) = controller().await;
        controller
            .initiate_call("1", CallOptions::audio().auto_terminate_after(Duration::from_secs(5)))
            .await
            .unwrap();
        controller.shutdown();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(controller.active_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_connection_times_out() {
        let conn = Arc::new(ConnectionManager::new(
            Arc::new(SimulatedTransport::paired()),
            ReconnectPolicy::default(),
        ));
        let controller = CallController::new(Arc::new(CallService::new(conn)));
        let started = tokio::time::Instant::now();
        let err = controller
            .wait_for_connection(3, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection(ConnectionError::Timeout)));
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_connection_checks_at_least_once() {
        let (_transport, controller) = controller().await;
        let started = tokio::time::Instant::now();
        assert_ok!(controller.wait_for_connection(0, Duration::from_secs(2)).await);
        assert_eq!(started.elapsed(), Duration::ZERO);

        let offline = CallController::new(Arc::new(CallService::new(Arc::new(
            ConnectionManager::new(Arc::new(SimulatedTransport::paired()), ReconnectPolicy::default()),
        ))));
        let err = offline
            .wait_for_connection(0, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection(ConnectionError::Timeout)));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_connection_sees_late_connect() {
        let transport = Arc::new(SimulatedTransport::new(Duration::from_secs(3)));
        let conn = Arc::new(ConnectionManager::new(transport, ReconnectPolicy::default()));
        conn.init().await.unwrap();
        let controller = CallController::new(Arc::new(CallService::new(conn)));

        assert_ok!(controller.wait_for_connection(3, Duration::from_secs(2)).await);
    }

    #[test]
    fn termination_serializes_flat_with_millis() {
        let termination = Termination {
            ack: CallAck {
                success: true,
                call_id: "X".into(),
                action: CallAction::Terminated,
                timestamp: chrono::Utc::now(),
            },
            duration: Some(Duration::from_millis(1500)),
        };
        let v = serde_json::to_value(&termination).unwrap();
        assert_eq!(v["callId"], "X");
        assert_eq!(v["action"], "terminated");
        assert_eq!(v["durationMs"], 1500);
    }
}
