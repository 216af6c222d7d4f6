use super::service::CallOffer;
use crate::types::{CallId, Jid};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

/// Lifecycle phase of one call attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallPhase {
    Requested,
    Active,
    Terminating,
    Terminated,
}

/// A call the controller believes is active.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub call_id: CallId,
    pub target: Jid,
    pub is_video: bool,
    pub phase: CallPhase,
    /// Wall-clock start, for callers.
    pub started_at: DateTime<Utc>,
    /// Monotonic start, for durations.
    #[serde(skip)]
    pub start_time: Instant,
}

impl CallRecord {
    pub fn from_offer(offer: &CallOffer) -> Self {
        Self {
            call_id: offer.call_id.clone(),
            target: offer.to.clone(),
            is_video: offer.media.is_video(),
            phase: CallPhase::Active,
            started_at: offer.timestamp,
            start_time: Instant::now(),
        }
    }
}

/// In-memory map of active calls by call ID.
#[derive(Default)]
pub struct CallRegistry {
    calls: Mutex<HashMap<CallId, CallRecord>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn calls(&self) -> MutexGuard<'_, HashMap<CallId, CallRecord>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the record for its call ID.
    pub fn put(&self, record: CallRecord) {
        self.calls().insert(record.call_id.clone(), record);
    }

    pub fn get(&self, call_id: &str) -> Option<CallRecord> {
        self.calls().get(call_id).cloned()
    }

    /// Remove and return the record. Missing IDs are a no-op.
    pub fn remove(&self, call_id: &str) -> Option<CallRecord> {
        self.calls().remove(call_id)
    }

    /// Move a tracked call to `phase`. Returns false if the call is not tracked.
    pub fn set_phase(&self, call_id: &str, phase: CallPhase) -> bool {
        match self.calls().get_mut(call_id) {
            Some(record) => {
                record.phase = phase;
                true
            }
            None => false,
        }
    }

    /// Snapshot of all active calls, in no particular order.
    pub fn list_active(&self) -> Vec<CallRecord> {
        self.calls().values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<CallId> {
        self.calls().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.calls().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls().is_empty()
    }
}
