use super::{ApiError, AppState};
use crate::calls::{
    BatchOptions, BatchOutcome, CallAck, CallHistory, CallOffer, CallOptions, CallRecord,
    TerminateOutcome, Termination, DEFAULT_BATCH_INTERVAL,
};
use crate::connection::ConnectionStatus;
use crate::error::ValidationError;
use crate::qr;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

/// Call request. `phoneNumber` is accepted as an alias for `target`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    #[serde(default, alias = "phoneNumber")]
    pub target: String,
    #[serde(default)]
    pub is_video: bool,
    /// Terminate automatically after this many milliseconds. Absent or 0 disables it.
    pub auto_terminate_after_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequest {
    #[serde(default)]
    pub call_id: String,
    #[serde(default, alias = "callFrom")]
    pub from_address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateRequest {
    #[serde(default)]
    pub call_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    #[serde(default, alias = "phoneNumbers")]
    pub targets: Vec<String>,
    #[serde(default)]
    pub is_video: bool,
    pub interval_ms: Option<u64>,
    pub auto_terminate_after_ms: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrResponse {
    qr_code: String,
    qr_image: String,
    timestamp: DateTime<Utc>,
}

fn call_options(is_video: bool, auto_terminate_after_ms: Option<u64>) -> CallOptions {
    CallOptions {
        video: is_video,
        auto_terminate_after: auto_terminate_after_ms.map(Duration::from_millis),
    }
}

pub async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "name": "WhatsApp Call API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "status": "GET /api/status",
            "qr": "GET /api/qr",
            "makeCall": "POST /api/call",
            "rejectCall": "POST /api/call/reject",
            "terminateCall": "POST /api/call/terminate",
            "terminateAll": "POST /api/call/terminate-all",
            "batchCall": "POST /api/call/batch",
            "activeCalls": "GET /api/call/active",
            "history": "GET /api/call/history",
            "events": "GET /api/events"
        }
    }))
}

pub async fn status(State(state): State<AppState>) -> Json<ConnectionStatus> {
    Json(state.connection.status())
}

pub async fn qr(State(state): State<AppState>) -> Result<Response, ApiError> {
    let Some(code) = state.connection.qr() else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "QR code not available",
                "message": "WhatsApp is already connected or still waiting for a connection"
            })),
        )
            .into_response());
    };
    let qr_image =
        qr::render_data_url(&code).map_err(|e| ApiError::new("failed to render QR code", e))?;
    Ok(Json(QrResponse {
        qr_code: code,
        qr_image,
        timestamp: Utc::now(),
    })
    .into_response())
}

pub async fn make_call(
    State(state): State<AppState>,
    Json(req): Json<CallRequest>,
) -> Result<Json<CallOffer>, ApiError> {
    let options = call_options(req.is_video, req.auto_terminate_after_ms);
    state
        .controller
        .initiate_call(&req.target, options)
        .await
        .map(Json)
        .map_err(|e| ApiError::new("failed to place call", e))
}

pub async fn reject_call(
    State(state): State<AppState>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<CallAck>, ApiError> {
    state
        .service
        .reject_call(&req.call_id, &req.from_address)
        .await
        .map(Json)
        .map_err(|e| ApiError::new("failed to reject call", e))
}

pub async fn terminate_call(
    State(state): State<AppState>,
    Json(req): Json<TerminateRequest>,
) -> Result<Json<Termination>, ApiError> {
    state
        .controller
        .terminate_call(&req.call_id)
        .await
        .map(Json)
        .map_err(|e| ApiError::new("failed to terminate call", e))
}

pub async fn terminate_all(State(state): State<AppState>) -> Json<Vec<TerminateOutcome>> {
    Json(state.controller.terminate_all().await)
}

pub async fn batch_call(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<Vec<BatchOutcome>>, ApiError> {
    if req.targets.is_empty() {
        return Err(ApiError::new(
            "failed to start batch",
            ValidationError::MissingTarget.into(),
        ));
    }
    let options = BatchOptions {
        call: call_options(req.is_video, req.auto_terminate_after_ms),
        interval: req
            .interval_ms
            .map_or(DEFAULT_BATCH_INTERVAL, Duration::from_millis),
    };
    Ok(Json(state.controller.batch_call(&req.targets, options).await))
}

pub async fn active_calls(State(state): State<AppState>) -> Json<Vec<CallRecord>> {
    Json(state.controller.active_calls())
}

pub async fn history(State(state): State<AppState>) -> Result<Json<CallHistory>, ApiError> {
    state
        .service
        .history()
        .map(Json)
        .map_err(|e| ApiError::new("failed to load call history", e))
}

/// Inbound call events as server-sent events, named after the event type.
pub async fn call_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, axum::Error>>> {
    let events = BroadcastStream::new(state.connection.subscribe_calls()).filter_map(|item| match item {
        Ok(call) => Some(SseEvent::default().event(call.kind.as_str()).json_data(&call)),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, "call event subscriber lagged");
            None
        }
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}
