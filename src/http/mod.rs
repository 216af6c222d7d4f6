//! HTTP facade: JSON routes over the call controller and connection manager.

mod error;
mod handlers;

pub use error::ApiError;

use crate::calls::{CallController, CallService};
use crate::connection::ConnectionManager;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub connection: Arc<ConnectionManager>,
    pub service: Arc<CallService>,
    pub controller: CallController,
}

impl AppState {
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        let service = Arc::new(CallService::new(Arc::clone(&connection)));
        let controller = CallController::new(Arc::clone(&service));
        Self {
            connection,
            service,
            controller,
        }
    }
}

/// Build the API router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::index))
        .route("/api/status", get(handlers::status))
        .route("/api/qr", get(handlers::qr))
        .route("/api/call", post(handlers::make_call))
        .route("/api/call/reject", post(handlers::reject_call))
        .route("/api/call/terminate", post(handlers::terminate_call))
        .route("/api/call/terminate-all", post(handlers::terminate_all))
        .route("/api/call/batch", post(handlers::batch_call))
        .route("/api/call/active", get(handlers::active_calls))
        .route("/api/call/history", get(handlers::history))
        .route("/api/events", get(handlers::call_events))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `addr` until `shutdown` resolves.
pub async fn serve<F>(state: AppState, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
