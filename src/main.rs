//! `whatsapp-call-api` server.
//!
//! Runs the HTTP API against the simulated transport. Embed the library and
//! pass your own [CallTransport] to [ConnectionManager::new] to drive a real
//! WhatsApp Web session.

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use whatsapp_call_api::http::{self, AppState};
use whatsapp_call_api::{CallTransport, Config, ConnectionManager, SimulatedTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let transport: Arc<dyn CallTransport> =
        Arc::new(SimulatedTransport::new(config.pairing_delay()));
    let connection = Arc::new(ConnectionManager::new(transport, config.reconnect_policy()));
    let state = AppState::new(Arc::clone(&connection));
    let controller = state.controller.clone();

    // The API stays up without a session; call endpoints answer 503 until connected.
    if let Err(e) = connection.init().await {
        error!(error = %e, "failed to connect to WhatsApp");
    }

    http::serve(state, config.addr(), shutdown_signal()).await?;

    controller.shutdown();
    if let Err(e) = connection.shutdown().await {
        warn!(error = %e, "transport did not close cleanly");
    }
    info!("bye");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
