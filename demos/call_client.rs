//! Call lifecycle walkthrough against the simulated transport: pair, place a
//! call that ends itself, schedule one, run a paced batch, then hang up
//! everything still active.
//!
//! Run with: `cargo run --example call_client`

use std::sync::Arc;
use std::time::Duration;
use whatsapp_call_api::{
    BatchOptions, CallController, CallEventKind, CallOptions, CallService, ConnectionManager,
    ConnectionState, Jid, ReconnectPolicy, SimulatedTransport,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::try_init().ok();

    let transport = Arc::new(SimulatedTransport::new(Duration::from_secs(2)));
    let connection = Arc::new(ConnectionManager::new(
        transport.clone(),
        ReconnectPolicy::default(),
    ));
    let mut inbound = connection.subscribe_calls();
    connection.init().await?;

    connection
        .wait_for_state(ConnectionState::QrPending, Duration::from_secs(1))
        .await?;
    if let Some(qr) = connection.qr() {
        println!("[Pairing] scan this payload with WhatsApp Linked Devices: {}", qr);
    }

    let controller = CallController::new(Arc::new(CallService::new(connection.clone())));
    controller
        .wait_for_connection(30, Duration::from_millis(500))
        .await?;

    println!("\n=== Single call, ends after 3s ===");
    let call = controller
        .initiate_call(
            "5511999999999",
            CallOptions::audio().auto_terminate_after(Duration::from_secs(3)),
        )
        .await?;
    println!("Call started: {} -> {}", call.call_id, call.to);

    println!("\n=== Scheduled call in 1s ===");
    let scheduled = controller
        .schedule_call("5511888888888", Duration::from_secs(1), CallOptions::video())
        .await?;
    println!("Scheduled call started: {}", scheduled.call_id);

    println!("\n=== Batch, 500ms apart ===");
    transport.fail_offers_to("5511222222222");
    let results = controller
        .batch_call(
            &["5511111111111", "5511222222222", "5511333333333"],
            BatchOptions {
                call: CallOptions::audio().auto_terminate_after(Duration::from_secs(20)),
                interval: Duration::from_millis(500),
            },
        )
        .await;
    for r in &results {
        match &r.error {
            None => println!("  {} ok", r.target),
            Some(e) => println!("  {} failed: {}", r.target, e),
        }
    }

    println!("\n=== Inbound call ===");
    transport.simulate_inbound(CallEventKind::Incoming, Jid::from_phone("5511444444444"));
    if let Ok(evt) = inbound.recv().await {
        println!("Incoming call {} from {}", evt.call_id, evt.from);
        let ack = controller
            .service()
            .reject_call(&evt.call_id, &evt.from.to_string())
            .await?;
        println!("Rejected: {:?}", ack.action);
    }

    tokio::time::sleep(Duration::from_secs(3)).await;
    println!("\n=== Active calls ===");
    for record in controller.active_calls() {
        println!("  {} to {} (video: {})", record.call_id, record.target, record.is_video);
    }

    println!("\n=== Terminate all ===");
    for outcome in controller.terminate_all().await {
        println!("  {} success={}", outcome.call_id, outcome.success);
    }

    controller.shutdown();
    connection.shutdown().await?;
    Ok(())
}
