//! Watch a reader's inventory and input events.
//!
//! Connects to a Pulsar LR over TCP, starts continuous inventory, and prints
//! every tag sighting and input change for 60 seconds.
//!
//! # Usage
//!
//! ```sh
//! RUST_LOG=rfidlib=debug cargo run -p rfidlib --example monitor_inventory -- 192.168.2.239
//! ```

use std::time::Duration;

use rfidlib::at::models::pulsar_lr;
use rfidlib::{EventKind, ReaderBuilder, ReaderEvent};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "192.168.2.239".to_string());
    println!("Connecting to Pulsar LR at {addr}...");

    let reader = ReaderBuilder::new(pulsar_lr())
        .tcp_address(&addr)
        .heartbeat_interval(Duration::from_secs(10))
        .build()
        .await?;
    reader.connect().await?;

    if let Some(identity) = reader.identity().await {
        println!(
            "Connected: {} firmware {} (serial {})\n",
            identity.hardware_name, identity.firmware, identity.serial_number
        );
    }

    let mut events = reader.subscribe_to(&[EventKind::Inventory, EventKind::Input, EventKind::Status]);
    if let Err(e) = reader.enable_input_events(true).await {
        println!("Input events unavailable: {e}");
    }
    reader.start_inventory().await?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Some(ReaderEvent::InventoryUpdated { tags, timestamp })) => {
                for tag in tags {
                    println!(
                        "{} {:<28} ant={:?} rssi={:?} seen={}",
                        timestamp.format("%H:%M:%S%.3f"),
                        tag.id,
                        tag.antenna,
                        tag.rssi(),
                        tag.seen_count
                    );
                }
            }
            Ok(Some(ReaderEvent::InputChanged { pin, high, timestamp })) => {
                println!("{} input {pin} -> {}", timestamp.format("%H:%M:%S%.3f"), if high { "HIGH" } else { "LOW" });
            }
            Ok(Some(ReaderEvent::StatusChanged { state, .. })) => {
                println!("status: {state}");
            }
            Ok(None) | Err(_) => break,
        }
    }

    reader.stop_inventory().await?;
    println!("\n{} distinct tags seen", reader.tags().await.len());
    reader.disconnect().await?;
    Ok(())
}
