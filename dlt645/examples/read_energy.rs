//! Read the total active energy register over a TCP gateway or serial line
//!
//! ```text
//! METER_ADDRESS=202204080026 METER_TCP=192.168.1.50:8899 cargo run --example read_energy
//! METER_ADDRESS=202204080026 METER_SERIAL=/dev/ttyUSB0 cargo run --example read_energy
//! ```

use std::time::Duration;

use anyhow::Context;
use dlt645::{Client, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("dlt645=debug".parse()?))
        .init();

    let address = std::env::var("METER_ADDRESS").unwrap_or_else(|_| "202204080026".to_string());

    let config = match std::env::var("METER_SERIAL") {
        Ok(path) => Config::serial(path),
        Err(_) => Config::tcp(
            std::env::var("METER_TCP").unwrap_or_else(|_| "192.168.1.50:8899".to_string()),
        ),
    }
    .with_timeout(Duration::from_secs(3));

    println!("Connecting to meter {} via {:?}...", address, config.transport);

    let client = Client::open(config, address).await?;
    println!("✓ Connected!");

    // 00 00 00 00: combined active energy, total
    let frame = client
        .read_data([0x00, 0x00, 0x00, 0x00])
        .await
        .context("reading total active energy")?;

    println!("✓ {}", frame);
    println!("  raw value: {:02X?}", frame.payload.as_ref());

    client.close().await?;
    println!("✓ Disconnected");

    Ok(())
}
