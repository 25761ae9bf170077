//! Poll a few registers concurrently and let the idle timer close the line

use std::time::Duration;

use dlt645::{Client, Config};
use tokio::time::sleep;

/// Phase A voltage, phase A current, total active power
const REGISTERS: [[u8; 4]; 3] = [
    [0x02, 0x01, 0x01, 0x00],
    [0x02, 0x02, 0x01, 0x00],
    [0x02, 0x03, 0x00, 0x00],
];

#[tokio::main]
async fn main() -> dlt645::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let path = std::env::var("METER_SERIAL").unwrap_or_else(|_| "/dev/ttyUSB0".to_string());
    let address = std::env::var("METER_ADDRESS").unwrap_or_else(|_| "202204080026".to_string());

    let config = Config::serial(path)
        .with_baud_rate(2400)
        .with_idle_timeout(Duration::from_secs(2));
    let client = Client::new(config, address)?;

    // Requests queue on the line, one at a time
    let reads = REGISTERS.map(|id| {
        let client = client.clone();
        tokio::spawn(async move { (id, client.read_data(id).await) })
    });

    for read in reads {
        match read.await {
            Ok((id, Ok(frame))) => println!("{:02X?}: {:02X?}", id, frame.payload.as_ref()),
            Ok((id, Err(e))) => println!("{:02X?}: {}", id, e),
            Err(e) => println!("task failed: {}", e),
        }
    }

    println!("Waiting for idle close...");
    sleep(Duration::from_secs(3)).await;
    println!("Connected: {}", client.is_connected());

    Ok(())
}
