//! # dlt645
//!
//! Rust implementation of the DL/T 645 electricity meter protocol (client side).
//!
//! ## Features
//!
//! - Frame encoding/decoding with checksum and framing validation
//! - Serial (RS-485) and TCP transports
//! - Lazy connect, one request at a time, idle disconnect
//! - Async/await API using Tokio
//!
//! ## Quick Start
//!
//! ```no_run
//! use dlt645::{Client, Config};
//!
//! #[tokio::main]
//! async fn main() -> dlt645::Result<()> {
//!     let client = Client::new(Config::serial("/dev/ttyUSB0"), "202204080026")?;
//!
//!     // Phase A voltage
//!     let frame = client.read_data([0x02, 0x01, 0x01, 0x00]).await?;
//!     println!("{:?}", frame.payload);
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;

// Re-exports
pub use client::Client;
pub use config::{Config, TransportKind};
pub use error::{Error, Result};

pub use dlt645_core::{ConnectionState, ControlCode, Frame};
pub use dlt645_transport::{Connection, Rs485Config, Transport};
