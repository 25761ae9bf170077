//! Transport layer for DL/T 645 meters
//!
//! Provides serial and TCP channels, plus the [`Connection`] wrapper that
//! serializes access, connects on demand and closes idle channels.

pub mod connection;
pub mod error;
pub mod reader;
pub mod serial;
pub mod tcp;

pub use connection::Connection;
pub use error::{Error, Result};
pub use serial::{Rs485Config, SerialConfig, SerialTransport};
pub use tcp::TcpTransport;
pub use tokio_serial::{DataBits, Parity, StopBits};

use async_trait::async_trait;
use bytes::BytesMut;

/// Transport trait for different communication methods
///
/// Implementations own exactly one channel. Parameters are fixed at
/// construction.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the channel (no-op if already open)
    async fn connect(&mut self) -> Result<()>;

    /// Close the channel (no-op if already closed)
    async fn close(&mut self) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Write a request and read back one complete response frame
    async fn send(&mut self, data: &[u8]) -> Result<BytesMut>;

    /// Get remote address (device path or `host:port`)
    fn remote_addr(&self) -> String;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn connect(&mut self) -> Result<()> {
        (**self).connect().await
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    async fn send(&mut self, data: &[u8]) -> Result<BytesMut> {
        (**self).send(data).await
    }

    fn remote_addr(&self) -> String {
        (**self).remote_addr()
    }
}
