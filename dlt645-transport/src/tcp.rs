//! TCP transport
//!
//! Used with serial-to-Ethernet gateways and meters with a network module.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};
use tracing::{debug, trace, warn};

use crate::{Transport, error::*, reader};

/// TCP transport for DL/T 645 gateways
pub struct TcpTransport {
    endpoint: String,
    socket_addr: Option<SocketAddr>,
    stream: Option<TcpStream>,
    timeout: Option<Duration>,
}

impl TcpTransport {
    /// Create new TCP transport for a `host:port` endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            socket_addr: None,
            stream: None,
            timeout: Some(Duration::from_secs(dlt645_core::constants::DEFAULT_TIMEOUT)),
        }
    }

    /// Set dial and request/response timeout (zero disables it)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Resolve endpoint to SocketAddr
    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.socket_addr {
            return Ok(addr);
        }

        let addr = tokio::net::lookup_host(&self.endpoint)
            .await
            .map_err(|e| Error::InvalidEndpoint(format!("{}: {}", self.endpoint, e)))?
            .next()
            .ok_or_else(|| {
                Error::InvalidEndpoint(format!("No addresses found for {}", self.endpoint))
            })?;

        self.socket_addr = Some(addr);
        Ok(addr)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let addr = self.resolve_addr().await?;

        debug!("Connecting to {}...", addr);

        let stream = match self.timeout {
            Some(limit) => timeout(limit, TcpStream::connect(addr))
                .await
                .map_err(|_| Error::ConnectionTimeout)??,
            None => TcpStream::connect(addr).await?,
        };

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        debug!("Connected to {}", addr);

        self.stream = Some(stream);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Disconnecting from {}...", self.remote_addr());

            // Graceful shutdown
            let _ = stream.shutdown().await;
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, data: &[u8]) -> Result<BytesMut> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        // Leftovers from an earlier reply would be read as this one
        let stale = discard_pending(stream)?;
        if stale > 0 {
            debug!("Discarded {} stale bytes from {}", stale, self.endpoint);
        }

        trace!("Sending {} bytes: {}", data.len(), hex::encode(data));

        let write = async {
            stream.write_all(data).await?;
            stream.flush().await
        };
        match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, write)
                .await
                .map_err(|_| Error::WriteTimeout)??,
            None => write.await?,
        }

        let buf = reader::read_frame(stream, deadline).await?;

        trace!("Received {} bytes: {}", buf.len(), hex::encode(&buf));

        Ok(buf)
    }

    fn remote_addr(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| self.endpoint.clone())
    }
}

/// Drain whatever the peer sent since the last reply, without waiting
fn discard_pending(stream: &TcpStream) -> Result<usize> {
    let mut scratch = [0u8; 64];
    let mut discarded = 0;

    loop {
        match stream.try_read(&mut scratch) {
            Ok(0) => return Err(Error::ConnectionClosed),
            Ok(n) => {
                trace!("Stale bytes: {}", hex::encode(&scratch[..n]));
                discarded += n;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(discarded),
            Err(e) => return Err(e.into()),
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("TCP transport dropped while still connected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlt645_core::{ControlCode, Frame};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_transport_create() {
        let transport = TcpTransport::new("192.168.1.201:8899");
        assert!(!transport.is_connected());
        assert_eq!(transport.remote_addr(), "192.168.1.201:8899");
    }

    #[tokio::test]
    async fn test_tcp_transport_invalid_address() {
        let mut transport =
            TcpTransport::new("invalid..address:8899").with_timeout(Duration::from_millis(100));

        let result = transport.connect().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tcp_transport_send_not_connected() {
        let mut transport = TcpTransport::new("127.0.0.1:8899");
        let result = transport.send(&[0x68]).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_tcp_transport_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();

        let reply = Frame::build("202204080026", ControlCode::ReadReply, &[0, 0, 0, 0], &[0x01])
            .unwrap()
            .encode();
        let expected = reply.clone();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 16];
            socket.read_exact(&mut request).await.unwrap();

            // Reply in two pieces
            socket.write_all(&reply[..5]).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            socket.write_all(&reply[5..]).await.unwrap();
            request
        });

        let mut transport = TcpTransport::new(endpoint).with_timeout(Duration::from_secs(2));
        transport.connect().await.unwrap();
        // Second connect is a no-op
        transport.connect().await.unwrap();

        let request = Frame::build("202204080026", ControlCode::Read, &[0, 0, 0, 0], &[])
            .unwrap()
            .encode();
        let response = transport.send(&request).await.unwrap();

        assert_eq!(response, expected);
        assert_eq!(&server.await.unwrap()[..], &request[..]);

        transport.close().await.unwrap();
        assert!(!transport.is_connected());
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_transport_discards_stale_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();

        let first = Frame::build("202204080026", ControlCode::ReadReply, &[1, 0, 0, 0], &[])
            .unwrap()
            .encode();
        let second = Frame::build("202204080026", ControlCode::ReadReply, &[2, 0, 0, 0], &[])
            .unwrap()
            .encode();
        let expected = second.clone();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 16];

            socket.read_exact(&mut request).await.unwrap();
            socket.write_all(&first).await.unwrap();
            // Line noise after the reply
            socket.write_all(&[0x00, 0x5A]).await.unwrap();

            socket.read_exact(&mut request).await.unwrap();
            socket.write_all(&second).await.unwrap();
            socket
        });

        let mut transport = TcpTransport::new(endpoint).with_timeout(Duration::from_secs(2));
        transport.connect().await.unwrap();

        let request = Frame::build("202204080026", ControlCode::Read, &[1, 0, 0, 0], &[])
            .unwrap()
            .encode();
        transport.send(&request).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        let response = transport.send(&request).await.unwrap();
        assert_eq!(response, expected);

        transport.close().await.unwrap();
        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn test_tcp_transport_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(socket);
        });

        let mut transport = TcpTransport::new(endpoint).with_timeout(Duration::from_millis(50));
        transport.connect().await.unwrap();

        let result = transport.send(&[0x68, 0x16]).await;
        assert!(matches!(result, Err(Error::ReadTimeout)));

        transport.close().await.unwrap();
        server.await.unwrap();
    }
}
