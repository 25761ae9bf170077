//! Serial port transport
//!
//! Most meters hang off an RS-485 bus. When the adapter does not drive the
//! transmitter itself, RTS can be toggled around each request in software.

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::time::{Instant, sleep, timeout_at};
use tokio_serial::{ClearBuffer, DataBits, Parity, SerialPort, SerialStream, StopBits};
use tracing::{debug, trace, warn};

use dlt645_core::constants::serial::DEFAULT_BAUD_RATE;

use crate::{Transport, error::*, reader};

/// RS-485 line control, ignored unless `enabled` is set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rs485Config {
    /// Enable RS-485 line control
    pub enabled: bool,

    /// Delay between raising RTS and the first byte
    pub delay_rts_before_send: Duration,

    /// Delay between the last byte and releasing RTS
    pub delay_rts_after_send: Duration,

    /// RTS level while transmitting
    pub rts_high_during_send: bool,

    /// RTS level after transmitting
    pub rts_high_after_send: bool,

    /// Keep bytes received while transmitting (otherwise the echo is dropped)
    pub rx_during_tx: bool,
}

/// Serial line settings
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub rs485: Option<Rs485Config>,
}

impl SerialConfig {
    /// Create settings with DL/T 645 defaults (19200 8E1)
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::Even,
            rs485: None,
        }
    }

    /// Time needed to shift `len` bytes out of the UART
    pub fn transmit_time(&self, len: usize) -> Duration {
        let data = match self.data_bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        };
        let parity = if self.parity == Parity::None { 0 } else { 1 };
        let stop = if self.stop_bits == StopBits::Two { 2 } else { 1 };
        let bits_per_char = 1 + data + parity + stop;

        Duration::from_micros(len as u64 * bits_per_char * 1_000_000 / self.baud_rate.max(1) as u64)
    }

    fn line_control(&self) -> Option<&Rs485Config> {
        self.rs485.as_ref().filter(|c| c.enabled)
    }
}

/// Serial transport for DL/T 645 meters
pub struct SerialTransport {
    config: SerialConfig,
    stream: Option<SerialStream>,
    timeout: Option<Duration>,
}

impl SerialTransport {
    /// Create new serial transport
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            stream: None,
            timeout: Some(Duration::from_secs(dlt645_core::constants::DEFAULT_TIMEOUT)),
        }
    }

    /// Set request/response timeout (zero disables it)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Line settings
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    async fn write_request(
        stream: &mut SerialStream,
        config: &SerialConfig,
        data: &[u8],
    ) -> Result<()> {
        let line = config.line_control();

        if let Some(rs485) = line {
            stream.write_request_to_send(rs485.rts_high_during_send)?;
            sleep(rs485.delay_rts_before_send).await;
        }

        stream.write_all(data).await?;
        stream.flush().await?;

        if let Some(rs485) = line {
            // flush() only hands bytes to the driver
            sleep(config.transmit_time(data.len()) + rs485.delay_rts_after_send).await;
            stream.write_request_to_send(rs485.rts_high_after_send)?;

            if !rs485.rx_during_tx {
                stream.clear(ClearBuffer::Input)?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        debug!(
            "Opening {} ({} baud, {:?}, {:?}, {:?})...",
            self.config.path,
            self.config.baud_rate,
            self.config.data_bits,
            self.config.parity,
            self.config.stop_bits
        );

        let mut builder = tokio_serial::new(&self.config.path, self.config.baud_rate)
            .data_bits(self.config.data_bits)
            .stop_bits(self.config.stop_bits)
            .parity(self.config.parity);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let stream = SerialStream::open(&builder)?;

        debug!("Opened {}", self.config.path);

        self.stream = Some(stream);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Closing {}...", self.config.path);
            let _ = stream.flush().await;
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, data: &[u8]) -> Result<BytesMut> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        // Leftovers from an abandoned reply would be read as this one
        stream.clear(ClearBuffer::Input)?;

        trace!("Sending {} bytes: {}", data.len(), hex::encode(data));

        let write = Self::write_request(stream, &self.config, data);
        match deadline {
            Some(deadline) => timeout_at(deadline, write)
                .await
                .map_err(|_| Error::WriteTimeout)??,
            None => write.await?,
        }

        let buf = reader::read_frame(stream, deadline).await?;

        trace!("Received {} bytes: {}", buf.len(), hex::encode(&buf));

        Ok(buf)
    }

    fn remote_addr(&self) -> String {
        self.config.path.clone()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("Serial transport dropped while still open");
        }
    }
}
