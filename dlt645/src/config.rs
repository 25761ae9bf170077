//! Client configuration

use std::time::Duration;

use dlt645_core::constants::{
    DEFAULT_IDLE_TIMEOUT, DEFAULT_TIMEOUT,
    serial::{DEFAULT_BAUD_RATE, DEFAULT_DATA_BITS, DEFAULT_STOP_BITS},
};
use dlt645_transport::{
    DataBits, Parity, Rs485Config, SerialConfig, SerialTransport, StopBits, TcpTransport,
    Transport,
};

use crate::error::{Error, Result};

/// Channel to the meter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportKind {
    /// Serial device path, e.g. `/dev/ttyUSB0` or `COM3`
    Serial(String),

    /// TCP `host:port` endpoint
    Tcp(String),
}

/// Client configuration
///
/// Serial line settings are ignored for TCP.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use dlt645::Config;
///
/// let config = Config::serial("/dev/ttyUSB0")
///     .with_baud_rate(2400)
///     .with_idle_timeout(Duration::from_secs(30));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Channel to open
    pub transport: TransportKind,

    /// Connect and request/response deadline (zero: wait forever)
    pub timeout: Duration,

    /// Close the channel after this long without traffic (zero: never)
    pub idle_timeout: Duration,

    /// Baud rate
    pub baud_rate: u32,

    /// Data bits
    pub data_bits: DataBits,

    /// Stop bits
    pub stop_bits: StopBits,

    /// Parity
    pub parity: Parity,

    /// RS-485 line control
    pub rs485: Option<Rs485Config>,
}

impl Config {
    /// Configuration for a serial line with protocol defaults
    pub fn serial(path: impl Into<String>) -> Self {
        Self::new(TransportKind::Serial(path.into()))
    }

    /// Configuration for a TCP gateway
    pub fn tcp(endpoint: impl Into<String>) -> Self {
        Self::new(TransportKind::Tcp(endpoint.into()))
    }

    fn new(transport: TransportKind) -> Self {
        Self {
            transport,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::Even,
            rs485: None,
        }
    }

    /// Set connect and request/response timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set idle-disconnect timeout
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Set baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set data bits
    pub fn with_data_bits(mut self, data_bits: DataBits) -> Self {
        self.data_bits = data_bits;
        self
    }

    /// Set stop bits
    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    /// Set parity
    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Enable RS-485 line control
    pub fn with_rs485(mut self, rs485: Rs485Config) -> Self {
        self.rs485 = Some(rs485);
        self
    }

    /// Check the settings before any channel is opened
    pub fn validate(&self) -> Result<()> {
        match &self.transport {
            TransportKind::Serial(path) if path.is_empty() => {
                return Err(Error::InvalidConfig("empty serial device path".into()));
            }
            TransportKind::Tcp(endpoint) if !endpoint.contains(':') => {
                return Err(Error::InvalidConfig(format!(
                    "TCP endpoint {:?} must be host:port",
                    endpoint
                )));
            }
            _ => {}
        }

        if self.baud_rate == 0 {
            return Err(Error::InvalidConfig("baud rate must be positive".into()));
        }

        Ok(())
    }

    /// Serial line settings derived from this configuration
    pub fn serial_config(&self, path: impl Into<String>) -> SerialConfig {
        SerialConfig {
            path: path.into(),
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
            rs485: self.rs485.clone(),
        }
    }

    /// Create the transport this configuration selects
    pub fn build_transport(&self) -> Result<Box<dyn Transport>> {
        self.validate()?;

        let transport: Box<dyn Transport> = match &self.transport {
            TransportKind::Serial(path) => Box::new(
                SerialTransport::new(self.serial_config(path.as_str())).with_timeout(self.timeout),
            ),
            TransportKind::Tcp(endpoint) => {
                Box::new(TcpTransport::new(endpoint.as_str()).with_timeout(self.timeout))
            }
        };

        Ok(transport)
    }
}

/// Parse the classic parity letter: `N`, `E` or `O`
pub fn parse_parity(s: &str) -> Result<Parity> {
    match s.trim().to_ascii_uppercase().as_str() {
        "N" | "NONE" => Ok(Parity::None),
        "E" | "EVEN" => Ok(Parity::Even),
        "O" | "ODD" => Ok(Parity::Odd),
        other => Err(Error::InvalidConfig(format!("unknown parity {:?}", other))),
    }
}

/// Data bits from their count (5 to 8)
pub fn parse_data_bits(bits: u8) -> Result<DataBits> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        0 => parse_data_bits(DEFAULT_DATA_BITS),
        other => Err(Error::InvalidConfig(format!("unsupported data bits {}", other))),
    }
}

/// Stop bits from their count (1 or 2)
pub fn parse_stop_bits(bits: u8) -> Result<StopBits> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        0 => parse_stop_bits(DEFAULT_STOP_BITS),
        other => Err(Error::InvalidConfig(format!("unsupported stop bits {}", other))),
    }
}
