//! Transport errors

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not connected")]
    NotConnected,

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Read timeout")]
    ReadTimeout,

    #[error("Connection closed by remote")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl Error {
    /// Check if the failure was a deadline expiring
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout | Self::WriteTimeout | Self::ReadTimeout
        )
            || matches!(self, Self::Io(e) if e.kind() == io::ErrorKind::TimedOut)
    }

    /// Check if the channel is in an unknown state and must be reopened
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Self::WriteTimeout
                | Self::ReadTimeout
                | Self::ConnectionClosed
                | Self::Io(_)
                | Self::Serial(_)
        )
    }
}
