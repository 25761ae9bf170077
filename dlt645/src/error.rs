//! High-level error types

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] dlt645_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] dlt645_transport::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Check if the request hit its deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }

    /// Check if re-sending the same request might succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Core(e) => e.is_recoverable(),
            Self::Transport(e) => e.is_timeout() || e.requires_reconnect(),
            Self::InvalidConfig(_) => false,
        }
    }

    /// The control code of an error reply, if the meter sent one
    pub fn device_error(&self) -> Option<u8> {
        match self {
            Self::Core(dlt645_core::Error::ProtocolError { control, .. }) => Some(*control),
            _ => None,
        }
    }
}
