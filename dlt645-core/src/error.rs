//! Error types for dlt645-core



/// Result type alias for dlt645 codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Device address is not 12 decimal digits
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Encoded field has the wrong size
    #[error("Invalid length: expected {expected} bytes, got {actual} bytes")]
    InvalidLength {
        expected: usize,
        actual: usize,
    },

    /// Frame is too short to be valid
    #[error("Frame too short: expected at least {expected} bytes, got {actual} bytes")]
    FrameTooShort {
        expected: usize,
        actual: usize,
    },

    /// Framing markers or length field are inconsistent
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Checksum verification failed
    #[error("Checksum mismatch: expected 0x{expected:02X}, received 0x{received:02X}")]
    ChecksumMismatch {
        expected: u8,
        received: u8,
    },

    /// Meter answered with an error control code
    #[error("Device reported error: control 0x{control:02X}, status {status:?}")]
    ProtocolError {
        control: u8,
        status: Option<u8>,
    },

    /// Identifier and payload do not fit the one-byte length field
    #[error("Payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        size: usize,
        max: usize,
    },

    /// Unknown control code
    #[error("Unknown control code: 0x{0:02X}")]
    UnknownControlCode(u8),

    /// Well-formed frame that does not answer the request just sent
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),
}

impl Error {
    /// Check if error is recoverable (re-sending the request might succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FrameTooShort { .. }
                | Self::InvalidFrame(_)
                | Self::ChecksumMismatch { .. }
                | Self::UnexpectedReply(_)
        )
    }
}
