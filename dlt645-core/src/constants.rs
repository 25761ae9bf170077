//! Protocol constants

/// Frame start marker (offsets 0 and 7)
pub const START_MARKER: u8 = 0x68;

/// Frame end marker (last byte)
pub const END_MARKER: u8 = 0x16;

/// Wake-up byte some meters send ahead of the start marker
pub const PREAMBLE: u8 = 0xFE;

/// Bias added to identifier and payload bytes on the wire
pub const DATA_BIAS: u8 = 0x33;

/// Encoded address length in bytes
pub const ADDRESS_LEN: usize = 6;

/// Decimal digits in a device address
pub const ADDRESS_DIGITS: usize = 12;

/// Identifier (DI0..DI3) length in bytes
pub const IDENTIFIER_LEN: usize = 4;

/// Place-holder address matching any device (`AA` in every byte)
pub const WILDCARD_ADDRESS: [u8; ADDRESS_LEN] = [0xAA; ADDRESS_LEN];

/// Default connect/read timeout (seconds)
pub const DEFAULT_TIMEOUT: u64 = 5;

/// Default idle-disconnect timeout (seconds)
pub const DEFAULT_IDLE_TIMEOUT: u64 = 300;

/// Serial line defaults
pub mod serial {
    /// Baud rate
    pub const DEFAULT_BAUD_RATE: u32 = 19200;

    /// Data bits
    pub const DEFAULT_DATA_BITS: u8 = 8;

    /// Stop bits
    pub const DEFAULT_STOP_BITS: u8 = 1;
}
