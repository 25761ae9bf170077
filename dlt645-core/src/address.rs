//! Device address encoding
//!
//! A meter address is a 12-digit decimal string. On the wire it travels as
//! six packed BCD bytes, least-significant digit pair first.

use tracing::trace;

use crate::constants::{ADDRESS_DIGITS, ADDRESS_LEN};
use crate::error::{Error, Result};

/// Encode a 12-digit decimal address to its 6-byte wire form
///
/// Shorter input is rejected rather than padded.
///
/// # Examples
///
/// ```
/// use dlt645_core::address;
///
/// let bcd = address::encode("202204080026").unwrap();
/// assert_eq!(bcd, [0x26, 0x00, 0x08, 0x04, 0x22, 0x20]);
/// ```
pub fn encode(address: &str) -> Result<[u8; ADDRESS_LEN]> {
    let digits = address.as_bytes();

    if digits.len() != ADDRESS_DIGITS {
        return Err(Error::InvalidAddress(format!(
            "{:?}: expected {} digits, got {}",
            address,
            ADDRESS_DIGITS,
            digits.len()
        )));
    }

    let mut bcd = [0u8; ADDRESS_LEN];

    for (i, pair) in digits.chunks_exact(2).enumerate() {
        let high = digit(pair[0], 2 * i, address)?;
        let low = digit(pair[1], 2 * i + 1, address)?;

        // Most-significant pair ends up last
        bcd[ADDRESS_LEN - 1 - i] = high << 4 | low;
    }

    trace!(address, bcd = %hex::encode(bcd), "Encoded address");

    Ok(bcd)
}

/// Decode a 6-byte wire address back to its decimal string
///
/// # Errors
///
/// - `InvalidLength` if `bcd` is not exactly 6 bytes
/// - `InvalidAddress` if any nibble is not a decimal digit
pub fn decode(bcd: &[u8]) -> Result<String> {
    if bcd.len() != ADDRESS_LEN {
        return Err(Error::InvalidLength {
            expected: ADDRESS_LEN,
            actual: bcd.len(),
        });
    }

    let mut address = String::with_capacity(ADDRESS_DIGITS);

    for &byte in bcd.iter().rev() {
        for nibble in [byte >> 4, byte & 0x0F] {
            if nibble > 9 {
                return Err(Error::InvalidAddress(format!(
                    "non-decimal nibble 0x{:X} in {}",
                    nibble,
                    hex::encode(bcd)
                )));
            }
            address.push(char::from(b'0' + nibble));
        }
    }

    Ok(address)
}

fn digit(c: u8, position: usize, address: &str) -> Result<u8> {
    if c.is_ascii_digit() {
        Ok(c - b'0')
    } else {
        Err(Error::InvalidAddress(format!(
            "{:?}: invalid digit at position {}",
            address, position
        )))
    }
}
