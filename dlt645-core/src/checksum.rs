//! DL/T 645 checksum algorithm
//!
//! The checksum is the low byte of the unsigned sum of every byte from the
//! first start marker up to, but not including, the checksum byte itself.

use tracing::trace;

/// Calculate frame checksum
///
/// # Examples
///
/// ```
/// use dlt645_core::checksum;
///
/// assert_eq!(checksum::calculate(&[0x68, 0xFF, 0x01]), 0x68);
/// ```
pub fn calculate(data: &[u8]) -> u8 {
    let checksum = data.iter().fold(0u8, |sum, &b| sum.wrapping_add(b));

    trace!(
        len = data.len(),
        checksum = format!("0x{:02X}", checksum),
        "Calculated checksum"
    );

    checksum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_empty() {
        assert_eq!(calculate(&[]), 0);
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(calculate(&[0xFF, 0x02]), 0x01);
        assert_eq!(calculate(&[0x80, 0x80]), 0x00);
    }

    #[test]
    fn test_checksum_request_header() {
        // 68 26 00 08 04 22 20 68 11 04 33 33 34 34
        let frame = [
            0x68, 0x26, 0x00, 0x08, 0x04, 0x22, 0x20, 0x68, 0x11, 0x04, 0x33, 0x33, 0x34, 0x34,
        ];
        let expected = frame.iter().map(|&b| b as u32).sum::<u32>() as u8;
        assert_eq!(calculate(&frame), expected);
    }

    #[test]
    fn test_checksum_large_input() {
        let data = vec![0xFF; 1000];
        // 1000 * 255 = 255000 = 0x3E418
        assert_eq!(calculate(&data), 0x18);
    }
}
