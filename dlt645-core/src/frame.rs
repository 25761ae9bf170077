//! DL/T 645 frame structure and encoding/decoding

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    address, checksum,
    constants::{ADDRESS_LEN, DATA_BIAS, END_MARKER, IDENTIFIER_LEN, START_MARKER, WILDCARD_ADDRESS},
    control::{self, ControlCode},
    error::{Error, Result},
};

/// DL/T 645 frame
///
/// # Frame Structure
///
/// ```text
/// ┌──────┬──────────┬──────┬─────────┬─────┬──────────────────┬─────┬──────┐
/// │ 0x68 │ Address  │ 0x68 │ Control │  L  │ DI0..DI3 + Data  │ CS  │ 0x16 │
/// │  1   │ 6 (BCD)  │  1   │    1    │  1  │  L (+0x33 each)  │  1  │  1   │
/// └──────┴──────────┴──────┴─────────┴─────┴──────────────────┴─────┴──────┘
/// ```
///
/// `identifier` and `payload` are held in caller order with the bias removed.
/// On the wire each sequence is reversed and every byte carries `+0x33`.
///
/// # Examples
///
/// ```
/// use dlt645_core::{ControlCode, Frame};
///
/// let frame = Frame::build("202204080026", ControlCode::Read, &[0x00, 0x00, 0x01, 0x00], &[]).unwrap();
/// let encoded = frame.encode();
///
/// let decoded = Frame::decode(&encoded).unwrap();
/// assert_eq!(frame, decoded);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// Encoded device address (packed BCD, least-significant pair first)
    pub address: [u8; ADDRESS_LEN],

    /// Control code
    pub control: u8,

    /// Data identifier (DI3..DI0 as the caller writes it)
    pub identifier: Bytes,

    /// Data bytes following the identifier
    pub payload: Bytes,
}

impl Frame {
    /// Bytes before the data field (start, address, start, control, length)
    pub const HEADER_SIZE: usize = 10;

    /// Smallest valid frame (empty data field)
    pub const MIN_SIZE: usize = Self::HEADER_SIZE + 2;

    /// Largest data field the length byte can describe
    pub const MAX_DATA_LEN: usize = u8::MAX as usize;

    /// Largest possible frame
    pub const MAX_SIZE: usize = Self::MIN_SIZE + Self::MAX_DATA_LEN;

    /// Build a frame for a 12-digit decimal device address
    ///
    /// # Errors
    ///
    /// - `InvalidAddress` if the address is not 12 decimal digits
    /// - `PayloadTooLarge` if identifier and payload exceed 255 bytes
    pub fn build(
        address: &str,
        control: impl Into<u8>,
        identifier: &[u8],
        payload: &[u8],
    ) -> Result<Self> {
        let address = address::encode(address)?;
        Self::with_address(address, control, identifier, payload)
    }

    /// Build a frame for an already encoded address
    ///
    /// Use this with [`WILDCARD_ADDRESS`](crate::constants::WILDCARD_ADDRESS)
    /// to reach a meter whose address is unknown.
    pub fn with_address(
        address: [u8; ADDRESS_LEN],
        control: impl Into<u8>,
        identifier: &[u8],
        payload: &[u8],
    ) -> Result<Self> {
        let size = identifier.len() + payload.len();
        if size > Self::MAX_DATA_LEN {
            return Err(Error::PayloadTooLarge {
                size,
                max: Self::MAX_DATA_LEN,
            });
        }

        Ok(Self {
            address,
            control: control.into(),
            identifier: Bytes::copy_from_slice(identifier),
            payload: Bytes::copy_from_slice(payload),
        })
    }

    /// Value of the length field
    pub fn data_len(&self) -> u8 {
        // Bounded by construction
        (self.identifier.len() + self.payload.len()) as u8
    }

    /// Total encoded size
    pub fn size(&self) -> usize {
        Self::MIN_SIZE + self.identifier.len() + self.payload.len()
    }

    /// Encode frame to bytes
    ///
    /// The checksum byte is written last, over everything that precedes it.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.size());

        buf.put_u8(START_MARKER);
        buf.put_slice(&self.address);
        buf.put_u8(START_MARKER);
        buf.put_u8(self.control);
        buf.put_u8(self.data_len());

        put_biased(&mut buf, &self.identifier);
        put_biased(&mut buf, &self.payload);

        let cs = checksum::calculate(&buf);
        buf.put_u8(cs);
        buf.put_u8(END_MARKER);

        buf
    }

    /// Decode frame from bytes
    ///
    /// # Errors
    ///
    /// Checked in this order:
    /// - `FrameTooShort` if fewer than 12 bytes
    /// - `InvalidFrame` if a start or end marker is wrong
    /// - `ChecksumMismatch` if the checksum byte disagrees
    /// - `ProtocolError` if the meter replied with `0xD1` / `0xD2`
    /// - `InvalidFrame` if the length field disagrees with the buffer size
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::MIN_SIZE {
            return Err(Error::FrameTooShort {
                expected: Self::MIN_SIZE,
                actual: buf.len(),
            });
        }

        let last = buf.len() - 1;
        if buf[0] != START_MARKER || buf[7] != START_MARKER || buf[last] != END_MARKER {
            return Err(Error::InvalidFrame(format!(
                "bad markers: start=0x{:02X} start2=0x{:02X} end=0x{:02X}",
                buf[0], buf[7], buf[last]
            )));
        }

        let cs_pos = last - 1;
        let expected = checksum::calculate(&buf[..cs_pos]);
        let received = buf[cs_pos];
        if expected != received {
            return Err(Error::ChecksumMismatch { expected, received });
        }

        let control = buf[8];
        let data_len = buf[9] as usize;

        if control::is_error(control) {
            // Error replies carry a single status byte
            let status = (data_len >= 1 && cs_pos > Self::HEADER_SIZE)
                .then(|| buf[Self::HEADER_SIZE].wrapping_sub(DATA_BIAS));
            return Err(Error::ProtocolError { control, status });
        }

        if Self::MIN_SIZE + data_len != buf.len() {
            return Err(Error::InvalidFrame(format!(
                "length field {} does not match {} byte frame",
                data_len,
                buf.len()
            )));
        }

        let mut address = [0u8; ADDRESS_LEN];
        address.copy_from_slice(&buf[1..7]);

        let data = &buf[Self::HEADER_SIZE..cs_pos];
        let (identifier, payload) = if data_len >= IDENTIFIER_LEN {
            let (identifier, payload) = data.split_at(IDENTIFIER_LEN);
            (unbias(identifier), unbias(payload))
        } else {
            (Bytes::new(), Bytes::new())
        };

        Ok(Self {
            address,
            control,
            identifier,
            payload,
        })
    }

    /// Decode `buf` as the reply to this request
    ///
    /// On top of [`decode`](Self::decode), the reply must come from the
    /// addressed meter (any meter for the wildcard address), carry one of the
    /// reply codes the request allows and echo its identifier. Error replies
    /// are checked for address and code before `ProtocolError` is returned.
    ///
    /// # Errors
    ///
    /// Everything `decode` returns, plus `UnexpectedReply` when the frame
    /// answers some other request.
    pub fn decode_reply(&self, buf: &[u8]) -> Result<Self> {
        let reply = match Self::decode(buf) {
            Ok(reply) => reply,
            Err(e @ Error::ProtocolError { .. }) => {
                // Markers and checksum are already verified
                let mut address = [0u8; ADDRESS_LEN];
                address.copy_from_slice(&buf[1..7]);
                self.check_origin(&address, buf[8])?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        self.check_origin(&reply.address, reply.control)?;

        if !self.identifier.is_empty() && reply.identifier != self.identifier {
            return Err(Error::UnexpectedReply(format!(
                "identifier {} in reply to {}",
                hex::encode_upper(&reply.identifier),
                hex::encode_upper(&self.identifier)
            )));
        }

        Ok(reply)
    }

    fn check_origin(&self, address: &[u8; ADDRESS_LEN], control: u8) -> Result<()> {
        if self.address != WILDCARD_ADDRESS && *address != self.address {
            return Err(Error::UnexpectedReply(format!(
                "address {} in reply to {}",
                hex::encode_upper(address),
                hex::encode_upper(self.address)
            )));
        }

        let allowed = match self.control_code() {
            Some(code) if !code.expected_replies().is_empty() => {
                code.expected_replies().iter().any(|&c| u8::from(c) == control)
            }
            _ => control::is_reply(control),
        };
        if !allowed {
            return Err(Error::UnexpectedReply(format!(
                "control 0x{:02X} in reply to 0x{:02X}",
                control, self.control
            )));
        }

        Ok(())
    }

    /// Expected total length of the frame starting at `buf[0]`
    ///
    /// Returns `None` until the length field has arrived.
    pub fn expected_len(buf: &[u8]) -> Option<usize> {
        buf.get(9).map(|&len| Self::MIN_SIZE + len as usize)
    }

    /// Decode the device address
    pub fn address_string(&self) -> Result<String> {
        address::decode(&self.address)
    }

    /// Known control code, if any
    pub fn control_code(&self) -> Option<ControlCode> {
        ControlCode::try_from(self.control).ok()
    }

    /// Check if this frame was sent by a meter
    pub fn is_reply(&self) -> bool {
        control::is_reply(self.control)
    }

    /// Check if the meter has more frames for this identifier
    pub fn is_partial(&self) -> bool {
        self.control_code().is_some_and(|c| c.has_follow_up())
    }
}

fn put_biased(buf: &mut BytesMut, data: &[u8]) {
    for &b in data.iter().rev() {
        buf.put_u8(b.wrapping_add(DATA_BIAS));
    }
}

fn unbias(data: &[u8]) -> Bytes {
    data.iter().rev().map(|b| b.wrapping_sub(DATA_BIAS)).collect()
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("address", &hex::encode(self.address))
            .field("control", &format!("0x{:02X}", self.control))
            .field("identifier", &hex::encode(&self.identifier))
            .field("payload", &hex::encode(&self.payload))
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let address = self
            .address_string()
            .unwrap_or_else(|_| hex::encode(self.address));

        match self.control_code() {
            Some(code) => write!(f, "Frame[{}]", code)?,
            None => write!(f, "Frame[0x{:02X}]", self.control)?,
        }

        write!(
            f,
            "(address={}, id={}, len={})",
            address,
            hex::encode(&self.identifier),
            self.payload.len()
        )
    }
}
