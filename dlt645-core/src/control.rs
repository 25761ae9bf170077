//! DL/T 645 control codes

use std::fmt;

use crate::error::{Error, Result};

/// Control codes for the read family of commands.
///
/// Bit 7 marks the direction (slave reply), bit 6 an abnormal reply and
/// bit 5 that follow-up frames are pending.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlCode {
    // Requests
    Read = 0x11,
    ReadFollowUp = 0x12,

    // Normal replies
    ReadReply = 0x91,
    ReadFollowUpReply = 0x92,

    // Replies with more data to follow
    ReadReplyPartial = 0xB1,
    ReadFollowUpReplyPartial = 0xB2,

    // Abnormal replies
    ReadError = 0xD1,
    ReadFollowUpError = 0xD2,
}

impl ControlCode {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::ReadFollowUp => "READ_FOLLOW_UP",
            Self::ReadReply => "READ_REPLY",
            Self::ReadFollowUpReply => "READ_FOLLOW_UP_REPLY",
            Self::ReadReplyPartial => "READ_REPLY_PARTIAL",
            Self::ReadFollowUpReplyPartial => "READ_FOLLOW_UP_REPLY_PARTIAL",
            Self::ReadError => "READ_ERROR",
            Self::ReadFollowUpError => "READ_FOLLOW_UP_ERROR",
        }
    }

    /// Check if this code is sent by the meter
    pub fn is_reply(&self) -> bool {
        is_reply(*self as u8)
    }

    /// Check if this code reports an abnormal reply
    pub fn is_error(&self) -> bool {
        is_error(*self as u8)
    }

    /// Check if more frames follow this one
    pub fn has_follow_up(&self) -> bool {
        matches!(self, Self::ReadReplyPartial | Self::ReadFollowUpReplyPartial)
    }

    /// Reply codes a meter may answer this request with
    pub fn expected_replies(&self) -> &'static [ControlCode] {
        match self {
            Self::Read => &[Self::ReadReply, Self::ReadReplyPartial, Self::ReadError],
            Self::ReadFollowUp => &[
                Self::ReadFollowUpReply,
                Self::ReadFollowUpReplyPartial,
                Self::ReadFollowUpError,
            ],
            _ => &[],
        }
    }
}

/// Raw check for the direction bit
pub fn is_reply(control: u8) -> bool {
    control & 0x80 != 0
}

/// Raw check for the two reserved read-error codes
pub fn is_error(control: u8) -> bool {
    control == ControlCode::ReadError as u8 || control == ControlCode::ReadFollowUpError as u8
}

impl From<ControlCode> for u8 {
    fn from(code: ControlCode) -> u8 {
        code as u8
    }
}

impl TryFrom<u8> for ControlCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x11 => Ok(Self::Read),
            0x12 => Ok(Self::ReadFollowUp),
            0x91 => Ok(Self::ReadReply),
            0x92 => Ok(Self::ReadFollowUpReply),
            0xB1 => Ok(Self::ReadReplyPartial),
            0xB2 => Ok(Self::ReadFollowUpReplyPartial),
            0xD1 => Ok(Self::ReadError),
            0xD2 => Ok(Self::ReadFollowUpError),
            _ => Err(Error::UnknownControlCode(value)),
        }
    }
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}
