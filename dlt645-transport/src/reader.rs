//! Response frame reassembly
//!
//! A byte-stream channel may hand a reply over in several pieces. The reader
//! keeps reading until the length field says the frame is complete, or the
//! deadline passes.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{Instant, timeout_at};
use tracing::trace;

use dlt645_core::Frame;
use dlt645_core::constants::{PREAMBLE, START_MARKER};

use crate::error::*;

/// Read one complete frame from `reader`
///
/// Leading `0xFE` wake-up bytes are dropped. If the bytes that arrive cannot
/// be the start of a frame they are returned as-is so the decoder can report
/// them. Bytes after the end of the frame are discarded.
pub async fn read_frame<R>(reader: &mut R, deadline: Option<Instant>) -> Result<BytesMut>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = BytesMut::with_capacity(Frame::MAX_SIZE);

    loop {
        let n = match deadline {
            Some(deadline) => timeout_at(deadline, reader.read_buf(&mut buf))
                .await
                .map_err(|_| Error::ReadTimeout)??,
            None => reader.read_buf(&mut buf).await?,
        };

        if n == 0 {
            return Err(Error::ConnectionClosed);
        }

        let preamble = buf.iter().take_while(|&&b| b == PREAMBLE).count();
        buf.advance(preamble);

        if let Some(len) = complete_len(&buf) {
            if buf.len() > len {
                trace!("Discarding {} trailing bytes", buf.len() - len);
            }
            return Ok(buf.split_to(len));
        }

        trace!("Partial frame: {} bytes buffered", buf.len());
    }
}

fn complete_len(buf: &[u8]) -> Option<usize> {
    let misframed = buf.first().is_some_and(|&b| b != START_MARKER)
        || buf.get(7).is_some_and(|&b| b != START_MARKER);

    if misframed {
        return Some(buf.len());
    }

    Frame::expected_len(buf).filter(|&len| buf.len() >= len)
}
