use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::metadata::Metadata;

/// Frame header: flag (1) + big-endian length (4) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// Flag byte for a message payload frame.
pub const DATA_FLAG: u8 = 0x00;

/// Flag byte for the trailer frame.
pub const TRAILER_FLAG: u8 = 0x80;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// A self-delimited unit on the wire: a message payload or the trailer
/// block that ends the stream.
///
/// Invariant (enforced by the stream drivers, not the codec): a stream
/// contains at most one `Trailer`, always as its last frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// An opaque message payload.
    Data(Bytes),
    /// Trailing metadata, including the terminal status keys.
    Trailer(Metadata),
}

impl Frame {
    /// The flag byte this frame encodes with.
    pub fn flag(&self) -> u8 {
        match self {
            Frame::Data(_) => DATA_FLAG,
            Frame::Trailer(_) => TRAILER_FLAG,
        }
    }

    /// Whether this is the stream-terminating trailer frame.
    pub fn is_trailer(&self) -> bool {
        matches!(self, Frame::Trailer(_))
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────────┬──────────────┬──────────────────┐
/// │ Flag (1B)      │ Length       │ Payload          │
/// │ 0x00 data      │ (4B BE)      │ (Length bytes)   │
/// │ 0x80 trailer   │              │                  │
/// └────────────────┴──────────────┴──────────────────┘
/// ```
///
/// A trailer's payload is its metadata serialized as `key: value\r\n`
/// lines, one line per value.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let payload = match frame {
        Frame::Data(payload) => payload.clone(),
        Frame::Trailer(metadata) => metadata.to_wire(),
    };
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(frame.flag());
    dst.put_u32(payload.len() as u32);
    dst.put_slice(&payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let flag = src[0];
    if flag != DATA_FLAG && flag != TRAILER_FLAG {
        return Err(FrameError::InvalidFlag(flag));
    }

    let payload_len = u32::from_be_bytes(src[1..5].try_into().unwrap()) as usize;

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    match flag {
        DATA_FLAG => Ok(Some(Frame::Data(payload))),
        _ => Ok(Some(Frame::Trailer(Metadata::from_wire(&payload)?))),
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
