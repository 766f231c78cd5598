//! Length-prefixed message and trailer framing for the webtrail bridge.
//!
//! Transports without native trailers (HTTP/1.1, plain byte streams)
//! cannot deliver end-of-call metadata out of band, so every unit on the
//! wire is framed:
//! - A 1-byte flag (0x00 = message payload, 0x80 = trailer block)
//! - A 4-byte big-endian payload length
//! - The payload itself
//!
//! A stream carries zero or more data frames followed by at most one
//! trailer frame, always last. The trailer payload is a [`Metadata`]
//! block serialized as `key: value` lines, one per value, so the single
//! byte stream can carry an unbounded message sequence plus one metadata
//! block, decodable with no look-ahead beyond the fixed 5-byte header.

pub mod codec;
pub mod error;
pub mod metadata;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, DATA_FLAG, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
    TRAILER_FLAG,
};
pub use error::{FrameError, Result};
pub use metadata::Metadata;
pub use reader::FrameReader;
pub use writer::FrameWriter;
