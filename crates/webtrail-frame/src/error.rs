/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header carries a flag byte that is neither data (0x00)
    /// nor trailer (0x80).
    #[error("invalid frame flag 0x{0:02x} (expected 0x00 or 0x80)")]
    InvalidFlag(u8),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A trailer frame payload failed to parse as metadata lines.
    #[error("malformed trailer block: {0}")]
    MalformedTrailer(String),

    /// The stream ended partway through a frame. Fatal to the stream;
    /// distinct from a clean end between frames.
    #[error("stream ended mid-frame ({buffered} bytes buffered)")]
    IncompleteFrame { buffered: usize },

    /// The connection was closed while writing a frame.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
