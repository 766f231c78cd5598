use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use webtrail_transport::BridgeStream;

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
/// A clean end of stream between frames yields `Ok(None)`; end of stream
/// partway through a frame is fatal ([`FrameError::IncompleteFrame`]).
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Ok(None)` when the stream is closed on a frame boundary;
    /// an empty stream produces zero frames without error.
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                return Ok(Some(frame));
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(FrameError::IncompleteFrame {
                    buffered: self.buf.len(),
                });
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<BridgeStream> {
    /// Create a frame reader for a `BridgeStream` and apply the read
    /// timeout from config.
    pub fn with_config_bridge(inner: BridgeStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: webtrail_transport::TransportError) -> FrameError {
    match err {
        webtrail_transport::TransportError::Io(io)
        | webtrail_transport::TransportError::Accept(io) => FrameError::Io(io),
        webtrail_transport::TransportError::Bind { source, .. }
        | webtrail_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, Bytes, BytesMut};

    use super::*;
    use crate::codec::{encode_frame, DATA_FLAG, TRAILER_FLAG};
    use crate::metadata::Metadata;

    fn data(payload: &'static [u8]) -> Frame {
        Frame::Data(Bytes::from_static(payload))
    }

    fn wire(frames: &[Frame]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for frame in frames {
            encode_frame(frame, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn read_single_frame() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[data(b"hello")])));
        assert_eq!(reader.read_frame().unwrap(), Some(data(b"hello")));
        assert_eq!(reader.read_frame().unwrap(), None);
    }

    #[test]
    fn read_messages_then_trailer_in_order() {
        let mut md = Metadata::new();
        md.append("grpc-status", "0");
        let frames = [data(b"one"), data(b"two"), Frame::Trailer(md)];
        let mut reader = FrameReader::new(Cursor::new(wire(&frames)));

        assert_eq!(reader.read_frame().unwrap(), Some(data(b"one")));
        assert_eq!(reader.read_frame().unwrap(), Some(data(b"two")));
        assert!(reader.read_frame().unwrap().unwrap().is_trailer());
        assert_eq!(reader.read_frame().unwrap(), None);
    }

    #[test]
    fn read_frame_with_large_payload() {
        let payload = vec![0xAB; 64 * 1024];
        let mut buf = BytesMut::new();
        encode_frame(&Frame::Data(Bytes::from(payload.clone())), &mut buf).unwrap();

        let mut reader = FrameReader::new(Cursor::new(buf.to_vec()));
        let frame = reader.read_frame().unwrap().unwrap();
        assert_eq!(frame, Frame::Data(Bytes::from(payload)));
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&[data(b"slow")]),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);
        assert_eq!(reader.read_frame().unwrap(), Some(data(b"slow")));
    }

    #[test]
    fn empty_stream_yields_zero_frames() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        assert_eq!(reader.read_frame().unwrap(), None);
        // Restartable: asking again still reports a clean end.
        assert_eq!(reader.read_frame().unwrap(), None);
    }

    #[test]
    fn stream_closed_mid_frame_is_fatal() {
        let mut partial = BytesMut::new();
        partial.put_u8(DATA_FLAG);
        partial.put_u32(16);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::IncompleteFrame { .. }));
    }

    #[test]
    fn stream_closed_mid_header_is_fatal() {
        let mut reader = FrameReader::new(Cursor::new(vec![DATA_FLAG, 0x00]));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::IncompleteFrame { buffered: 2 }));
    }

    #[test]
    fn invalid_flag_in_stream() {
        let bytes = vec![0x01, 0x00, 0x00, 0x00, 0x00];
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::InvalidFlag(0x01)));
    }

    #[test]
    fn oversized_frame_in_stream() {
        let mut bytes = BytesMut::new();
        bytes.put_u8(TRAILER_FLAG);
        bytes.put_u32(1024);

        let cfg = FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(bytes.to_vec()), cfg);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            state: 0,
            bytes: wire(&[data(b"ok")]),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        assert_eq!(framed.read_frame().unwrap(), Some(data(b"ok")));
    }

    struct InterruptedThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn io_error_propagates() {
        struct FailingReader;
        impl Read for FailingReader {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(ErrorKind::ConnectionReset))
            }
        }

        let mut reader = FrameReader::new(FailingReader);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::ConnectionReset));
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_stream_pair() {
        let (left, right) = BridgeStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        writer.send_data(b"ping").unwrap();
        assert_eq!(reader.read_frame().unwrap(), Some(data(b"ping")));
    }

    #[test]
    #[cfg(unix)]
    fn shutdown_mid_frame_observed_as_incomplete() {
        use std::io::Write;

        let (mut left, right) = BridgeStream::pair().unwrap();
        // Header promising 16 bytes, then only part of the payload.
        left.write_all(&[DATA_FLAG, 0x00, 0x00, 0x00, 0x10]).unwrap();
        left.write_all(b"short").unwrap();
        left.shutdown().unwrap();

        let mut reader = FrameReader::new(right);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::IncompleteFrame { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn applies_read_timeout_for_bridge_stream() {
        let (left, _right) = BridgeStream::pair().unwrap();
        let cfg = FrameConfig {
            read_timeout: Some(std::time::Duration::from_millis(10)),
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config_bridge(left, cfg).unwrap();
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(_)));
    }
}
