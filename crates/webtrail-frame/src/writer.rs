use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use webtrail_transport::BridgeStream;

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::metadata::Metadata;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
///
/// Every frame is flushed to the transport before the write call returns,
/// so a peer observes each message as it is produced rather than as a
/// buffered batch at end of stream. Streaming with configured per-message
/// latency depends on this.
#[derive(Debug)]
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write a complete frame and flush it (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if let Frame::Data(payload) = frame {
            if payload.len() > self.config.max_payload_size {
                return Err(FrameError::PayloadTooLarge {
                    size: payload.len(),
                    max: self.config.max_payload_size,
                });
            }
        }

        self.buf.clear();
        encode_frame(frame, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Encode and send a message payload as a data frame.
    pub fn send_data(&mut self, payload: &[u8]) -> Result<()> {
        self.write_frame(&Frame::Data(bytes::Bytes::copy_from_slice(payload)))
    }

    /// Encode and send the stream-terminating trailer frame.
    pub fn send_trailer(&mut self, metadata: &Metadata) -> Result<()> {
        self.write_frame(&Frame::Trailer(metadata.clone()))
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
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

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<BridgeStream> {
    /// Create a frame writer for a `BridgeStream` and apply the write
    /// timeout from config.
    pub fn with_config_bridge(inner: BridgeStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(crate::reader::transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use bytes::{Bytes, BytesMut};

    use super::*;
    use crate::codec::{decode_frame, DEFAULT_MAX_PAYLOAD};

    fn decode_all(bytes: &[u8]) -> Vec<Frame> {
        let mut buf = BytesMut::from(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap() {
            frames.push(frame);
        }
        assert!(buf.is_empty());
        frames
    }

    #[test]
    fn write_single_data_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send_data(b"hello").unwrap();

        let frames = decode_all(writer.into_inner().get_ref());
        assert_eq!(frames, [Frame::Data(Bytes::from_static(b"hello"))]);
    }

    #[test]
    fn write_messages_then_trailer() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send_data(b"one").unwrap();
        writer.send_data(b"two").unwrap();

        let mut md = Metadata::new();
        md.append("grpc-status", "0");
        writer.send_trailer(&md).unwrap();

        let frames = decode_all(writer.into_inner().get_ref());
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], Frame::Data(Bytes::from_static(b"one")));
        assert_eq!(frames[1], Frame::Data(Bytes::from_static(b"two")));
        match &frames[2] {
            Frame::Trailer(trailer) => assert_eq!(trailer.first("grpc-status"), Some("0")),
            other => panic!("expected trailer, got {other:?}"),
        }
    }

    #[test]
    fn payload_too_large_rejected() {
        let cfg = FrameConfig {
            max_payload_size: 4,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);

        let err = writer.send_data(b"oversized").unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn every_frame_is_flushed() {
        let sink = FlushCountingWriter::default();
        let flushes = Arc::clone(&sink.flushes);
        let mut writer = FrameWriter::new(sink);

        writer.send_data(b"a").unwrap();
        writer.send_data(b"b").unwrap();
        writer.send_trailer(&Metadata::new()).unwrap();

        assert_eq!(flushes.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let writer_impl = FlakyWriter {
            write_err: Some(ErrorKind::Interrupted),
            flush_err: Some(ErrorKind::Interrupted),
            data: Vec::new(),
        };

        let mut writer = FrameWriter::new(writer_impl);
        writer.send_data(b"retry").unwrap();
        assert!(!writer.into_inner().data.is_empty());
    }

    #[test]
    fn handles_would_block_write_and_flush() {
        let writer_impl = FlakyWriter {
            write_err: Some(ErrorKind::WouldBlock),
            flush_err: Some(ErrorKind::WouldBlock),
            data: Vec::new(),
        };

        let mut writer = FrameWriter::new(writer_impl);
        writer.send_data(b"retry").unwrap();
        assert!(!writer.into_inner().data.is_empty());
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        struct ZeroWriter;
        impl Write for ZeroWriter {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send_data(b"x").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    #[cfg(unix)]
    fn send_after_peer_shutdown_fails_fast() {
        let (left, right) = BridgeStream::pair().unwrap();
        right.shutdown().unwrap();

        let mut writer = FrameWriter::new(left);
        // The first write may succeed into the socket buffer; a
        // subsequent one must fail rather than block.
        let mut saw_error = false;
        for _ in 0..4 {
            if writer.send_data(b"after-close").is_err() {
                saw_error = true;
                break;
            }
        }
        assert!(saw_error, "writes to a shut-down stream must fail");
    }

    #[derive(Default)]
    struct FlushCountingWriter {
        flushes: Arc<AtomicUsize>,
        data: Vec<u8>,
    }

    impl Write for FlushCountingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Fails the first write and first flush with the configured kind,
    /// then behaves normally.
    struct FlakyWriter {
        write_err: Option<ErrorKind>,
        flush_err: Option<ErrorKind>,
        data: Vec<u8>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if let Some(kind) = self.write_err.take() {
                return Err(std::io::Error::from(kind));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if let Some(kind) = self.flush_err.take() {
                return Err(std::io::Error::from(kind));
            }
            Ok(())
        }
    }
}
