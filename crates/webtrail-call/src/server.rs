use std::path::Path;

use bytes::Bytes;
use tracing::debug;
use webtrail_frame::{Frame, FrameConfig, FrameReader, FrameWriter, Metadata};
use webtrail_transport::{BridgeSocket, BridgeStream};

use crate::error::{CallError, Result};
use crate::preamble::{self, CONTENT_TYPE, CONTENT_TYPE_KEY};
use crate::status::Status;

/// Server side of the bridge: accepts connections, reads one call per
/// connection, and hands the response half to the handler.
pub struct CallListener {
    socket: BridgeSocket,
    config: FrameConfig,
}

impl CallListener {
    /// Bind a listener at the given endpoint path.
    pub fn bind(endpoint: impl AsRef<Path>) -> Result<CallListener> {
        Ok(CallListener {
            socket: BridgeSocket::bind(endpoint)?,
            config: FrameConfig::default(),
        })
    }

    /// Replace the frame configuration used for accepted calls.
    pub fn with_frame_config(mut self, config: FrameConfig) -> CallListener {
        self.config = config;
        self
    }

    /// The endpoint path this listener is bound to.
    pub fn endpoint(&self) -> &Path {
        self.socket.path()
    }

    /// Accept one connection and read the call off it: the request
    /// preamble, then exactly one request frame. Blocks until a client
    /// connects and the request is complete.
    pub fn accept(&self) -> Result<(IncomingCall, ServerStream)> {
        let stream = self.socket.accept()?;
        stream.set_read_timeout(self.config.read_timeout)?;
        stream.set_write_timeout(self.config.write_timeout)?;
        accept_on(stream, self.config.clone())
    }
}

/// Read one call off an already-connected stream.
///
/// Split out of [`CallListener::accept`] so tests can drive a call over
/// a socketpair without binding a filesystem endpoint.
pub fn accept_on(mut stream: BridgeStream, config: FrameConfig) -> Result<(IncomingCall, ServerStream)> {
    let request_preamble = preamble::read_request(&mut stream)?;

    // The response half shares the descriptor; the reader half is
    // dropped once the single request frame is in.
    let response_stream = stream.try_clone()?;
    let mut reader = FrameReader::with_config(stream, config.clone());
    let request = match reader.read_frame() {
        Ok(Some(Frame::Data(payload))) => payload,
        Ok(Some(Frame::Trailer(_))) => {
            return Err(CallError::ContractViolation(
                "trailer frame in request position".to_string(),
            ))
        }
        Ok(None) => {
            return Err(CallError::TransportFault(
                "client closed before sending a request".to_string(),
            ))
        }
        Err(err) => return Err(err.into()),
    };

    debug!(
        path = %request_preamble.path,
        request_len = request.len(),
        "accepted call"
    );

    let mut leading = Metadata::new();
    leading.append(CONTENT_TYPE_KEY, CONTENT_TYPE);

    let call = IncomingCall {
        path: request_preamble.path,
        metadata: request_preamble.metadata,
        request,
    };
    let stream = ServerStream {
        writer: FrameWriter::with_config(response_stream, config),
        leading,
        leading_sent: false,
        trailing: Metadata::new(),
        sealed: false,
    };
    Ok((call, stream))
}

/// A fully-received request: method path, client metadata, and the
/// single request message.
#[derive(Debug)]
pub struct IncomingCall {
    pub path: String,
    pub metadata: Metadata,
    pub request: Bytes,
}

/// The response half of an accepted call.
///
/// Leading metadata goes out at most once, before the first message;
/// after that the stream only accepts messages until `finish` seals it
/// with a trailer, or `abort` tears the transport down with no trailer
/// at all. Both terminal operations consume the stream, so the type
/// system rules out frames after the trailer. A contract violation
/// seals the stream itself: the client receives an internal-class
/// trailer and every later operation fails.
#[derive(Debug)]
pub struct ServerStream {
    writer: FrameWriter<BridgeStream>,
    leading: Metadata,
    leading_sent: bool,
    trailing: Metadata,
    sealed: bool,
}

impl ServerStream {
    /// Stage leading metadata to accompany the response preamble.
    ///
    /// Calling this after the first write is fatal to the call: the
    /// stream seals itself with an internal-class trailer, the client
    /// observes that terminal, and no further sends are possible.
    pub fn send_leading_metadata(&mut self, metadata: Metadata) -> Result<()> {
        if self.leading_sent {
            self.seal(Status::internal("leading metadata after first message"));
            return Err(CallError::ContractViolation(
                "leading metadata after first write".to_string(),
            ));
        }
        self.leading.merge(metadata);
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.sealed {
            return Err(CallError::ContractViolation(
                "stream already sealed".to_string(),
            ));
        }
        Ok(())
    }

    /// Best-effort terminal write for the violation path; the trailer
    /// is the last frame whether or not the transport cooperates.
    fn seal(&mut self, status: Status) {
        self.sealed = true;
        let mut trailer = std::mem::take(&mut self.trailing);
        status.append_to(&mut trailer);
        if let Err(err) = self.writer.send_trailer(&trailer) {
            debug!(error = %err, "failed sealing stream after contract violation");
        }
    }

    fn flush_leading(&mut self) -> Result<()> {
        if self.leading_sent {
            return Ok(());
        }
        preamble::write_response(self.writer.get_mut(), &self.leading)?;
        self.leading_sent = true;
        Ok(())
    }

    /// Send one response message. Each message is flushed to the
    /// transport immediately so a slow stream delivers messages as they
    /// are produced, not in a burst at the end.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.flush_leading()?;
        self.writer.send_data(payload)?;
        Ok(())
    }

    /// Merge metadata into the trailer that `finish` will send.
    pub fn set_trailing_metadata(&mut self, metadata: Metadata) {
        self.trailing.merge(metadata);
    }

    /// Seal the stream with a trailer carrying the given status, OK or
    /// not, plus any staged trailing metadata. Always the last frame.
    pub fn finish(mut self, status: Status) -> Result<()> {
        self.ensure_open()?;
        self.flush_leading()?;
        let mut trailer = std::mem::take(&mut self.trailing);
        status.append_to(&mut trailer);
        self.writer.send_trailer(&trailer)?;
        Ok(())
    }

    /// Tear the transport down without a trailer. The peer observes the
    /// close as a transport fault, never as a completed call.
    pub fn abort(self) {
        debug!("aborting call without trailer");
        let _ = self.writer.into_inner().shutdown();
    }
}
