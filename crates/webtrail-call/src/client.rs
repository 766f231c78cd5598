use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;

use bytes::Bytes;
use tracing::debug;
use webtrail_frame::{Frame, FrameConfig, FrameReader, FrameWriter, Metadata};
use webtrail_transport::{BridgeSocket, BridgeStream};

use crate::error::{CallError, Result};
use crate::preamble::{self, RequestPreamble};
use crate::status::{Status, Terminal};

/// One RPC invocation, client side.
///
/// `start` connects, sends the request preamble plus a single request
/// frame, and hands the receive half to a dedicated decode thread. The
/// decode loop and the caller meet at a rendezvous channel bounded to
/// one buffered item: the decode loop blocks until the caller consumes,
/// which is the whole backpressure story.
///
/// The caller observes the call only through accessors; driver state is
/// owned by the call and its decode thread. Exactly one terminal outcome
/// is delivered, and `recv` keeps reporting it once reached.
pub struct Call {
    events: Receiver<CallEvent>,
    cancel: CancelHandle,
    driver: Option<JoinHandle<()>>,
    leading: Option<Metadata>,
    trailing: Option<Metadata>,
    terminal: Option<Terminal>,
}

enum CallEvent {
    Leading(Metadata),
    Message(Bytes),
    Terminal(Terminal, Option<Metadata>),
}

/// Cloneable handle that cancels a call from any thread.
///
/// Cancelling forcibly closes the transport; the decode loop observes
/// the closed stream and posts a fault-class terminal. Messages already
/// handed off are still delivered to the caller first.
#[derive(Clone)]
pub struct CancelHandle {
    stream: Arc<BridgeStream>,
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Cancel the call. Safe to invoke more than once.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!("cancelling call, shutting down transport");
        }
        let _ = self.stream.shutdown();
    }

    /// Whether cancel has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Call {
    /// Start a call against a bound endpoint path.
    ///
    /// Blocks until the server's leading metadata arrives (or the call
    /// reaches a terminal state first, e.g. an immediate drop).
    pub fn start(
        endpoint: impl AsRef<Path>,
        method: &str,
        request: &[u8],
        metadata: Metadata,
    ) -> Result<Call> {
        Self::start_with_config(endpoint, method, request, metadata, FrameConfig::default())
    }

    /// Start a call with explicit frame configuration.
    pub fn start_with_config(
        endpoint: impl AsRef<Path>,
        method: &str,
        request: &[u8],
        metadata: Metadata,
        config: FrameConfig,
    ) -> Result<Call> {
        let stream = BridgeSocket::connect(endpoint)?;
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        Self::start_on(stream, method, request, metadata, config)
    }

    /// Start a call over an already-connected stream.
    ///
    /// The stream must be exclusively owned by this call.
    pub fn start_on(
        mut stream: BridgeStream,
        method: &str,
        request: &[u8],
        metadata: Metadata,
        config: FrameConfig,
    ) -> Result<Call> {
        preamble::write_request(
            &mut stream,
            &RequestPreamble {
                path: method.to_string(),
                metadata,
            },
        )?;

        let mut writer = FrameWriter::with_config(stream, config.clone());
        writer.send_data(request)?;
        let stream = writer.into_inner();

        let cancel = CancelHandle {
            stream: Arc::new(stream.try_clone()?),
            cancelled: Arc::new(AtomicBool::new(false)),
        };

        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        let cancelled = Arc::clone(&cancel.cancelled);
        let driver = std::thread::Builder::new()
            .name("webtrail-call-decode".to_string())
            .spawn(move || drive(stream, config, tx, cancelled))
            .map_err(|err| CallError::Frame(webtrail_frame::FrameError::Io(err)))?;

        let mut call = Call {
            events: rx,
            cancel,
            driver: Some(driver),
            leading: None,
            trailing: None,
            terminal: None,
        };
        call.wait_for_leading();
        Ok(call)
    }

    /// Block until the decode thread reports leading metadata or a
    /// terminal. Either way the call is constructed; a terminal-at-birth
    /// call surfaces its outcome on the first `recv`.
    fn wait_for_leading(&mut self) {
        match self.events.recv() {
            Ok(CallEvent::Leading(metadata)) => self.leading = Some(metadata),
            Ok(CallEvent::Terminal(terminal, trailing)) => {
                self.trailing = trailing;
                self.terminal = Some(terminal);
            }
            Ok(CallEvent::Message(_)) | Err(_) => {
                // The driver always reports leading metadata or a
                // terminal first; a vanished driver is a fault.
                self.terminal = Some(Terminal::fault("stream driver exited unexpectedly"));
            }
        }
    }

    /// Receive the next message (blocking).
    ///
    /// Messages arrive in exact frame order. At the terminal:
    /// `Ok(None)` for an OK trailer, [`CallError::Application`] for an
    /// explicit nonzero status, [`CallError::TransportFault`] when the
    /// stream closed (or was cancelled) without a trailer. Calling again
    /// after the terminal repeats the same outcome.
    pub fn recv(&mut self) -> Result<Option<Bytes>> {
        if let Some(terminal) = &self.terminal {
            return terminal_outcome(terminal);
        }
        loop {
            match self.events.recv() {
                Ok(CallEvent::Leading(metadata)) => {
                    self.leading.get_or_insert(metadata);
                }
                Ok(CallEvent::Message(payload)) => return Ok(Some(payload)),
                Ok(CallEvent::Terminal(terminal, trailing)) => {
                    self.trailing = trailing;
                    let outcome = terminal_outcome(&terminal);
                    self.terminal = Some(terminal);
                    return outcome;
                }
                Err(_) => {
                    let terminal = Terminal::fault("stream driver exited unexpectedly");
                    let outcome = terminal_outcome(&terminal);
                    self.terminal = Some(terminal);
                    return outcome;
                }
            }
        }
    }

    /// Drain remaining messages and return the terminal classification.
    pub fn finish(&mut self) -> Terminal {
        loop {
            match self.recv() {
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => break,
            }
        }
        self.terminal
            .clone()
            .unwrap_or_else(|| Terminal::fault("no terminal recorded"))
    }

    /// Leading metadata, once received. Read-only to the caller.
    pub fn leading_metadata(&self) -> Option<&Metadata> {
        self.leading.as_ref()
    }

    /// Trailing metadata, populated once when a trailer frame arrives.
    pub fn trailing_metadata(&self) -> Option<&Metadata> {
        self.trailing.as_ref()
    }

    /// Terminal classification, once the call has ended.
    pub fn terminal(&self) -> Option<&Terminal> {
        self.terminal.as_ref()
    }

    /// A handle that cancels this call from any thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Cancel the call from the consuming thread.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        // Close the transport so the decode thread unblocks; it exits on
        // its own once the event receiver goes away with this struct.
        if self.terminal.is_none() {
            self.cancel.cancel();
        }
        if let Some(driver) = self.driver.take() {
            if self.terminal.is_some() {
                let _ = driver.join();
            }
        }
    }
}

fn terminal_outcome(terminal: &Terminal) -> Result<Option<Bytes>> {
    match terminal {
        Terminal::Ok(_) => Ok(None),
        Terminal::Error(status) => Err(CallError::Application(status.clone())),
        Terminal::Fault(status) => Err(CallError::TransportFault(status.message.clone())),
    }
}

/// Decode loop. Owns the receive half of the stream for the lifetime of
/// the call; every send below blocks until the caller consumes the
/// previous event, bounding buffered messages to one.
fn drive(
    mut stream: impl Read,
    config: FrameConfig,
    events: SyncSender<CallEvent>,
    cancelled: Arc<AtomicBool>,
) {
    let fault = |context: &str| {
        if cancelled.load(Ordering::SeqCst) {
            Terminal::fault("call cancelled")
        } else {
            Terminal::fault(context.to_string())
        }
    };

    let leading = match preamble::read_response(&mut stream) {
        Ok(metadata) => metadata,
        Err(err) => {
            let _ = events.send(CallEvent::Terminal(
                fault(&format!("stream closed before leading metadata: {err}")),
                None,
            ));
            return;
        }
    };
    if events.send(CallEvent::Leading(leading)).is_err() {
        return;
    }

    let mut reader = FrameReader::with_config(stream, config);
    loop {
        match reader.read_frame() {
            Ok(Some(Frame::Data(payload))) => {
                if events.send(CallEvent::Message(payload)).is_err() {
                    return;
                }
            }
            Ok(Some(Frame::Trailer(trailer))) => {
                // The trailer is authoritative and always last; anything
                // after it on the wire is ignored.
                let terminal = Terminal::from_trailer(&trailer).unwrap_or_else(|err| {
                    Terminal::Error(Status::internal(err.to_string()))
                });
                let _ = events.send(CallEvent::Terminal(terminal, Some(trailer)));
                return;
            }
            Ok(None) => {
                let _ = events.send(CallEvent::Terminal(
                    fault("stream closed before trailer"),
                    None,
                ));
                return;
            }
            Err(err) => {
                let _ = events.send(CallEvent::Terminal(
                    fault(&format!("stream failed before trailer: {err}")),
                    None,
                ));
                return;
            }
        }
    }
}
