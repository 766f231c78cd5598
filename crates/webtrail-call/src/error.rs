use crate::status::Status;

/// Errors that can occur in call operations.
///
/// Everything here surfaces to the caller as the call's terminal
/// outcome; nothing is swallowed and nothing is retried by the bridge.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] webtrail_transport::TransportError),

    /// Frame-level error. Fatal to the stream, never retried.
    #[error("frame error: {0}")]
    Frame(#[from] webtrail_frame::FrameError),

    /// The pre-frame preamble was malformed or oversized.
    #[error("invalid preamble: {0}")]
    Preamble(String),

    /// A trailer frame arrived without a parseable status code.
    #[error("trailer missing a valid status: {0}")]
    MalformedStatus(String),

    /// Explicit nonzero status from the peer, surfaced verbatim.
    #[error("call failed: {0}")]
    Application(Status),

    /// The stream closed before a terminal status frame was received.
    /// Unavailable-class; distinct from an explicit application error.
    /// Callers may choose to retry; the bridge never does.
    #[error("transport fault: {0}")]
    TransportFault(String),

    /// The call API was used outside its contract, e.g. leading
    /// metadata sent after the first message. Internal-class, fatal.
    #[error("contract violation: {0}")]
    ContractViolation(String),
}

pub type Result<T> = std::result::Result<T, CallError>;
