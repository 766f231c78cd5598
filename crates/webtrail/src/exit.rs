use std::fmt;
use std::io;

use webtrail_call::CallError;
use webtrail_frame::FrameError;
use webtrail_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } | FrameError::MalformedTrailer(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed | FrameError::IncompleteFrame { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn call_error(context: &str, err: CallError) -> CliError {
    match err {
        CallError::Transport(err) => transport_error(context, err),
        CallError::Frame(err) => frame_error(context, err),
        CallError::Preamble(_) | CallError::MalformedStatus(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        // An explicit nonzero status is a completed call that failed;
        // plain failure, not a transport-class exit.
        CallError::Application(status) => CliError::new(FAILURE, format!("{context}: {status}")),
        CallError::TransportFault(_) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        CallError::ContractViolation(_) => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}
