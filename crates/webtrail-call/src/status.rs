use std::fmt;

use webtrail_frame::Metadata;

use crate::error::CallError;

/// Reserved trailer key carrying the numeric terminal status code.
pub const STATUS_KEY: &str = "grpc-status";

/// Reserved trailer key carrying the human-readable status message.
pub const MESSAGE_KEY: &str = "grpc-message";

/// Numeric status codes.
///
/// The set follows the gRPC convention; any `u32` is a legal code on the
/// wire, these are the ones the bridge itself produces or names.
pub mod code {
    pub const OK: u32 = 0;
    pub const CANCELLED: u32 = 1;
    pub const UNKNOWN: u32 = 2;
    pub const INVALID_ARGUMENT: u32 = 3;
    pub const DEADLINE_EXCEEDED: u32 = 4;
    pub const NOT_FOUND: u32 = 5;
    pub const ALREADY_EXISTS: u32 = 6;
    pub const PERMISSION_DENIED: u32 = 7;
    pub const RESOURCE_EXHAUSTED: u32 = 8;
    pub const FAILED_PRECONDITION: u32 = 9;
    pub const ABORTED: u32 = 10;
    pub const OUT_OF_RANGE: u32 = 11;
    pub const UNIMPLEMENTED: u32 = 12;
    pub const INTERNAL: u32 = 13;
    pub const UNAVAILABLE: u32 = 14;
    pub const DATA_LOSS: u32 = 15;
    pub const UNAUTHENTICATED: u32 = 16;
}

/// Returns a human-readable name for a status code.
pub fn code_name(code: u32) -> &'static str {
    match code {
        code::OK => "OK",
        code::CANCELLED => "CANCELLED",
        code::UNKNOWN => "UNKNOWN",
        code::INVALID_ARGUMENT => "INVALID_ARGUMENT",
        code::DEADLINE_EXCEEDED => "DEADLINE_EXCEEDED",
        code::NOT_FOUND => "NOT_FOUND",
        code::ALREADY_EXISTS => "ALREADY_EXISTS",
        code::PERMISSION_DENIED => "PERMISSION_DENIED",
        code::RESOURCE_EXHAUSTED => "RESOURCE_EXHAUSTED",
        code::FAILED_PRECONDITION => "FAILED_PRECONDITION",
        code::ABORTED => "ABORTED",
        code::OUT_OF_RANGE => "OUT_OF_RANGE",
        code::UNIMPLEMENTED => "UNIMPLEMENTED",
        code::INTERNAL => "INTERNAL",
        code::UNAVAILABLE => "UNAVAILABLE",
        code::DATA_LOSS => "DATA_LOSS",
        code::UNAUTHENTICATED => "UNAUTHENTICATED",
        _ => "UNRECOGNIZED",
    }
}

/// The code + message pair that ends a call. Exactly one per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: u32,
    pub message: String,
}

impl Status {
    /// Create a status with an explicit code and message.
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Success, no message.
    pub fn ok() -> Self {
        Self::new(code::OK, "")
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(code::INVALID_ARGUMENT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(code::INTERNAL, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(code::UNAVAILABLE, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(code::UNIMPLEMENTED, message)
    }

    pub fn is_ok(&self) -> bool {
        self.code == code::OK
    }

    /// Append the reserved status keys to a trailer metadata block.
    ///
    /// The message key is only written when the message is non-empty, so
    /// a plain OK trailer carries exactly one reserved key.
    pub fn append_to(&self, trailer: &mut Metadata) {
        trailer.set(STATUS_KEY, vec![self.code.to_string()]);
        if !self.message.is_empty() {
            trailer.set(MESSAGE_KEY, vec![self.message.clone()]);
        }
    }

    /// Parse the reserved status keys out of a decoded trailer.
    ///
    /// A trailer without a parseable `grpc-status` is never treated as
    /// success; it is a malformed terminal.
    pub fn from_trailer(trailer: &Metadata) -> Result<Self, CallError> {
        let raw = trailer
            .first(STATUS_KEY)
            .ok_or_else(|| CallError::MalformedStatus(format!("{STATUS_KEY} key absent")))?;
        let code: u32 = raw.trim().parse().map_err(|_| {
            CallError::MalformedStatus(format!("{STATUS_KEY} is not an integer: {raw:?}"))
        })?;
        let message = trailer.first(MESSAGE_KEY).unwrap_or("").to_string();
        Ok(Self { code, message })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{} ({})", code_name(self.code), self.code)
        } else {
            write!(f, "{} ({}): {}", code_name(self.code), self.code, self.message)
        }
    }
}

/// Terminal classification of a call, exactly one per call.
///
/// A decoded trailer with an explicit status code is authoritative;
/// stream loss before any trailer is always a fault, never silently OK;
/// "server finished cleanly" and "connection dropped" stay distinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// The trailer carried code 0.
    Ok(Status),
    /// The trailer carried an explicit nonzero code.
    Error(Status),
    /// The stream closed (or was cancelled) before a trailer arrived.
    /// The status is unavailable-class.
    Fault(Status),
}

impl Terminal {
    /// Classify a decoded trailer.
    pub fn from_trailer(trailer: &Metadata) -> Result<Self, CallError> {
        let status = Status::from_trailer(trailer)?;
        if status.is_ok() {
            Ok(Terminal::Ok(status))
        } else {
            Ok(Terminal::Error(status))
        }
    }

    /// A fault terminal with the given description.
    pub fn fault(message: impl Into<String>) -> Self {
        Terminal::Fault(Status::unavailable(message))
    }

    /// The status carried by this terminal.
    pub fn status(&self) -> &Status {
        match self {
            Terminal::Ok(status) | Terminal::Error(status) | Terminal::Fault(status) => status,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Terminal::Ok(_))
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Terminal::Fault(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_trailer_roundtrip() {
        let mut trailer = Metadata::new();
        Status::ok().append_to(&mut trailer);

        assert_eq!(trailer.len(), 1, "plain OK carries only the status key");
        assert_eq!(trailer.first(STATUS_KEY), Some("0"));

        let status = Status::from_trailer(&trailer).unwrap();
        assert!(status.is_ok());
        assert!(status.message.is_empty());
    }

    #[test]
    fn error_trailer_roundtrip() {
        let mut trailer = Metadata::new();
        Status::invalid_argument("bad request").append_to(&mut trailer);

        let status = Status::from_trailer(&trailer).unwrap();
        assert_eq!(status.code, code::INVALID_ARGUMENT);
        assert_eq!(status.message, "bad request");
    }

    #[test]
    fn status_keys_parse_case_insensitively() {
        let mut trailer = Metadata::new();
        trailer.append("Grpc-Status", "14");
        trailer.append("Grpc-Message", "gone");

        let status = Status::from_trailer(&trailer).unwrap();
        assert_eq!(status.code, code::UNAVAILABLE);
        assert_eq!(status.message, "gone");
    }

    #[test]
    fn missing_status_key_is_malformed_not_ok() {
        let trailer = Metadata::new();
        let err = Status::from_trailer(&trailer).unwrap_err();
        assert!(matches!(err, CallError::MalformedStatus(_)));
    }

    #[test]
    fn non_numeric_status_is_malformed() {
        let mut trailer = Metadata::new();
        trailer.append(STATUS_KEY, "not-a-number");
        let err = Status::from_trailer(&trailer).unwrap_err();
        assert!(matches!(err, CallError::MalformedStatus(_)));
    }

    #[test]
    fn unrecognized_code_keeps_raw_value() {
        let mut trailer = Metadata::new();
        trailer.append(STATUS_KEY, "99");
        let status = Status::from_trailer(&trailer).unwrap();
        assert_eq!(status.code, 99);
        assert_eq!(code_name(status.code), "UNRECOGNIZED");
    }

    #[test]
    fn terminal_classification() {
        let mut ok_trailer = Metadata::new();
        Status::ok().append_to(&mut ok_trailer);
        assert!(Terminal::from_trailer(&ok_trailer).unwrap().is_ok());

        let mut err_trailer = Metadata::new();
        Status::internal("boom").append_to(&mut err_trailer);
        let terminal = Terminal::from_trailer(&err_trailer).unwrap();
        assert!(matches!(terminal, Terminal::Error(_)));
        assert!(!terminal.is_fault());

        let fault = Terminal::fault("connection dropped");
        assert!(fault.is_fault());
        assert_eq!(fault.status().code, code::UNAVAILABLE);
    }

    #[test]
    fn display_includes_code_name() {
        let status = Status::unavailable("gone");
        assert_eq!(status.to_string(), "UNAVAILABLE (14): gone");
        assert_eq!(Status::ok().to_string(), "OK (0)");
    }
}
