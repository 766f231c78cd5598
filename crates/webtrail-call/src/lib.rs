//! Call lifecycle for the webtrail bridge: client stream driver and
//! server stream handler.
//!
//! A call is one RPC invocation over an exclusively owned byte stream.
//! The client sends a request preamble (the leading-metadata carrier)
//! and a single request frame, then a dedicated decode thread turns the
//! response byte stream into message events followed by exactly one
//! terminal status. The server side accepts a request, optionally emits
//! leading metadata, emits zero or more messages, and ends the stream
//! with either a trailer frame or a forced close.

pub mod client;
pub mod error;
pub mod preamble;
pub mod server;
pub mod status;

pub use client::{Call, CancelHandle};
pub use error::{CallError, Result};
pub use preamble::{RequestPreamble, CONTENT_TYPE, CONTENT_TYPE_KEY};
pub use server::{accept_on, CallListener, IncomingCall, ServerStream};
pub use status::{code, code_name, Status, Terminal, MESSAGE_KEY, STATUS_KEY};
