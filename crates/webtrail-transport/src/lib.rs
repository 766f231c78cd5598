//! Duplex byte-stream transport for the webtrail bridge.
//!
//! A call owns exactly one [`BridgeStream`] per side; no two calls share a
//! byte stream. The stream is plain blocking `Read + Write`, plus the two
//! operations the bridge layers above rely on: `try_clone` (so a cancel
//! handle can exist apart from the decode loop) and `shutdown` (the forced
//! close used for cancellation and fault injection).
//!
//! Concrete transport: Unix domain sockets via [`BridgeSocket`].

pub mod error;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use stream::BridgeStream;

#[cfg(unix)]
pub use uds::BridgeSocket;
