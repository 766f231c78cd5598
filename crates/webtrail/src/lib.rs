//! Trailer-emulating RPC bridge for trailerless byte transports.
//!
//! webtrail carries server-streaming RPC semantics over a plain byte
//! stream that has no native notion of trailing metadata: the trailer
//! travels in-band as a specially flagged final frame.
//!
//! # Crate Structure
//!
//! - [`transport`] — Unix domain socket endpoints and streams
//! - [`frame`] — Length-prefixed frame codec and the metadata channel
//! - [`call`] — Call lifecycle: client stream driver, server handler,
//!   status mapping
//! - [`ping`] — The test harness service the CLI serves and drives

/// Re-export transport types.
pub mod transport {
    pub use webtrail_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use webtrail_frame::*;
}

/// Re-export call types.
pub mod call {
    pub use webtrail_call::*;
}

pub mod ping;
