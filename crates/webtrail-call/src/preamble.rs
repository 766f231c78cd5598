use std::io::{ErrorKind, Read, Write};

use webtrail_frame::Metadata;

use crate::error::{CallError, Result};

/// Protocol token sent on the request line.
pub const PROTOCOL_TOKEN: &str = "webtrail/1";

/// Leading-metadata key every server response carries.
pub const CONTENT_TYPE_KEY: &str = "content-type";

/// Value of the mandatory content-type entry.
pub const CONTENT_TYPE: &str = "application/webtrail";

/// Maximum accepted preamble size. Pre-trust input from an unauthenticated
/// peer, so bounded tightly relative to frame payloads.
pub const MAX_PREAMBLE_SIZE: usize = 16 * 1024;

const TERMINATOR: &[u8] = b"\r\n\r\n";

/// The pre-frame request block: method path plus client leading metadata.
///
/// This plays the role HTTP headers play on transports that have them.
/// On the wire:
///
/// ```text
/// CALL /test.TestService/PingList webtrail/1\r\n
/// key: value\r\n
/// ...\r\n
/// \r\n
/// ```
///
/// The response preamble is the same minus the request line: metadata
/// lines terminated by a blank line. Its arrival is the client's
/// leading-metadata signal; everything after the blank line is framed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPreamble {
    /// RPC method path, e.g. `/test.TestService/Ping`.
    pub path: String,
    /// Client leading metadata.
    pub metadata: Metadata,
}

/// Write a request preamble.
pub fn write_request<W: Write>(writer: &mut W, preamble: &RequestPreamble) -> Result<()> {
    if preamble.path.is_empty() || preamble.path.contains(char::is_whitespace) {
        return Err(CallError::Preamble(format!(
            "invalid method path: {:?}",
            preamble.path
        )));
    }
    let mut block = format!("CALL {} {PROTOCOL_TOKEN}\r\n", preamble.path).into_bytes();
    block.extend_from_slice(&preamble.metadata.to_wire());
    block.extend_from_slice(b"\r\n");
    writer.write_all(&block).map_err(io_to_call_error)?;
    writer.flush().map_err(io_to_call_error)?;
    Ok(())
}

/// Write a response preamble (leading metadata block).
pub fn write_response<W: Write>(writer: &mut W, metadata: &Metadata) -> Result<()> {
    let mut block = metadata.to_wire().to_vec();
    block.extend_from_slice(b"\r\n");
    writer.write_all(&block).map_err(io_to_call_error)?;
    writer.flush().map_err(io_to_call_error)?;
    Ok(())
}

/// Read and parse a request preamble.
pub fn read_request<R: Read>(reader: &mut R) -> Result<RequestPreamble> {
    let block = read_block(reader)?;
    // No interior CRLF means a request line with no metadata lines.
    let (request_line, rest) = block.split_once("\r\n").unwrap_or((block.as_str(), ""));

    let mut parts = request_line.split(' ');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("CALL"), Some(path), Some(PROTOCOL_TOKEN), None) if !path.is_empty() => {
            Ok(RequestPreamble {
                path: path.to_string(),
                metadata: parse_metadata_lines(rest)?,
            })
        }
        _ => Err(CallError::Preamble(format!(
            "malformed request line: {request_line:?}"
        ))),
    }
}

/// Read and parse a response preamble (leading metadata).
pub fn read_response<R: Read>(reader: &mut R) -> Result<Metadata> {
    let block = read_block(reader)?;
    parse_metadata_lines(&block)
}

fn parse_metadata_lines(block: &str) -> Result<Metadata> {
    Metadata::from_wire(block.as_bytes())
        .map_err(|err| CallError::Preamble(format!("bad metadata line: {err}")))
}

/// Read bytes one at a time until the blank-line terminator, so nothing
/// belonging to the framed phase is consumed.
///
/// Returns the block without its final `\r\n\r\n`.
fn read_block<R: Read>(reader: &mut R) -> Result<String> {
    let mut block: Vec<u8> = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => {
                return Err(CallError::Preamble(format!(
                    "stream closed mid-preamble ({} bytes read)",
                    block.len()
                )))
            }
            Ok(_) => block.push(byte[0]),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(io_to_call_error(err)),
        }

        // A block with zero lines is just the blank terminator line.
        if block.ends_with(TERMINATOR) || block == b"\r\n" {
            let body_len = block.len().saturating_sub(TERMINATOR.len());
            block.truncate(if block == b"\r\n" { 0 } else { body_len });
            return String::from_utf8(block)
                .map_err(|err| CallError::Preamble(format!("not UTF-8: {err}")));
        }
        if block.len() >= MAX_PREAMBLE_SIZE {
            return Err(CallError::Preamble(format!(
                "preamble exceeds {MAX_PREAMBLE_SIZE} bytes"
            )));
        }
    }
}

fn io_to_call_error(err: std::io::Error) -> CallError {
    CallError::Frame(webtrail_frame::FrameError::Io(err))
}
