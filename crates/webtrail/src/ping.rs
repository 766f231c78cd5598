//! The ping harness service: a small server-streaming RPC surface with
//! failure injection, used by the CLI and the end-to-end tests.
//!
//! Payloads are JSON; the bridge itself treats them as opaque bytes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use webtrail_call::{code_name, IncomingCall, Result, ServerStream, Status};
use webtrail_frame::Metadata;

pub const PING_PATH: &str = "/test.TestService/Ping";
pub const PING_EMPTY_PATH: &str = "/test.TestService/PingEmpty";
pub const PING_ERROR_PATH: &str = "/test.TestService/PingError";
pub const PING_LIST_PATH: &str = "/test.TestService/PingList";

/// Metadata key a client must supply when `check_metadata` is set.
pub const CLIENT_CHECK_KEY: &str = "client-check";
pub const CLIENT_CHECK_VALUE: &str = "client-check-value";

/// Fixed keys attached when `send_headers` / `send_trailers` are set.
pub const SERVER_HEADER_KEYS: [&str; 2] = ["server-header-1", "server-header-2"];
pub const SERVER_TRAILER_KEYS: [&str; 2] = ["server-trailer-1", "server-trailer-2"];
pub const SERVER_METADATA_VALUES: [&str; 2] = ["server-value-1", "server-value-2"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureType {
    #[default]
    None,
    /// Finish with the status code the request names.
    Code,
    /// Tear the connection down without a trailer.
    Drop,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PingRequest {
    pub value: String,
    pub response_count: u32,
    pub error_code_returned: u32,
    pub failure_type: FailureType,
    pub check_metadata: bool,
    pub send_headers: bool,
    pub send_trailers: bool,
    pub message_latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub value: String,
    pub counter: u32,
}

/// Dispatch one accepted call to its ping method.
///
/// Every path through here ends the stream exactly once, with `finish`
/// or `abort`; transport errors while responding propagate to the
/// serve loop, which logs and drops the connection.
pub fn handle(call: IncomingCall, stream: ServerStream) -> Result<()> {
    // PingEmpty ignores its request entirely, matching the empty
    // message it takes on the wire.
    if call.path == PING_EMPTY_PATH {
        return ping_empty(stream);
    }

    let request: PingRequest = match serde_json::from_slice(&call.request) {
        Ok(request) => request,
        Err(err) => {
            warn!(path = %call.path, error = %err, "unparseable ping request");
            return stream.finish(Status::invalid_argument(format!(
                "malformed ping request: {err}"
            )));
        }
    };
    debug!(path = %call.path, value = %request.value, "dispatching ping call");

    match call.path.as_str() {
        PING_PATH => ping(&call, request, stream),
        PING_ERROR_PATH => ping_error(request, stream),
        PING_LIST_PATH => ping_list(&call, request, stream),
        other => stream.finish(Status::unimplemented(format!("unknown method: {other}"))),
    }
}

fn ping(call: &IncomingCall, request: PingRequest, mut stream: ServerStream) -> Result<()> {
    if let Some(status) = check_client_metadata(call, &request) {
        return stream.finish(status);
    }
    stage_test_metadata(&request, &mut stream)?;

    let response = PingResponse {
        value: request.value,
        counter: request.response_count,
    };
    stream.send(&encode(&response))?;
    stream.finish(Status::ok())
}

/// Fixed response with both metadata pairs attached unconditionally.
fn ping_empty(mut stream: ServerStream) -> Result<()> {
    let request = PingRequest {
        send_headers: true,
        send_trailers: true,
        ..PingRequest::default()
    };
    stage_test_metadata(&request, &mut stream)?;

    let response = PingResponse {
        value: "foobar".to_string(),
        counter: 0,
    };
    stream.send(&encode(&response))?;
    stream.finish(Status::ok())
}

fn ping_error(request: PingRequest, mut stream: ServerStream) -> Result<()> {
    if request.failure_type == FailureType::Drop {
        stream.abort();
        return Ok(());
    }
    stage_test_metadata(&request, &mut stream)?;
    stream.finish(Status::new(
        request.error_code_returned,
        format!(
            "intentionally returning status {}",
            code_name(request.error_code_returned)
        ),
    ))
}

fn ping_list(call: &IncomingCall, request: PingRequest, mut stream: ServerStream) -> Result<()> {
    if request.failure_type == FailureType::Drop {
        stream.abort();
        return Ok(());
    }
    if let Some(status) = check_client_metadata(call, &request) {
        return stream.finish(status);
    }
    stage_test_metadata(&request, &mut stream)?;

    for counter in 0..request.response_count {
        if request.message_latency_ms > 0 {
            std::thread::sleep(Duration::from_millis(request.message_latency_ms));
        }
        let response = PingResponse {
            // The counter rides along in the value too, so a consumer
            // can spot reordering from the payload alone.
            value: format!("{} {counter}", request.value),
            counter,
        };
        stream.send(&encode(&response))?;
    }
    stream.finish(Status::ok())
}

fn check_client_metadata(call: &IncomingCall, request: &PingRequest) -> Option<Status> {
    if !request.check_metadata {
        return None;
    }
    match call.metadata.first(CLIENT_CHECK_KEY) {
        Some(CLIENT_CHECK_VALUE) => None,
        Some(other) => Some(Status::invalid_argument(format!(
            "unexpected {CLIENT_CHECK_KEY} value: {other}"
        ))),
        None => Some(Status::invalid_argument(format!(
            "missing required metadata key {CLIENT_CHECK_KEY}"
        ))),
    }
}

fn stage_test_metadata(request: &PingRequest, stream: &mut ServerStream) -> Result<()> {
    if request.send_headers {
        let mut leading = Metadata::new();
        for (key, value) in SERVER_HEADER_KEYS.iter().zip(SERVER_METADATA_VALUES) {
            leading.append(*key, value);
        }
        stream.send_leading_metadata(leading)?;
    }
    if request.send_trailers {
        let mut trailing = Metadata::new();
        for (key, value) in SERVER_TRAILER_KEYS.iter().zip(SERVER_METADATA_VALUES) {
            trailing.append(*key, value);
        }
        stream.set_trailing_metadata(trailing);
    }
    Ok(())
}

fn encode(response: &PingResponse) -> Vec<u8> {
    // PingResponse has no map keys or non-string keys; serialization
    // cannot fail.
    serde_json::to_vec(response).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_fields_default_when_absent() {
        let request: PingRequest = serde_json::from_str(r#"{"value":"hello"}"#).unwrap();
        assert_eq!(request.value, "hello");
        assert_eq!(request.response_count, 0);
        assert_eq!(request.failure_type, FailureType::None);
        assert!(!request.check_metadata);
        assert_eq!(request.message_latency_ms, 0);
    }

    #[test]
    fn failure_type_uses_wire_names() {
        let request: PingRequest =
            serde_json::from_str(r#"{"failureType":"DROP"}"#).unwrap();
        assert_eq!(request.failure_type, FailureType::Drop);
        let request: PingRequest =
            serde_json::from_str(r#"{"failureType":"CODE"}"#).unwrap();
        assert_eq!(request.failure_type, FailureType::Code);
    }

    #[test]
    fn response_round_trips_as_camel_case_json() {
        let response = PingResponse {
            value: "v".to_string(),
            counter: 7,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"value":"v","counter":7}"#);
        let back: PingResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, response);
    }
}
