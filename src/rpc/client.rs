//! JSON-RPC client over a [`Transport`]
//!
//! One request in flight at a time: write a line, read exactly one line
//! back, classify it. No retries, no correlation beyond checking that the
//! reply carries the id we sent.

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::common::{truncate_chars, Error, Result};

use super::transport::Transport;
use super::types::*;

/// Correlation id used for every request
pub const REQUEST_ID: i64 = 1;

/// Why no reply line arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoResponseReason {
    /// The server closed its stdout
    EndOfStream,
    /// Nothing arrived before the read deadline
    Timeout(Duration),
    /// Not sent: an earlier reply never arrived, so later replies cannot
    /// be told apart from it
    Desynchronized,
}

impl fmt::Display for NoResponseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfStream => f.write_str("server closed its output"),
            Self::Timeout(d) => write!(f, "no reply within {:?}", d),
            Self::Desynchronized => f.write_str("an earlier request timed out, request not sent"),
        }
    }
}

/// Classified result of one call
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// Well-formed reply with a `result`
    Success(Value),
    /// Well-formed reply with an `error`
    ProtocolError(RpcError),
    /// A line arrived but is not a valid response envelope
    MalformedResponse { raw: String, reason: String },
    /// No line arrived
    NoResponse(NoResponseReason),
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Short name of the outcome kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "Success",
            Self::ProtocolError(_) => "ProtocolError",
            Self::MalformedResponse { .. } => "MalformedResponse",
            Self::NoResponse(_) => "NoResponse",
        }
    }

    /// The result payload, if the call succeeded
    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Success(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(_) => f.write_str("success"),
            Self::ProtocolError(e) => write!(f, "server returned error: {}", e),
            Self::MalformedResponse { raw, reason } => {
                write!(f, "malformed response ({}): {}", reason, truncate_chars(raw, 200))
            }
            Self::NoResponse(reason) => write!(f, "no response from server: {}", reason),
        }
    }
}

/// Decode one reply line into an outcome
///
/// A well-formed reply is a JSON object with `"jsonrpc": "2.0"`, the
/// request's id, and exactly one of `result` or `error`. An error reply
/// may carry a null id (the server could not read ours).
pub fn decode_response(line: &str, expected_id: i64) -> CallOutcome {
    let malformed = |reason: String| CallOutcome::MalformedResponse {
        raw: line.to_string(),
        reason,
    };

    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return malformed(format!("invalid JSON: {}", e)),
    };

    let Value::Object(mut envelope) = value else {
        return malformed("reply is not a JSON object".to_string());
    };

    match envelope.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        other => {
            return malformed(format!(
                "expected jsonrpc \"{}\", got {:?}",
                JSONRPC_VERSION, other
            ))
        }
    }

    let result = envelope.remove("result");
    let error = envelope.remove("error");
    let id = envelope.get("id").cloned().unwrap_or(Value::Null);

    match (result, error) {
        (Some(_), Some(_)) => malformed("reply has both result and error".to_string()),
        (None, None) => malformed("reply has neither result nor error".to_string()),
        (Some(result), None) => {
            if id.as_i64() != Some(expected_id) {
                return malformed(format!("reply id {} does not match request id {}", id, expected_id));
            }
            CallOutcome::Success(result)
        }
        (None, Some(error)) => {
            if !id.is_null() && id.as_i64() != Some(expected_id) {
                return malformed(format!("reply id {} does not match request id {}", id, expected_id));
            }
            match serde_json::from_value::<RpcError>(error) {
                Ok(err) => CallOutcome::ProtocolError(err),
                Err(e) => malformed(format!("invalid error object: {}", e)),
            }
        }
    }
}

/// Decode one raw reply line
///
/// Bytes that are not UTF-8 cannot be a JSON document. They are reported
/// as malformed with invalid sequences shown as U+FFFD in `raw`.
pub fn decode_line(bytes: Vec<u8>, expected_id: i64) -> CallOutcome {
    match String::from_utf8(bytes) {
        Ok(line) => decode_response(&line, expected_id),
        Err(e) => CallOutcome::MalformedResponse {
            reason: format!(
                "reply is not valid UTF-8 ({}), invalid bytes replaced in raw text",
                e.utf8_error()
            ),
            raw: String::from_utf8_lossy(e.as_bytes()).into_owned(),
        },
    }
}

/// Client for a tool server reached through a [`Transport`]
pub struct RpcClient {
    transport: Transport,
    /// Deadline for each reply line; `None` blocks until a line or EOF
    read_timeout: Option<Duration>,
    /// Set once a reply deadline passes. The late reply would carry the
    /// same id as the next request, so nothing more is sent or read.
    desynced: bool,
}

impl RpcClient {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            read_timeout: None,
            desynced: false,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Send a request and classify the single reply line
    ///
    /// Returns `Err` only when the request could not be written to a
    /// server that is still there. A server that already went away
    /// (broken pipe) is reported as `NoResponse` once its output is
    /// drained. After a read deadline passes, every later call returns
    /// `NoResponse(Desynchronized)` without touching the server.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<CallOutcome> {
        if self.desynced {
            tracing::warn!("Not sending '{}': an earlier reply never arrived", method);
            return Ok(CallOutcome::NoResponse(NoResponseReason::Desynchronized));
        }

        let request = Request::new(REQUEST_ID, method, params);
        let json = serde_json::to_string(&request)?;
        tracing::debug!("RPC >>> {}", json);

        match self.transport.write_line(&json).await {
            Ok(()) => {}
            Err(Error::TransportWrite(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                tracing::warn!("Server stdin closed while sending '{}': {}", method, e);
            }
            Err(e) => return Err(e),
        }

        let line = match self.read_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.transport.read_line()).await {
                Ok(line) => line?,
                Err(_) => {
                    tracing::warn!("No reply to '{}' within {:?}", method, limit);
                    self.desynced = true;
                    return Ok(CallOutcome::NoResponse(NoResponseReason::Timeout(limit)));
                }
            },
            None => self.transport.read_line().await?,
        };

        let Some(line) = line else {
            tracing::debug!("RPC <<< (end of stream)");
            return Ok(CallOutcome::NoResponse(NoResponseReason::EndOfStream));
        };
        tracing::debug!("RPC <<< {}", String::from_utf8_lossy(&line));

        Ok(decode_line(line, REQUEST_ID))
    }

    /// Perform the handshake
    pub async fn initialize(&mut self, params: &InitializeParams) -> Result<CallOutcome> {
        self.call(METHOD_INITIALIZE, serde_json::to_value(params)?)
            .await
    }

    /// List the server's tools
    pub async fn list_tools(&mut self) -> Result<CallOutcome> {
        self.call(METHOD_TOOLS_LIST, Value::Object(Default::default()))
            .await
    }

    /// Invoke a tool by name
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<CallOutcome> {
        let params = ToolCallParams {
            name: name.to_string(),
            arguments,
        };
        self.call(METHOD_TOOLS_CALL, serde_json::to_value(&params)?)
            .await
    }

    /// Stop the server and hand back the transport for inspection
    pub async fn shutdown(mut self) -> Result<Transport> {
        self.transport.stop().await?;
        Ok(self.transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_success() {
        let outcome = decode_response(r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#, 1);
        assert_eq!(outcome, CallOutcome::Success(json!({"tools": []})));
    }

    #[test]
    fn test_decode_null_result_is_success() {
        let outcome = decode_response(r#"{"jsonrpc":"2.0","id":1,"result":null}"#, 1);
        assert_eq!(outcome, CallOutcome::Success(Value::Null));
    }

    #[test]
    fn test_decode_protocol_error() {
        let outcome = decode_response(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}"#,
            1,
        );
        match outcome {
            CallOutcome::ProtocolError(err) => {
                assert_eq!(err.code, Some(-32601));
                assert_eq!(err.message, "Method not found");
            }
            other => panic!("expected ProtocolError, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_with_null_id() {
        let outcome = decode_response(
            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#,
            1,
        );
        assert_eq!(outcome.kind(), "ProtocolError");
    }

    #[test]
    fn test_decode_malformed_keeps_raw_line() {
        let raw = "this is {not json";
        match decode_response(raw, 1) {
            CallOutcome::MalformedResponse { raw: kept, reason } => {
                assert_eq!(kept, raw);
                assert!(reason.starts_with("invalid JSON"));
            }
            other => panic!("expected MalformedResponse, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_invalid_envelopes() {
        let cases = [
            "",
            "[1,2,3]",
            r#"{"id":1,"result":{}}"#,
            r#"{"jsonrpc":"1.0","id":1,"result":{}}"#,
            r#"{"jsonrpc":"2.0","id":1}"#,
            r#"{"jsonrpc":"2.0","id":1,"result":{},"error":{"message":"x"}}"#,
            r#"{"jsonrpc":"2.0","id":7,"result":{}}"#,
            r#"{"jsonrpc":"2.0","result":{}}"#,
            r#"{"jsonrpc":"2.0","id":1,"error":"No response from server"}"#,
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":1}}"#,
        ];

        for line in cases {
            let outcome = decode_response(line, 1);
            assert_eq!(outcome.kind(), "MalformedResponse", "line: {:?}", line);
        }
    }

    #[test]
    fn test_decode_line_rejects_invalid_utf8() {
        match decode_line(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":\"\xff\"}".to_vec(), 1) {
            CallOutcome::MalformedResponse { raw, reason } => {
                assert!(reason.contains("not valid UTF-8"));
                assert_eq!(raw, "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":\"\u{FFFD}\"}");
            }
            other => panic!("expected MalformedResponse, got {:?}", other),
        }

        let outcome = decode_line(br#"{"jsonrpc":"2.0","id":1,"result":{}}"#.to_vec(), 1);
        assert!(outcome.is_success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_late_reply_is_never_read() {
        use crate::rpc::LaunchSpec;

        let spec = LaunchSpec::new("sh").arg("-c").arg(
            r#"read l; sleep 1; echo '{"jsonrpc":"2.0","id":1,"result":{"late":true}}'; cat >/dev/null"#,
        );
        let transport = Transport::start(&spec).await.unwrap();
        let mut client =
            RpcClient::new(transport).with_read_timeout(Some(Duration::from_millis(300)));

        let first = client.call("initialize", json!({})).await.unwrap();
        assert_eq!(
            first,
            CallOutcome::NoResponse(NoResponseReason::Timeout(Duration::from_millis(300)))
        );

        // The late reply is sitting in the pipe by now
        tokio::time::sleep(Duration::from_millis(1200)).await;
        let second = client.call("tools/list", json!({})).await.unwrap();
        assert_eq!(second, CallOutcome::NoResponse(NoResponseReason::Desynchronized));

        client.shutdown().await.unwrap();
    }

    #[test]
    fn test_outcome_display() {
        let outcome = CallOutcome::NoResponse(NoResponseReason::EndOfStream);
        assert_eq!(outcome.to_string(), "no response from server: server closed its output");
        assert!(!outcome.is_success());
        assert!(outcome.result().is_none());
    }
}
