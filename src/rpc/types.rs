//! JSON-RPC and tool-server message types
//!
//! Envelopes follow JSON-RPC 2.0; the payload types cover the three
//! methods the harness exercises: `initialize`, `tools/list` and
//! `tools/call`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol marker carried by every envelope
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol revision declared in the handshake
pub const PROTOCOL_VERSION: &str = "2024-11-05";

// === Method Names ===

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

// === Envelopes ===

/// Request envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub jsonrpc: String,
    pub id: i64,
    pub method: String,
    pub params: Value,
}

impl Request {
    pub fn new(id: i64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// Error payload of a failed response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => f.write_str(&self.message),
        }
    }
}

// === Handshake ===

/// `initialize` parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: Value,
    pub client_info: ClientInfo,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: Value::Object(Default::default()),
            client_info: ClientInfo::default(),
        }
    }
}

/// Client identity sent in the handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "test-client".to_string(),
            version: "1.0.0".to_string(),
        }
    }
}

// === Tools ===

/// One entry of a `tools/list` result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// `tools/list` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolListing {
    pub tools: Vec<ToolDescriptor>,
}

/// `tools/call` parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    pub arguments: Value,
}

/// `tools/call` result
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    /// Text of the first content item, if it has any
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().and_then(|item| item.text.as_deref())
    }
}

/// One item of a tool result's `content`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContentItem {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}
