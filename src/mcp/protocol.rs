//! JSON-RPC 2.0 message types for MCP protocol.
//!
//! This module defines the core message types exchanged by the bridge, in
//! both directions: the client transports encode [`Request`]s and decode
//! [`Response`]s, the responders do the opposite.
//!
//! # Message Types
//!
//! - **Request**: A message expecting a response (has `id`)
//! - **Notification**: A request without `id`; no response is sent
//! - **Response**: A reply to a request, carrying either `result` or `error`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The MCP protocol version this implementation speaks by default.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// The JSON-RPC version tag carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Error code for an unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Generic server/application error code.
pub const SERVER_ERROR: i64 = -32000;

/// Method names recognised by the bridge.
pub mod methods {
    /// Handshake request.
    pub const INITIALIZE: &str = "initialize";
    /// Handshake completion notification.
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Liveness check.
    pub const PING: &str = "ping";
    /// List registered tools.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Invoke a tool.
    pub const TOOLS_CALL: &str = "tools/call";
    /// List registered resources.
    pub const RESOURCES_LIST: &str = "resources/list";
    /// Read one resource.
    pub const RESOURCES_READ: &str = "resources/read";
    /// List registered prompts.
    pub const PROMPTS_LIST: &str = "prompts/list";
    /// Render one prompt.
    pub const PROMPTS_GET: &str = "prompts/get";
}

/// A JSON object, the shape of every `result` the bridge hands back.
pub type ResultMap = Map<String, Value>;

/// A JSON-RPC 2.0 request ID.
///
/// The bridge always sends integers but accepts strings from peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(i64),
    /// String request ID.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// A JSON-RPC 2.0 request or notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Must be "2.0".
    pub jsonrpc: String,

    /// The method to invoke.
    pub method: String,

    /// Request identifier; absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,

    /// Optional parameters for the method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Creates a request expecting a response.
    #[must_use]
    pub fn new(id: i64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            id: Some(RequestId::Number(id)),
            params,
        }
    }

    /// Creates a notification (no `id`, no response expected).
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            id: None,
            params,
        }
    }

    /// Returns `true` if no response is expected.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Validates that this is a well-formed JSON-RPC 2.0 request.
    ///
    /// Returns an error message if validation fails.
    #[must_use]
    pub fn validate(&self) -> Option<&'static str> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Some("jsonrpc field must be \"2.0\"");
        }
        if self.method.is_empty() {
            return Some("method field cannot be empty");
        }
        None
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// The error code.
    pub code: i64,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Creates a new error object.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// A JSON-RPC 2.0 response. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Always "2.0".
    pub jsonrpc: String,

    /// The request ID this response corresponds to.
    #[serde(default)]
    pub id: Option<RequestId>,

    /// The result of the method call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// The error, if the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    /// Creates a new success response.
    #[must_use]
    pub fn success(id: Option<RequestId>, result: ResultMap) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(Value::Object(result)),
            error: None,
        }
    }

    /// Creates a new error response.
    #[must_use]
    pub fn failure(id: Option<RequestId>, error: ErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Name and version of a client or server implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Implementation name.
    pub name: String,
    /// Implementation version.
    #[serde(default)]
    pub version: String,
}

/// Parameters of the `initialize` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by the client.
    #[serde(default)]
    pub protocol_version: Option<String>,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Map<String, Value>,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<Implementation>,
}

/// Content item of a tool result or prompt message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

impl Content {
    /// Creates a text content item.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<Content>,
}

impl ToolCallResult {
    /// Creates a result holding a single text item.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
        }
    }
}

/// Turns a JSON value into a [`ResultMap`].
///
/// Non-object values are wrapped as `{"value": ...}`.
#[must_use]
pub fn into_result_map(value: Value) -> ResultMap {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = ResultMap::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Serialises `value` into a [`ResultMap`].
#[must_use]
pub fn to_result_map<T: Serialize>(value: &T) -> ResultMap {
    match serde_json::to_value(value) {
        Ok(value) => into_result_map(value),
        Err(e) => into_result_map(Value::String(e.to_string())),
    }
}
