//! MCP protocol types
//!
//! Wire types for the JSON-RPC 2.0 envelope and the MCP payloads the runtime
//! dispatches: implementation info, capabilities, content blocks, tools,
//! resources and prompts.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ============================================================================
// Core Protocol Constants
// ============================================================================

/// Protocol version advertised during `initialize`
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";
pub const JSONRPC_VERSION: &str = "2.0";

// ============================================================================
// Type Aliases
// ============================================================================

/// Progress token used to correlate progress notifications
pub type ProgressToken = Value; // string | number

/// Request identifier. Kept as a raw JSON value so integer, string and float
/// IDs are echoed back exactly as received.
pub type RequestId = Value;

// ============================================================================
// Core Implementation Info
// ============================================================================

/// Information about an MCP implementation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Implementation {
    /// Programmatic name of the implementation
    pub name: String,
    /// Version of the implementation
    pub version: String,
    /// Human readable title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Implementation {
    /// Create a new implementation with name and version
    pub fn new<S: Into<String>>(name: S, version: S) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            title: None,
        }
    }
}

pub type ServerInfo = Implementation;
pub type ClientInfo = Implementation;

// ============================================================================
// Capabilities
// ============================================================================

/// Capabilities the server advertises
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapability>,
    /// Non-standard capabilities (roots, discovery, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
}

/// Capabilities a client declares in `initialize`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
}

impl ClientCapabilities {
    /// Whether the client flagged an experimental capability as enabled.
    /// Both `true` and an (empty) object count as enabled.
    pub fn has_experimental(&self, name: &str) -> bool {
        self.experimental
            .as_ref()
            .and_then(|experimental| experimental.get(name))
            .map(|value| match value {
                Value::Bool(enabled) => *enabled,
                Value::Object(_) => true,
                _ => false,
            })
            .unwrap_or(false)
    }
}

/// Prompt-related server capabilities
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PromptsCapability {
    /// Whether the server supports prompt list change notifications
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Resource-related server capabilities
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResourcesCapability {
    /// Whether the server supports resource subscriptions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
    /// Whether the server supports resource list change notifications
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Tool-related server capabilities
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ToolsCapability {
    /// Whether the server supports tool list change notifications
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Sampling-related capabilities
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SamplingCapability {
    #[serde(flatten)]
    pub additional_properties: HashMap<String, Value>,
}

/// Logging capabilities
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LoggingCapability {
    #[serde(flatten)]
    pub additional_properties: HashMap<String, Value>,
}

/// Roots capability for clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RootsCapability {
    /// Whether the client supports notifications for changes to the roots list
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

// ============================================================================
// Content Types
// ============================================================================

/// A single piece of content returned by a tool or prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image {
        /// Base64-encoded image data
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    #[serde(rename = "audio")]
    Audio {
        /// Base64-encoded audio data
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    #[serde(rename = "resource_link")]
    ResourceLink {
        uri: String,
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    #[serde(rename = "resource")]
    Resource { resource: ResourceContents },
}

impl ContentBlock {
    /// Create text content
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create image content
    pub fn image<S: Into<String>>(data: S, mime_type: S) -> Self {
        Self::Image {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Create resource link content
    pub fn resource_link<S: Into<String>>(uri: S, name: S) -> Self {
        Self::ResourceLink {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: None,
        }
    }

    /// Create embedded resource content
    pub fn embedded_resource(resource: ResourceContents) -> Self {
        Self::Resource { resource }
    }

    /// The text payload, if this is a text block
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

// ============================================================================
// Tool Types
// ============================================================================

/// Tool descriptor as listed by `tools/list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema describing the tool's input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: ToolInputSchema,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Tool {
    /// Create a tool descriptor with an object schema
    pub fn new<S: Into<String>>(name: S, description: Option<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            description,
            input_schema: ToolInputSchema::from_value(schema),
            title: None,
        }
    }
}

/// Tool input schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInputSchema {
    /// Schema type (always "object")
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, Value>>,
    /// Argument names that must be present in `tools/call`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(flatten)]
    pub additional_properties: HashMap<String, Value>,
}

impl Default for ToolInputSchema {
    fn default() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: None,
            required: None,
            additional_properties: HashMap::new(),
        }
    }
}

impl ToolInputSchema {
    /// Build a schema from a raw JSON Schema object. Unknown keys are kept.
    pub fn from_value(schema: Value) -> Self {
        let Value::Object(mut map) = schema else {
            return Self::default();
        };

        map.remove("type");
        let properties = match map.remove("properties") {
            Some(Value::Object(props)) => Some(props.into_iter().collect()),
            _ => None,
        };
        let required = match map.remove("required") {
            Some(Value::Array(names)) => Some(
                names
                    .into_iter()
                    .filter_map(|name| name.as_str().map(str::to_string))
                    .collect(),
            ),
            _ => None,
        };

        Self {
            schema_type: "object".to_string(),
            properties,
            required,
            additional_properties: map.into_iter().collect(),
        }
    }

    /// First required argument missing from `arguments`
    pub fn missing_required<'a>(&'a self, arguments: &HashMap<String, Value>) -> Option<&'a str> {
        self.required
            .as_ref()?
            .iter()
            .find(|name| !arguments.contains_key(name.as_str()))
            .map(String::as_str)
    }
}

/// Result of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallToolResult {
    pub content: Vec<ContentBlock>,
    /// Whether this result represents a tool-level failure
    #[serde(rename = "isError", default)]
    pub is_error: bool,
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl CallToolResult {
    /// Successful result with a single text block
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: false,
            structured_content: None,
        }
    }

    /// Tool-level failure reported inside the result
    pub fn error<S: Into<String>>(text: S) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: true,
            structured_content: None,
        }
    }
}

pub type ToolInfo = Tool;
pub type ToolResult = CallToolResult;

// ============================================================================
// Resource Types
// ============================================================================

/// Resource descriptor as listed by `resources/list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Resource {
    pub fn new<S: Into<String>>(uri: S, name: S) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: None,
        }
    }
}

/// Content of a resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ResourceContents {
    Text {
        uri: String,
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        text: String,
    },
    Blob {
        uri: String,
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        /// Base64-encoded binary data
        blob: String,
    },
}

impl ResourceContents {
    /// Plain text contents
    pub fn text<S: Into<String>>(uri: S, text: S) -> Self {
        Self::Text {
            uri: uri.into(),
            mime_type: Some("text/plain".to_string()),
            text: text.into(),
        }
    }

    /// Get the URI of the resource
    pub fn uri(&self) -> &str {
        match self {
            ResourceContents::Text { uri, .. } => uri,
            ResourceContents::Blob { uri, .. } => uri,
        }
    }
}

pub type ResourceInfo = Resource;

// ============================================================================
// Prompt Types
// ============================================================================

/// Prompt descriptor as listed by `prompts/list`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prompt {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<PromptArgument>>,
}

impl Prompt {
    pub fn new<S: Into<String>>(name: S, description: Option<String>) -> Self {
        Self {
            name: name.into(),
            description,
            arguments: None,
        }
    }

    /// Add an argument to the descriptor
    pub fn with_argument(mut self, name: &str, description: &str, required: bool) -> Self {
        self.arguments
            .get_or_insert_with(Vec::new)
            .push(PromptArgument {
                name: name.to_string(),
                description: Some(description.to_string()),
                required: Some(required),
            });
        self
    }
}

/// Argument for a prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptArgument {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

/// Message role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Message in a prompt result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptMessage {
    pub role: Role,
    pub content: ContentBlock,
}

impl PromptMessage {
    pub fn user_text<S: Into<String>>(text: S) -> Self {
        Self {
            role: Role::User,
            content: ContentBlock::text(text),
        }
    }
}

/// Result of `prompts/get`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetPromptResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

pub type PromptInfo = Prompt;
pub type PromptResult = GetPromptResult;

// ============================================================================
// Logging Types
// ============================================================================

/// Logging level carried by `notifications/message`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

// ============================================================================
// JSON-RPC Types
// ============================================================================

/// JSON-RPC request. A missing `id` makes it a notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a request with an ID
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// Create a request without an ID
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Successful JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: Value,
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        }
    }
}

/// JSON-RPC error response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub jsonrpc: String,
    pub id: RequestId,
    pub error: ErrorObject,
}

impl JsonRpcError {
    pub fn new(id: RequestId, error: ErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error,
        }
    }
}

/// Error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// One-way JSON-RPC message sent to a client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// The single reply produced for an id-bearing request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum JsonRpcReply {
    Success(JsonRpcResponse),
    Error(JsonRpcError),
}

impl JsonRpcReply {
    pub fn id(&self) -> &RequestId {
        match self {
            JsonRpcReply::Success(response) => &response.id,
            JsonRpcReply::Error(error) => &error.id,
        }
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            JsonRpcReply::Success(response) => Some(&response.result),
            JsonRpcReply::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorObject> {
        match self {
            JsonRpcReply::Success(_) => None,
            JsonRpcReply::Error(error) => Some(&error.error),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, JsonRpcReply::Error(_))
    }
}

/// Anything the server writes to a connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Reply(JsonRpcReply),
    Notification(JsonRpcNotification),
}

impl From<JsonRpcReply> for JsonRpcMessage {
    fn from(reply: JsonRpcReply) -> Self {
        JsonRpcMessage::Reply(reply)
    }
}

impl From<JsonRpcNotification> for JsonRpcMessage {
    fn from(notification: JsonRpcNotification) -> Self {
        JsonRpcMessage::Notification(notification)
    }
}

// ============================================================================
// Error Codes
// ============================================================================

/// JSON-RPC error codes used on the wire
pub mod error_codes {
    /// Invalid JSON was received
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist / is not available
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameter(s)
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error
    pub const INTERNAL_ERROR: i32 = -32603;

    /// The client cannot use the requested feature
    pub const UNSUPPORTED_FEATURE: i32 = -32002;
    /// The caller exceeded its request budget
    pub const RATE_LIMITED: i32 = -32429;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_protocol_version() {
        assert_eq!(LATEST_PROTOCOL_VERSION, "2025-06-18");
        assert_eq!(JSONRPC_VERSION, "2.0");
    }

    #[test]
    fn test_tool_result_always_carries_is_error() {
        let json = serde_json::to_value(CallToolResult::text("echoed")).unwrap();
        assert_eq!(
            json,
            json!({"content": [{"type": "text", "text": "echoed"}], "isError": false})
        );
    }

    #[test]
    fn test_input_schema_keeps_required_and_extra_keys() {
        let schema = ToolInputSchema::from_value(json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"],
            "additionalProperties": false
        }));

        assert_eq!(schema.required, Some(vec!["query".to_string()]));
        assert_eq!(
            schema.additional_properties.get("additionalProperties"),
            Some(&json!(false))
        );

        let mut args = HashMap::new();
        assert_eq!(schema.missing_required(&args), Some("query"));
        args.insert("query".to_string(), json!("rust"));
        assert_eq!(schema.missing_required(&args), None);
    }

    #[test]
    fn test_reply_serializes_untagged() {
        let ok = JsonRpcReply::Success(JsonRpcResponse::success(json!(7), json!({})));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"jsonrpc": "2.0", "id": 7, "result": {}})
        );

        let err = JsonRpcReply::Error(JsonRpcError::new(
            json!("a"),
            ErrorObject {
                code: error_codes::METHOD_NOT_FOUND,
                message: "nope".to_string(),
                data: None,
            },
        ));
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["error"]["code"], -32601);
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_experimental_capability_flags() {
        let caps: ClientCapabilities = serde_json::from_value(json!({
            "experimental": {"progress": true, "logging": {}, "other": false}
        }))
        .unwrap();

        assert!(caps.has_experimental("progress"));
        assert!(caps.has_experimental("logging"));
        assert!(!caps.has_experimental("other"));
        assert!(!caps.has_experimental("missing"));
    }
}
