// ! Error types for the MCP runtime
// !
// ! Module defines every error that can surface while parsing, dispatching or
// ! delivering MCP messages, and maps each of them onto the JSON-RPC wire taxonomy.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};
use thiserror::Error;

use crate::protocol::types::{ErrorObject, error_codes};

/// Longest message we put on the wire after sanitization
pub const MAX_WIRE_MESSAGE_LEN: usize = 512;

/// The main error type for the MCP runtime
#[derive(Error, Debug, Clone)]
pub enum McpError {
    /// Transport-related errors (connection, I/O, etc.)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Protocol-level errors (unexpected state, malformed results, etc.)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The payload was not valid JSON, or was a batch
    #[error("Parse error: {0}")]
    Parse(String),

    /// The JSON was valid but not a valid request envelope
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Requested tool was not found
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Requested resource was not found
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Requested prompt was not found
    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    /// Method not found (JSON-RPC error)
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Invalid parameters (JSON-RPC error)
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// A name is already registered and overwrite was not requested
    #[error("Already registered: {0}")]
    DuplicateRegistration(String),

    /// The connected client cannot use the requested feature
    #[error("Feature '{feature}' is not supported by {client}")]
    UnsupportedFeature {
        feature: String,
        client: String,
        workaround: String,
    },

    /// Too many requests for the configured token bucket
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// A bounded queue stayed full past its wait budget
    #[error("Queue full: {0}")]
    Backpressure(String),

    /// Notification target is not a registered client
    #[error("Client not found: {0}")]
    ClientNotFound(String),

    /// A structured JSON-RPC error supplied by a handler, sent as-is
    #[error("JSON-RPC error {}: {}", .0.code, .0.message)]
    Rpc(ErrorObject),

    /// I/O errors from the standard library
    #[error("I/O error: {0}")]
    Io(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Cancellation errors
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Internal errors that shouldn't normally occur
    #[error("Internal error: {0}")]
    Internal(String),
}

// Manual From implementations for types that don't implement Clone
impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        McpError::Io(err.to_string())
    }
}

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;

impl McpError {
    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a new parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new invalid request error
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a new invalid params error
    pub fn invalid_params<S: Into<String>>(message: S) -> Self {
        Self::InvalidParams(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a new cancellation error
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::Cancelled(message.into())
    }

    /// Create an unsupported-feature error carrying the client's workaround
    pub fn unsupported_feature(
        feature: impl Into<String>,
        client: impl Into<String>,
        workaround: impl Into<String>,
    ) -> Self {
        Self::UnsupportedFeature {
            feature: feature.into(),
            client: client.into(),
            workaround: workaround.into(),
        }
    }

    /// Wrap a handler-supplied JSON-RPC error
    pub fn rpc(code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self::Rpc(ErrorObject {
            code,
            message: message.into(),
            data,
        })
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            McpError::Timeout(_)
            | McpError::Io(_)
            | McpError::RateLimited(_)
            | McpError::Backpressure(_) => true,
            McpError::Transport(_)
            | McpError::Protocol(_)
            | McpError::Parse(_)
            | McpError::InvalidRequest(_)
            | McpError::Serialization(_)
            | McpError::ToolNotFound(_)
            | McpError::ResourceNotFound(_)
            | McpError::PromptNotFound(_)
            | McpError::MethodNotFound(_)
            | McpError::InvalidParams(_)
            | McpError::Validation(_)
            | McpError::DuplicateRegistration(_)
            | McpError::UnsupportedFeature { .. }
            | McpError::ClientNotFound(_)
            | McpError::Rpc(_)
            | McpError::Cancelled(_)
            | McpError::Internal(_) => false,
        }
    }

    /// Get the error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            McpError::Transport(_) => "transport",
            McpError::Protocol(_) | McpError::Rpc(_) => "protocol",
            McpError::Parse(_) | McpError::Serialization(_) => "serialization",
            McpError::InvalidRequest(_)
            | McpError::InvalidParams(_)
            | McpError::Validation(_)
            | McpError::DuplicateRegistration(_) => "validation",
            McpError::ToolNotFound(_)
            | McpError::ResourceNotFound(_)
            | McpError::PromptNotFound(_)
            | McpError::MethodNotFound(_)
            | McpError::ClientNotFound(_) => "not_found",
            McpError::UnsupportedFeature { .. } => "compatibility",
            McpError::RateLimited(_) | McpError::Backpressure(_) => "throttled",
            McpError::Io(_) => "io",
            McpError::Timeout(_) => "timeout",
            McpError::Cancelled(_) => "cancelled",
            McpError::Internal(_) => "internal",
        }
    }

    /// JSON-RPC error code this error is reported with
    pub fn code(&self) -> i32 {
        match self {
            McpError::Parse(_) => error_codes::PARSE_ERROR,
            McpError::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            McpError::MethodNotFound(_)
            | McpError::ToolNotFound(_)
            | McpError::ResourceNotFound(_)
            | McpError::PromptNotFound(_) => error_codes::METHOD_NOT_FOUND,
            McpError::InvalidParams(_) | McpError::Validation(_) => error_codes::INVALID_PARAMS,
            McpError::UnsupportedFeature { .. } => error_codes::UNSUPPORTED_FEATURE,
            McpError::RateLimited(_) => error_codes::RATE_LIMITED,
            McpError::Rpc(object) => object.code,
            _ => error_codes::INTERNAL_ERROR,
        }
    }

    /// Build the sanitized wire error object
    pub fn to_error_object(&self) -> ErrorObject {
        match self {
            McpError::Rpc(object) => ErrorObject {
                code: object.code,
                message: sanitize_message(&object.message),
                data: object.data.clone().map(sanitize_value),
            },
            McpError::UnsupportedFeature {
                feature,
                client,
                workaround,
            } => ErrorObject {
                code: self.code(),
                message: sanitize_message(&self.to_string()),
                data: Some(json!({
                    "feature": feature,
                    "client": client,
                    "workaround": sanitize_message(workaround),
                })),
            },
            _ => ErrorObject {
                code: self.code(),
                message: sanitize_message(&self.to_string()),
                data: None,
            },
        }
    }
}

// ============================================================================
// Sanitization
// ============================================================================

static CREDENTIAL_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(password|passwd|pwd|secret|token|api[_-]?key|access[_-]?key|authorization|cookie)\b(\s*[:=]\s*)("[^"]*"|'[^']*'|\S+)"#,
    )
    .expect("credential pattern is valid")
});

/// Object keys whose values are never sent, whatever their shape
static CREDENTIAL_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(passw(or)?d|\bpwd\b|secret|token|api[_-]?key|access[_-]?key|private[_-]?key|authorization|cookie|credential)",
    )
    .expect("credential key pattern is valid")
});

static BEARER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(bearer|basic)\s+[A-Za-z0-9\-._~+/]+=*").expect("bearer pattern is valid")
});

static URL_USERINFO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([a-zA-Z][a-zA-Z0-9+.-]*://)[^/\s@]+@").expect("userinfo pattern is valid")
});

static IPV4_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}(?::\d{1,5})?\b").expect("address pattern is valid")
});

/// Strip credentials, network addresses and backtraces from a message
/// that is about to leave the process.
pub fn sanitize_message(message: &str) -> String {
    // Backtraces and multi-line dumps never go out; the first line is enough.
    let first_line = message.lines().next().unwrap_or_default();
    let first_line = match first_line.find("stack backtrace") {
        Some(index) => &first_line[..index],
        None => first_line,
    };

    let cleaned = CREDENTIAL_PAIR.replace_all(first_line, "${1}${2}[REDACTED]");
    let cleaned = BEARER.replace_all(&cleaned, "${1} [REDACTED]");
    let cleaned = URL_USERINFO.replace_all(&cleaned, "${1}[REDACTED]@");
    let cleaned = IPV4_ADDRESS.replace_all(&cleaned, "[REDACTED_ADDR]");

    let trimmed = cleaned.trim();
    if trimmed.chars().count() > MAX_WIRE_MESSAGE_LEN {
        let cut: String = trimmed.chars().take(MAX_WIRE_MESSAGE_LEN).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}

fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(text) => Value::String(sanitize_message(&text)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    if CREDENTIAL_KEY.is_match(&key) {
                        (key, Value::String("[REDACTED]".to_string()))
                    } else {
                        (key, sanitize_value(value))
                    }
                })
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = McpError::transport("Connection failed");
        assert_eq!(error.to_string(), "Transport error: Connection failed");
        assert_eq!(error.category(), "transport");
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_error_recovery() {
        assert!(McpError::timeout("request timeout").is_recoverable());
        assert!(McpError::Backpressure("queue".to_string()).is_recoverable());
        assert!(!McpError::validation("invalid input").is_recoverable());
    }

    #[test]
    fn test_wire_codes() {
        assert_eq!(McpError::parse("x").code(), -32700);
        assert_eq!(McpError::invalid_request("x").code(), -32600);
        assert_eq!(McpError::ToolNotFound("x".into()).code(), -32601);
        assert_eq!(McpError::invalid_params("x").code(), -32602);
        assert_eq!(McpError::internal("x").code(), -32603);
        assert_eq!(McpError::timeout("x").code(), -32603);
        assert_eq!(McpError::RateLimited("x".into()).code(), -32429);
        assert_eq!(McpError::unsupported_feature("a", "b", "c").code(), -32002);
    }

    #[test]
    fn test_unsupported_feature_data() {
        let object = McpError::unsupported_feature(
            "sampling",
            "Claude Desktop",
            "Call the model from the server",
        )
        .to_error_object();

        assert_eq!(object.code, -32002);
        let data = object.data.expect("data is attached");
        assert_eq!(data["feature"], "sampling");
        assert_eq!(data["client"], "Claude Desktop");
        assert_eq!(data["workaround"], "Call the model from the server");
    }

    #[test]
    fn test_sanitize_strips_credentials_and_addresses() {
        let message = "connect failed: password=hunter2 at 10.0.0.12:5432 with Bearer abc.def";
        let cleaned = sanitize_message(message);
        assert!(!cleaned.contains("hunter2"));
        assert!(!cleaned.contains("10.0.0.12"));
        assert!(!cleaned.contains("abc.def"));
        assert!(cleaned.contains("[REDACTED]"));
    }

    #[test]
    fn test_sanitize_drops_backtrace_lines() {
        let message = "boom\nstack backtrace:\n   0: rust_begin_unwind";
        assert_eq!(sanitize_message(message), "boom");

        let cleaned = sanitize_message("postgres://admin:secret@db/app unreachable");
        assert!(!cleaned.contains("admin:secret"));
    }

    #[test]
    fn test_rpc_error_passthrough() {
        let error = McpError::rpc(
            -32050,
            "quota exceeded",
            Some(json!({
                "password": "hunter2",
                "api_key": "sk-live-123",
                "upstream": {"Authorization": {"scheme": "Bearer"}, "clientSecret": 42},
                "retryAfter": 5,
                "note": "see https://admin:pw@internal.example/x"
            })),
        );
        let object = error.to_error_object();
        assert_eq!(object.code, -32050);
        assert_eq!(object.message, "quota exceeded");
        assert_eq!(
            object.data,
            Some(json!({
                "password": "[REDACTED]",
                "api_key": "[REDACTED]",
                "upstream": {"Authorization": "[REDACTED]", "clientSecret": "[REDACTED]"},
                "retryAfter": 5,
                "note": "see https://[REDACTED]@internal.example/x"
            }))
        );
    }
}
