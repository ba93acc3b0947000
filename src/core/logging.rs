// ! Structured logging for the MCP runtime
// !
// ! Module provides structured error logging with categorization and
// ! per-request context, plus subscriber setup for binaries.

use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::{Level, error, info, span, warn};

use crate::core::context::RequestContext;
use crate::core::error::McpError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLogLevel {
    /// Critical errors that require immediate attention
    Critical,
    /// Errors that affect functionality but the runtime can continue
    Error,
    /// Warnings about potential issues
    Warning,
    /// Caller mistakes and other informational failures
    Info,
}

impl From<&McpError> for ErrorLogLevel {
    fn from(error: &McpError) -> Self {
        match error {
            McpError::Internal(_) => ErrorLogLevel::Critical,

            McpError::Transport(_) | McpError::Protocol(_) | McpError::Serialization(_) => {
                ErrorLogLevel::Error
            }

            McpError::Timeout(_)
            | McpError::Io(_)
            | McpError::Backpressure(_)
            | McpError::RateLimited(_) => ErrorLogLevel::Warning,

            McpError::Parse(_)
            | McpError::InvalidRequest(_)
            | McpError::Validation(_)
            | McpError::ToolNotFound(_)
            | McpError::ResourceNotFound(_)
            | McpError::PromptNotFound(_)
            | McpError::MethodNotFound(_)
            | McpError::InvalidParams(_)
            | McpError::DuplicateRegistration(_)
            | McpError::UnsupportedFeature { .. }
            | McpError::ClientNotFound(_)
            | McpError::Rpc(_)
            | McpError::Cancelled(_) => ErrorLogLevel::Info,
        }
    }
}

/// Extended error context for logging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Operation being performed when error occurred
    pub operation: String,
    /// Transport kind (stdio, line, ...)
    pub transport: Option<String>,
    /// Request method if applicable
    pub method: Option<String>,
    /// Connection / client identifier
    pub client_id: Option<String>,
    /// Request ID, rendered as JSON
    pub request_id: Option<String>,
    /// Additional context data
    pub extra: HashMap<String, Value>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            operation: "unknown".to_string(),
            transport: None,
            method: None,
            client_id: None,
            request_id: None,
            extra: HashMap::new(),
        }
    }
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    /// Context pre-filled from a request
    pub fn for_request(operation: impl Into<String>, ctx: &RequestContext) -> Self {
        Self {
            operation: operation.into(),
            method: ctx.method().map(str::to_string),
            client_id: Some(ctx.client_id().to_string()),
            request_id: ctx.request_id().map(Value::to_string),
            ..Default::default()
        }
    }

    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = Some(transport.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Structured error logger
pub struct ErrorLogger;

impl ErrorLogger {
    /// Log an error at the level its kind calls for
    pub fn log_error(error: &McpError, context: &ErrorContext) {
        let category = error.category();
        let recoverable = error.is_recoverable();
        let code = error.code();

        let log_data = json!({
            "error_category": category,
            "error_code": code,
            "error_recoverable": recoverable,
            "operation": context.operation,
            "transport": context.transport,
            "method": context.method,
            "client_id": context.client_id,
            "request_id": context.request_id,
            "extra_context": context.extra,
        });

        match ErrorLogLevel::from(error) {
            ErrorLogLevel::Critical => {
                error!(
                    target: "mcp_errors",
                    error_category = category,
                    error_code = code,
                    operation = context.operation.as_str(),
                    "CRITICAL MCP Error: {} - {}",
                    error,
                    log_data
                );
            }
            ErrorLogLevel::Error => {
                error!(
                    target: "mcp_errors",
                    error_category = category,
                    error_code = code,
                    operation = context.operation.as_str(),
                    "MCP Error: {} - {}",
                    error,
                    log_data
                );
            }
            ErrorLogLevel::Warning => {
                warn!(
                    target: "mcp_errors",
                    error_category = category,
                    error_code = code,
                    operation = context.operation.as_str(),
                    "MCP Warning: {} - {}",
                    error,
                    log_data
                );
            }
            ErrorLogLevel::Info => {
                info!(
                    target: "mcp_errors",
                    error_category = category,
                    error_code = code,
                    operation = context.operation.as_str(),
                    "MCP Info: {} - {}",
                    error,
                    log_data
                );
            }
        }
    }

    /// Span covering the handling of one request
    pub fn request_span(ctx: &RequestContext) -> tracing::Span {
        span!(
            Level::DEBUG,
            "mcp_request",
            client_id = ctx.client_id(),
            method = ctx.method(),
            request_id = ctx.request_id().map(|id| id.to_string()),
        )
    }
}

/// Install a stderr `fmt` subscriber filtered by `RUST_LOG` (default `info`).
/// Stdout is left alone because the stdio transport writes protocol traffic there.
#[cfg(feature = "tracing-subscriber")]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
