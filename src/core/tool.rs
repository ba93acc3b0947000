//! Tool system for MCP servers
//!
//! Tools are functions clients call through `tools/call`. A registered [`Tool`]
//! pairs the descriptor advertised by `tools/list` with the handler that runs it.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::context::RequestContext;
use crate::core::error::{McpError, McpResult};
use crate::protocol::types::{ToolInfo, ToolResult};

/// Trait for implementing tool handlers
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool with the given arguments.
    ///
    /// Long-running handlers should watch `ctx.cancelled()` and stop early;
    /// the request's result is discarded once the context is cancelled.
    async fn call(&self, ctx: RequestContext, arguments: HashMap<String, Value>)
    -> McpResult<ToolResult>;
}

/// A registered tool with its handler
#[derive(Clone)]
pub struct Tool {
    /// Descriptor advertised by `tools/list`
    pub info: ToolInfo,
    /// Handler that implements the tool's functionality
    pub handler: Arc<dyn ToolHandler>,
    /// Whether the tool is currently enabled
    pub enabled: bool,
}

impl Tool {
    /// Create a new tool from a raw JSON schema
    pub fn new<H>(name: String, description: Option<String>, input_schema: Value, handler: H) -> Self
    where
        H: ToolHandler + 'static,
    {
        Self::from_info(ToolInfo::new(name, description, input_schema), handler)
    }

    /// Create a tool from a complete descriptor
    pub fn from_info<H>(info: ToolInfo, handler: H) -> Self
    where
        H: ToolHandler + 'static,
    {
        Self {
            info,
            handler: Arc::new(handler),
            enabled: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Check the arguments against the schema's required list
    pub fn validate_arguments(&self, arguments: &HashMap<String, Value>) -> McpResult<()> {
        match self.info.input_schema.missing_required(arguments) {
            Some(missing) => Err(McpError::invalid_params(format!(
                "missing required argument '{missing}' for tool '{}'",
                self.info.name
            ))),
            None => Ok(()),
        }
    }

    /// Validate and execute the tool
    pub async fn call(
        &self,
        ctx: RequestContext,
        arguments: HashMap<String, Value>,
    ) -> McpResult<ToolResult> {
        if !self.enabled {
            return Err(McpError::ToolNotFound(format!(
                "Tool '{}' is disabled",
                self.info.name
            )));
        }

        self.validate_arguments(&arguments)?;
        self.handler.call(ctx, arguments).await
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("info", &self.info)
            .field("enabled", &self.enabled)
            .finish()
    }
}

// ============================================================================
// Handler adapters
// ============================================================================

/// Adapts a plain closure into a [`ToolHandler`]
pub struct FnTool<F>(pub F);

#[async_trait]
impl<F> ToolHandler for FnTool<F>
where
    F: Fn(HashMap<String, Value>) -> McpResult<ToolResult> + Send + Sync + 'static,
{
    async fn call(
        &self,
        _ctx: RequestContext,
        arguments: HashMap<String, Value>,
    ) -> McpResult<ToolResult> {
        (self.0)(arguments)
    }
}

/// Tool that always answers with the same text
#[derive(Debug, Clone)]
pub struct StaticTextTool {
    text: String,
}

impl StaticTextTool {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl ToolHandler for StaticTextTool {
    async fn call(
        &self,
        _ctx: RequestContext,
        _arguments: HashMap<String, Value>,
    ) -> McpResult<ToolResult> {
        Ok(ToolResult::text(self.text.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::ContentBlock;
    use serde_json::json;

    struct EchoArgs;

    #[async_trait]
    impl ToolHandler for EchoArgs {
        async fn call(
            &self,
            _ctx: RequestContext,
            arguments: HashMap<String, Value>,
        ) -> McpResult<ToolResult> {
            let message = arguments
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Ok(ToolResult::text(message))
        }
    }

    fn echo_tool() -> Tool {
        Tool::new(
            "echo".to_string(),
            Some("Echo a message".to_string()),
            json!({
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"]
            }),
            EchoArgs,
        )
    }

    #[tokio::test]
    async fn test_tool_call() {
        let tool = echo_tool();
        let mut args = HashMap::new();
        args.insert("message".to_string(), json!("hi"));

        let result = tool.call(RequestContext::default(), args).await.unwrap();
        assert_eq!(result.content, vec![ContentBlock::text("hi")]);
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let tool = echo_tool();
        let err = tool
            .call(RequestContext::default(), HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_disabled_tool() {
        let mut tool = echo_tool();
        tool.disable();
        let err = tool
            .call(RequestContext::default(), HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_closure_and_static_adapters() {
        let upper = Tool::new(
            "upper".to_string(),
            None,
            json!({"type": "object"}),
            FnTool(|args: HashMap<String, Value>| {
                let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
                Ok(ToolResult::text(text.to_uppercase()))
            }),
        );
        let mut args = HashMap::new();
        args.insert("text".to_string(), json!("abc"));
        let result = upper.call(RequestContext::default(), args).await.unwrap();
        assert_eq!(result.content[0].as_text(), Some("ABC"));

        let fixed = Tool::new("echo".into(), None, json!({}), StaticTextTool::new("echoed"));
        let result = fixed
            .call(RequestContext::default(), HashMap::new())
            .await
            .unwrap();
        assert_eq!(result.content[0].as_text(), Some("echoed"));
    }
}
