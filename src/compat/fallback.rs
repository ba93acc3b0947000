//! Degrade-gracefully behavior for clients missing features

use serde_json::{Value, json};
use std::sync::Arc;

use super::detector::CompatibilityDetector;
use super::features::*;
use super::profiles::ClientProfile;
use crate::core::error::{McpError, McpResult};
use crate::protocol::methods::{self, feature_for_method};
use crate::protocol::types::{ContentBlock, JsonRpcRequest};

/// Tool name `resources/read` is rewritten to
pub const READ_RESOURCE_TOOL: &str = "read_resource";
/// Tool name `prompts/get` is rewritten to
pub const GET_PROMPT_TOOL: &str = "get_prompt";

/// Per-client adapter built from the detected profile
#[derive(Debug, Clone)]
pub struct FallbackHandler {
    profile: Arc<ClientProfile>,
}

impl FallbackHandler {
    pub fn new(profile: Arc<ClientProfile>) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &Arc<ClientProfile> {
        &self.profile
    }

    pub fn supports(&self, feature: &str) -> bool {
        self.profile.supports_feature(feature)
    }

    /// The -32002 error for a feature this client can't use
    pub fn unsupported_method(&self, feature: &str) -> McpError {
        let (_, workaround) = CompatibilityDetector::check_feature_support(&self.profile, feature);
        McpError::unsupported_feature(feature, self.profile.name.clone(), workaround)
    }

    /// Reject a method whose feature the client lacks. Methods that
    /// [`FallbackHandler::rewrite_request`] can translate are let through.
    pub fn check_method(&self, method: &str) -> McpResult<()> {
        let Some(feature) = feature_for_method(method) else {
            return Ok(());
        };
        if self.supports(feature) || self.can_rewrite(method) {
            return Ok(());
        }
        Err(self.unsupported_method(feature))
    }

    fn can_rewrite(&self, method: &str) -> bool {
        match method {
            methods::RESOURCES_READ => self.needs_resource_bridge(),
            methods::PROMPTS_GET => self.needs_prompt_bridge(),
            _ => false,
        }
    }

    /// Client reaches resources through the `read_resource` tool
    pub fn needs_resource_bridge(&self) -> bool {
        !self.supports(RESOURCES) && self.supports(TOOLS)
    }

    /// Client reaches prompts through the `get_prompt` tool
    pub fn needs_prompt_bridge(&self) -> bool {
        !self.supports(PROMPTS) && self.supports(TOOLS)
    }

    /// Rewrite `resources/read` and `prompts/get` into the equivalent `tools/call`
    /// for a client lacking those namespaces. `None` means no rewrite applies.
    pub fn rewrite_request(&self, request: &JsonRpcRequest) -> Option<JsonRpcRequest> {
        if !self.can_rewrite(&request.method) {
            return None;
        }
        let params = request.params.clone().unwrap_or_else(|| json!({}));
        let call = match request.method.as_str() {
            methods::RESOURCES_READ => json!({
                "name": READ_RESOURCE_TOOL,
                "arguments": { "uri": params.get("uri").cloned().unwrap_or(Value::Null) },
            }),
            methods::PROMPTS_GET => json!({
                "name": GET_PROMPT_TOOL,
                "arguments": {
                    "name": params.get("name").cloned().unwrap_or(Value::Null),
                    "arguments": params.get("arguments").cloned().unwrap_or_else(|| json!({})),
                },
            }),
            _ => return None,
        };

        Some(JsonRpcRequest {
            jsonrpc: request.jsonrpc.clone(),
            id: request.id.clone(),
            method: methods::TOOLS_CALL.to_string(),
            params: Some(call),
        })
    }

    /// Whether results must be reduced to plain text for this client
    pub fn needs_flattening(&self) -> bool {
        !self.supports(RICH_CONTENT)
    }

    /// Flatten multi-part content in a result if the client only handles text.
    /// Covers tool results (`content`) and prompt results (`messages[].content`).
    pub fn adapt_result(&self, mut result: Value) -> Value {
        if !self.needs_flattening() {
            return result;
        }

        if let Some(content) = result.get_mut("content") {
            flatten_value(content);
        }
        if let Some(Value::Array(messages)) = result.get_mut("messages") {
            for message in messages {
                if let Some(content) = message.get_mut("content") {
                    flatten_block_value(content);
                }
            }
        }
        result
    }

    /// Limitations worth telling the client about in `initialize`
    pub fn instructions(&self) -> Option<String> {
        if self.profile.limitations.is_empty() {
            return None;
        }
        Some(format!(
            "Detected client profile '{}'. Known limitations: {}",
            self.profile.name,
            self.profile.limitations.join("; ")
        ))
    }
}

/// Keep text blocks and turn every other block into text holding its JSON form
pub fn flatten_content(blocks: Vec<ContentBlock>) -> Vec<ContentBlock> {
    blocks.into_iter().map(flatten_block).collect()
}

fn flatten_block(block: ContentBlock) -> ContentBlock {
    match block {
        ContentBlock::Text { .. } => block,
        other => match serde_json::to_string(&other) {
            Ok(text) => ContentBlock::text(text),
            Err(_) => other,
        },
    }
}

fn flatten_value(content: &mut Value) {
    if let Value::Array(blocks) = content {
        for block in blocks {
            flatten_block_value(block);
        }
    }
}

fn flatten_block_value(block: &mut Value) {
    if block.get("type").and_then(Value::as_str) == Some("text") {
        return;
    }
    *block = json!({ "type": "text", "text": block.to_string() });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::CompatibilityDetector;
    use crate::core::error::McpError;
    use crate::protocol::types::error_codes;
    use pretty_assertions::assert_eq;

    fn handler_for(name: &str) -> FallbackHandler {
        let detector = CompatibilityDetector::new();
        FallbackHandler::new(detector.find_profile(name).unwrap())
    }

    #[test]
    fn test_unsupported_method_error() {
        let claude = handler_for("Claude Desktop");
        let err = claude.check_method("sampling/createMessage").unwrap_err();

        assert_eq!(err.code(), error_codes::UNSUPPORTED_FEATURE);
        let object = err.to_error_object();
        let data = object.data.unwrap();
        assert_eq!(data["feature"], "sampling");
        assert_eq!(data["client"], "Claude Desktop");
        assert!(data["workaround"].as_str().unwrap().contains("server-side"));
    }

    #[test]
    fn test_supported_and_ungated_methods_pass() {
        let claude = handler_for("Claude Desktop");
        assert!(claude.check_method("tools/call").is_ok());
        assert!(claude.check_method("ping").is_ok());
        assert!(matches!(
            claude.check_method("resources/subscribe"),
            Err(McpError::UnsupportedFeature { .. })
        ));
    }

    #[test]
    fn test_resource_read_rewritten_for_cursor() {
        let cursor = handler_for("Cursor");
        assert!(cursor.check_method("resources/read").is_ok());
        assert!(cursor.check_method("resources/list").is_err());

        let request = JsonRpcRequest::new(
            json!(7),
            "resources/read",
            Some(json!({ "uri": "file:///notes.txt" })),
        );
        let rewritten = cursor.rewrite_request(&request).unwrap();
        assert_eq!(rewritten.id, Some(json!(7)));
        assert_eq!(rewritten.method, "tools/call");
        assert_eq!(
            rewritten.params,
            Some(json!({ "name": "read_resource", "arguments": { "uri": "file:///notes.txt" } }))
        );
    }

    #[test]
    fn test_prompt_get_rewritten_for_cursor() {
        let cursor = handler_for("Cursor");
        let request = JsonRpcRequest::new(
            json!("p"),
            "prompts/get",
            Some(json!({ "name": "greeting", "arguments": { "name": "Ada" } })),
        );
        let rewritten = cursor.rewrite_request(&request).unwrap();
        assert_eq!(
            rewritten.params,
            Some(json!({
                "name": "get_prompt",
                "arguments": { "name": "greeting", "arguments": { "name": "Ada" } }
            }))
        );
    }

    #[test]
    fn test_no_rewrite_when_namespace_supported() {
        let claude = handler_for("Claude Desktop");
        let request = JsonRpcRequest::new(json!(1), "resources/read", Some(json!({ "uri": "x" })));
        assert!(claude.rewrite_request(&request).is_none());
    }

    #[test]
    fn test_flatten_content() {
        let blocks = vec![
            ContentBlock::text("plain"),
            ContentBlock::image("aGVsbG8=", "image/png"),
        ];
        let flat = flatten_content(blocks);
        assert_eq!(flat[0].as_text(), Some("plain"));
        let image: Value = serde_json::from_str(flat[1].as_text().unwrap()).unwrap();
        assert_eq!(image["type"], "image");
        assert_eq!(image["mimeType"], "image/png");
    }

    #[test]
    fn test_adapt_result_only_for_text_clients() {
        let result = json!({
            "content": [
                { "type": "text", "text": "a" },
                { "type": "resource_link", "uri": "file:///a", "name": "a" }
            ],
            "isError": false
        });

        let vscode = handler_for("VS Code");
        assert_eq!(vscode.adapt_result(result.clone()), result);

        let cursor = handler_for("Cursor");
        let adapted = cursor.adapt_result(result);
        assert_eq!(adapted["content"][0], json!({ "type": "text", "text": "a" }));
        assert_eq!(adapted["content"][1]["type"], "text");
        assert!(adapted["content"][1]["text"].as_str().unwrap().contains("file:///a"));
    }

    #[test]
    fn test_instructions_list_limitations() {
        assert!(handler_for("VS Code").instructions().is_none());
        let text = handler_for("Cursor").instructions().unwrap();
        assert!(text.contains("Cursor"));
        assert!(text.contains("Only tools are exposed"));
    }
}
