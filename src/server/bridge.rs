// ! Tool bridges for tool-only clients
// !
// ! Clients that only speak `tools/*` reach resources and prompts through two
// ! synthetic tools. These helpers describe the tools and convert results.

use serde_json::json;

use crate::compat::fallback::{GET_PROMPT_TOOL, READ_RESOURCE_TOOL};
use crate::protocol::types::{
    ContentBlock, PromptResult, ResourceContents, Role, ToolInfo, ToolResult,
};

/// Descriptor of the `read_resource` tool
pub fn read_resource_tool() -> ToolInfo {
    ToolInfo::new(
        READ_RESOURCE_TOOL,
        Some("Read a server resource by URI".to_string()),
        json!({
            "type": "object",
            "properties": {
                "uri": { "type": "string", "description": "URI of the resource" }
            },
            "required": ["uri"]
        }),
    )
}

/// Descriptor of the `get_prompt` tool
pub fn get_prompt_tool() -> ToolInfo {
    ToolInfo::new(
        GET_PROMPT_TOOL,
        Some("Render a server prompt by name".to_string()),
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Name of the prompt" },
                "arguments": { "type": "object", "description": "Prompt arguments" }
            },
            "required": ["name"]
        }),
    )
}

/// Resource contents as a tool result: text stays text, blobs are embedded
pub fn resource_result(contents: Vec<ResourceContents>) -> ToolResult {
    let content = contents
        .into_iter()
        .map(|item| match item {
            ResourceContents::Text { text, .. } => ContentBlock::text(text),
            blob @ ResourceContents::Blob { .. } => ContentBlock::embedded_resource(blob),
        })
        .collect();
    ToolResult {
        content,
        is_error: false,
        structured_content: None,
    }
}

/// Prompt messages as a tool result, one block per message
pub fn prompt_result(result: PromptResult) -> ToolResult {
    let mut content = Vec::with_capacity(result.messages.len() + 1);
    if let Some(description) = result.description {
        content.push(ContentBlock::text(description));
    }
    for message in result.messages {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        let block = match message.content {
            ContentBlock::Text { text } => ContentBlock::text(format!("{role}: {text}")),
            other => other,
        };
        content.push(block);
    }
    ToolResult {
        content,
        is_error: false,
        structured_content: None,
    }
}
