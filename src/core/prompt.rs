//! Prompt system for MCP servers
//!
//! Prompts are templates clients render through `prompts/get`.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::context::RequestContext;
use crate::core::error::{McpError, McpResult};
use crate::protocol::types::{PromptInfo, PromptMessage, PromptResult};

/// Trait for implementing prompt handlers
#[async_trait]
pub trait PromptHandler: Send + Sync {
    /// Generate prompt messages with the given arguments
    async fn get(
        &self,
        ctx: RequestContext,
        arguments: HashMap<String, Value>,
    ) -> McpResult<PromptResult>;
}

/// A registered prompt with its handler
#[derive(Clone)]
pub struct Prompt {
    /// Descriptor advertised by `prompts/list`
    pub info: PromptInfo,
    pub handler: Arc<dyn PromptHandler>,
    pub enabled: bool,
}

impl Prompt {
    pub fn new<H>(info: PromptInfo, handler: H) -> Self
    where
        H: PromptHandler + 'static,
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

    /// Execute the prompt if it's enabled and every required argument is present
    pub async fn get(
        &self,
        ctx: RequestContext,
        arguments: HashMap<String, Value>,
    ) -> McpResult<PromptResult> {
        if !self.enabled {
            return Err(McpError::PromptNotFound(format!(
                "Prompt '{}' is disabled",
                self.info.name
            )));
        }

        if let Some(ref args) = self.info.arguments {
            for arg in args {
                if arg.required.unwrap_or(false) && !arguments.contains_key(&arg.name) {
                    return Err(McpError::invalid_params(format!(
                        "Required argument '{}' missing for prompt '{}'",
                        arg.name, self.info.name
                    )));
                }
            }
        }

        self.handler.get(ctx, arguments).await
    }
}

impl std::fmt::Debug for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prompt")
            .field("info", &self.info)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Prompt that renders a fixed template, substituting `{name}` placeholders
/// with the caller's arguments
pub struct TemplatePrompt {
    template: String,
}

impl TemplatePrompt {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

#[async_trait]
impl PromptHandler for TemplatePrompt {
    async fn get(
        &self,
        _ctx: RequestContext,
        arguments: HashMap<String, Value>,
    ) -> McpResult<PromptResult> {
        let rendered = arguments
            .iter()
            .fold(self.template.clone(), |text, (name, value)| {
                let replacement = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                text.replace(&format!("{{{name}}}"), &replacement)
            });

        Ok(PromptResult {
            description: None,
            messages: vec![PromptMessage::user_text(rendered)],
        })
    }
}
