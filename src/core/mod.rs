//! Core abstractions and types for the MCP runtime
//!
//! This module contains the fundamental building blocks: error handling,
//! request contexts, tool/resource/prompt handlers, object pools, logging and
//! dispatch metrics.

pub mod context;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pool;
pub mod prompt;
pub mod resource;
pub mod tool;

// Re-export commonly used items
pub use context::RequestContext;
pub use error::{McpError, McpResult};
pub use metrics::{DispatchStats, StatsSnapshot, UNKNOWN_METHOD};
pub use pool::{BufferPool, ObjectPool, PoolConfig, PooledBuffer, Reset, SizeClass};
pub use prompt::{Prompt, PromptHandler, TemplatePrompt};
pub use resource::{Resource, ResourceHandler, TextResource};
pub use tool::{FnTool, StaticTextTool, Tool, ToolHandler};

// Re-export protocol types through core for convenience
pub use crate::protocol::types::{
    PromptArgument, PromptInfo, PromptMessage, PromptResult, ResourceInfo, ToolInfo, ToolResult,
};
