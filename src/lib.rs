// Copyright (c) 2025 MCP Rust Contributors
// SPDX-License-Identifier: MIT

//! # MCP Runtime
//!
//! An in-process runtime for the [Model Context Protocol (MCP)](https://modelcontextprotocol.io/):
//! JSON-RPC 2.0 parsing and dispatch to registered tools, resources and prompts,
//! a line-delimited transport, client compatibility detection with graceful
//! fallbacks, and asynchronous notification delivery.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "stdio")]
//! # {
//! use mcp_runtime::prelude::*;
//!
//! struct EchoHandler;
//!
//! #[async_trait]
//! impl ToolHandler for EchoHandler {
//!     async fn call(
//!         &self,
//!         _ctx: RequestContext,
//!         arguments: HashMap<String, Value>,
//!     ) -> McpResult<ToolResult> {
//!         let message = arguments
//!             .get("message")
//!             .and_then(|v| v.as_str())
//!             .unwrap_or("Hello, World!");
//!         Ok(ToolResult::text(message))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> McpResult<()> {
//!     let server = McpServer::new("echo-server", "1.0.0");
//!
//!     server
//!         .add_tool(
//!             "echo",
//!             Some("Echo a message".to_string()),
//!             json!({
//!                 "type": "object",
//!                 "properties": { "message": { "type": "string" } },
//!                 "required": ["message"]
//!             }),
//!             EchoHandler,
//!         )
//!         .await?;
//!
//!     server.run_with_stdio().await
//! }
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`core`]: errors, request contexts, handler traits, object pools, logging and metrics
//! - [`protocol`]: JSON-RPC envelopes, MCP payloads, method table, validation and codec
//! - [`transport`]: the transport trait and the line-delimited (STDIO) transport
//! - [`compat`]: client profiles, detection and fallback adaptation
//! - [`server`]: the dispatch engine
//! - [`notifications`]: queued, per-client notification delivery

pub mod compat;
pub mod core;
pub mod notifications;
pub mod protocol;
pub mod server;
pub mod transport;

// Re-export commonly used types for convenience
pub use core::error::{McpError, McpResult};
pub use protocol::types::*;

/// Prelude module for convenient imports
///
/// Use `use mcp_runtime::prelude::*;` to import everything a server needs.
pub mod prelude {
    // Core types and traits
    pub use crate::core::{
        context::RequestContext,
        error::{McpError, McpResult},
        prompt::{Prompt, PromptHandler, TemplatePrompt},
        resource::{Resource, ResourceHandler, TextResource},
        tool::{FnTool, StaticTextTool, Tool, ToolHandler},
    };

    // Protocol types and messages
    pub use crate::protocol::messages::*;
    pub use crate::protocol::types::*;

    // Server, compatibility and notifications
    pub use crate::compat::{ClientProfile, CompatibilityDetector, FallbackHandler};
    pub use crate::notifications::{DeliveryHandler, Notifier, NotifierConfig};
    pub use crate::server::{DispatchHook, McpServer, MethodHandler, ServerConfig};

    // Transport layer implementations
    pub use crate::transport::{LineTransport, ServerTransport, TransportConfig};

    #[cfg(feature = "stdio")]
    pub use crate::transport::StdioServerTransport;

    #[cfg(feature = "tracing-subscriber")]
    pub use crate::core::logging::init_tracing;

    // Essential external types
    pub use async_trait::async_trait;
    pub use serde_json::{Value, json};
    pub use std::collections::HashMap;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        // Basic smoke test to ensure all modules are accessible
        let error = McpError::protocol("test");
        assert_eq!(error.code(), error_codes::INTERNAL_ERROR);
        let _server = prelude::McpServer::new("smoke", "0.0.0");
    }
}
