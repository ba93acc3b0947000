//! MCP server implementation
//!
//! This module provides the dispatch engine, its capability registries, the
//! hooks and rate limiter applied around every request, and the tool bridges
//! offered to tool-only clients.

pub mod bridge;
pub mod hooks;
pub mod mcp_server;
pub mod rate_limit;
pub mod registry;

// Re-export the main server type
pub use hooks::{DispatchHook, DispatchOutcome, LoggingHook};
pub use mcp_server::{McpServer, MethodHandler, ServerConfig};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use registry::{Registration, Registry};
