//! Transport layer implementations
//!
//! This module provides the server transport trait and the line-delimited JSON
//! transport, with a STDIO flavor for processes launched by an MCP client.

pub mod line;
pub mod traits;

#[cfg(feature = "stdio")]
pub mod stdio;

// Re-export commonly used types
pub use line::{LineSender, LineTransport};
pub use traits::{MessageFuture, MessageHandler, ServerTransport, TransportConfig};

#[cfg(feature = "stdio")]
pub use stdio::StdioServerTransport;
