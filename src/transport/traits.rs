// ! Transport layer traits and abstractions
// !
// ! Module defines the server transport seam: something that turns a byte stream
// ! into JSON-RPC messages for a handler and writes replies and notifications back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::core::context::RequestContext;
use crate::core::error::McpResult;
use crate::notifications::DeliveryHandler;
use crate::protocol::types::{JsonRpcMessage, JsonRpcReply};

/// Future returned by a [`MessageHandler`]
pub type MessageFuture = Pin<Box<dyn Future<Output = Option<JsonRpcReply>> + Send + 'static>>;

/// Handles one raw inbound message. `None` means nothing is written back
/// (the message was a notification).
pub type MessageHandler = Arc<dyn Fn(RequestContext, Vec<u8>) -> MessageFuture + Send + Sync>;

/// Transport trait for MCP servers
///
/// A transport owns one connection. `start` begins reading in the background and
/// returns; `closed` resolves once reading has stopped and in-flight work drained.
#[async_trait]
pub trait ServerTransport: Send + Sync {
    /// Start reading and dispatching messages
    async fn start(&mut self) -> McpResult<()>;

    /// Set the handler that processes inbound messages. Must be called before `start`.
    fn set_handler(&mut self, handler: MessageHandler);

    /// Write one message to the peer. Concurrent sends never interleave.
    async fn send(&self, message: JsonRpcMessage) -> McpResult<()>;

    /// Stop reading and cancel in-flight requests
    async fn close(&mut self) -> McpResult<()>;

    /// Resolves when the connection has finished
    async fn closed(&self);

    /// Check if the transport is reading
    fn is_running(&self) -> bool;

    /// Identifier of the connected peer, used as the client id for requests
    fn client_id(&self) -> &str;

    /// Transport kind used to key notification delivery
    fn kind(&self) -> &'static str {
        "unknown"
    }

    /// Handler that pushes notifications to this connection's peer, if the
    /// transport can deliver them
    fn delivery_handler(&self) -> Option<Arc<dyn DeliveryHandler>> {
        None
    }

    /// Get server information for debugging
    fn server_info(&self) -> String {
        format!("{} server transport (running: {})", self.kind(), self.is_running())
    }
}

/// Transport configuration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum size of one inbound line in bytes
    pub max_message_size: usize,
    /// Write timeout in milliseconds
    pub write_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_size: 16 * 1024 * 1024, // 16 MB
            write_timeout_ms: 30_000,           // 30 seconds
        }
    }
}
