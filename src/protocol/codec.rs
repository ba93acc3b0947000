//! Line-delimited JSON codec
//!
//! Encodes outbound messages through pooled scratch buffers and decodes
//! inbound lines into request envelopes.

use serde::Serialize;
use std::sync::Arc;

use crate::core::error::{McpError, McpResult};
use crate::core::pool::{ObjectPool, PoolConfig, SizeClass};
use crate::protocol::types::JsonRpcRequest;
use crate::protocol::validation::{RequestRejection, parse_request};

/// Initial capacity of each encode scratch buffer
const SCRATCH_CAPACITY: usize = 4096;

/// JSON codec backed by a pool of encode buffers. Clones share the pool.
#[derive(Debug, Clone)]
pub struct JsonCodec {
    scratch: Arc<ObjectPool<Vec<u8>>>,
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl JsonCodec {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            scratch: Arc::new(ObjectPool::new(config.max_idle_per_class, || {
                Vec::with_capacity(SCRATCH_CAPACITY)
            })),
        }
    }

    /// Encode a message as one line, including the trailing newline
    pub fn encode_line<T: Serialize>(&self, message: &T) -> McpResult<Vec<u8>> {
        let mut scratch = self.scratch.take();
        let encoded = serde_json::to_writer(&mut scratch, message)
            .map(|()| {
                let mut line = Vec::with_capacity(scratch.len() + 1);
                line.extend_from_slice(&scratch);
                line.push(b'\n');
                line
            })
            .map_err(McpError::from);
        // A scratch buffer grown past the largest size class is not kept
        if scratch.capacity() <= SizeClass::Large.capacity() {
            self.scratch.put(scratch);
        }
        encoded
    }

    /// Encode a message as a JSON string without a newline
    pub fn encode<T: Serialize>(&self, message: &T) -> McpResult<String> {
        let mut line = self.encode_line(message)?;
        line.pop();
        String::from_utf8(line).map_err(|err| McpError::Serialization(err.to_string()))
    }

    /// Decode one line into a request envelope
    pub fn decode(&self, line: &[u8]) -> Result<JsonRpcRequest, RequestRejection> {
        parse_request(line)
    }

    /// Idle encode buffers
    pub fn idle_buffers(&self) -> usize {
        self.scratch.idle()
    }
}
