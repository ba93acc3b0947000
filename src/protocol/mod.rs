//! MCP protocol implementation
//!
//! This module contains the JSON-RPC envelope and MCP payload types, the method
//! table, request validation and the line codec used by the transports.

pub mod codec;
pub mod messages;
pub mod methods;
pub mod types;
pub mod validation;

// Re-export commonly used types and constants
pub use codec::JsonCodec;
pub use messages::*;
pub use methods::Method;
pub use types::*;
pub use validation::{RequestRejection, parse_optional_params, parse_params, parse_request};

// Re-export method constants for convenience
pub use methods::{
    CANCELLED, INITIALIZE, INITIALIZED, LOGGING_MESSAGE, PING, PROGRESS, PROMPTS_GET,
    PROMPTS_LIST, PROMPTS_LIST_CHANGED, RESOURCES_LIST, RESOURCES_LIST_CHANGED, RESOURCES_READ,
    RESOURCES_SUBSCRIBE, RESOURCES_UNSUBSCRIBE, RESOURCES_UPDATED, ROOTS_LIST,
    ROOTS_LIST_CHANGED, SAMPLING_CREATE_MESSAGE, TOOLS_CALL, TOOLS_LIST, TOOLS_LIST_CHANGED,
};
