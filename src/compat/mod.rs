//! Client compatibility
//!
//! Detects which MCP client connected, derives what the server may advertise to it,
//! and degrades requests and responses the client cannot handle.

pub mod detector;
pub mod fallback;
pub mod profiles;

pub use detector::CompatibilityDetector;
pub use fallback::{FallbackHandler, flatten_content};
pub use profiles::{ClientProfile, GENERIC_PROFILE, default_catalog};

/// Feature names used by client profiles
pub mod features {
    pub const TOOLS: &str = "tools";
    pub const RESOURCES: &str = "resources";
    pub const PROMPTS: &str = "prompts";
    pub const SAMPLING: &str = "sampling";
    pub const ROOTS: &str = "roots";
    pub const DISCOVERY: &str = "discovery";
    pub const SUBSCRIPTIONS: &str = "subscriptions";
    pub const PROGRESS: &str = "progress";
    pub const LOGGING: &str = "logging";
    /// Multi-part, non-text content in results
    pub const RICH_CONTENT: &str = "rich_content";
}
