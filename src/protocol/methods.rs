// ! MCP Protocol Method Constants
// !
// ! Method names used on the wire plus the fixed routing enumeration the
// ! dispatch engine matches on.

// Core protocol methods
pub const INITIALIZE: &str = "initialize";
pub const INITIALIZED: &str = "notifications/initialized";
pub const PING: &str = "ping";

// Tool-related methods
pub const TOOLS_LIST: &str = "tools/list";
pub const TOOLS_CALL: &str = "tools/call";
pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";

// Resource-related methods
pub const RESOURCES_LIST: &str = "resources/list";
pub const RESOURCES_READ: &str = "resources/read";
pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";
pub const RESOURCES_UPDATED: &str = "notifications/resources/updated";
pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";

// Prompt-related methods
pub const PROMPTS_LIST: &str = "prompts/list";
pub const PROMPTS_GET: &str = "prompts/get";
pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";

// Optional methods served through registered extensions
pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";
pub const ROOTS_LIST: &str = "roots/list";
pub const ROOTS_LIST_CHANGED: &str = "notifications/roots/list_changed";
pub const DISCOVERY_PREFIX: &str = "discovery/";

// Logging and progress
pub const LOGGING_MESSAGE: &str = "notifications/message";
pub const PROGRESS: &str = "notifications/progress";
pub const CANCELLED: &str = "notifications/cancelled";

/// Methods with built-in routing. Anything else is looked up among the
/// registered extension methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Initialize,
    Initialized,
    Ping,
    ToolsList,
    ToolsCall,
    ResourcesList,
    ResourcesRead,
    ResourcesSubscribe,
    ResourcesUnsubscribe,
    PromptsList,
    PromptsGet,
    Cancelled,
}

impl Method {
    /// Resolve a wire method name
    pub fn parse(name: &str) -> Option<Self> {
        let method = match name {
            INITIALIZE => Method::Initialize,
            INITIALIZED => Method::Initialized,
            PING => Method::Ping,
            TOOLS_LIST => Method::ToolsList,
            TOOLS_CALL => Method::ToolsCall,
            RESOURCES_LIST => Method::ResourcesList,
            RESOURCES_READ => Method::ResourcesRead,
            RESOURCES_SUBSCRIBE => Method::ResourcesSubscribe,
            RESOURCES_UNSUBSCRIBE => Method::ResourcesUnsubscribe,
            PROMPTS_LIST => Method::PromptsList,
            PROMPTS_GET => Method::PromptsGet,
            CANCELLED => Method::Cancelled,
            _ => return None,
        };
        Some(method)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Initialize => INITIALIZE,
            Method::Initialized => INITIALIZED,
            Method::Ping => PING,
            Method::ToolsList => TOOLS_LIST,
            Method::ToolsCall => TOOLS_CALL,
            Method::ResourcesList => RESOURCES_LIST,
            Method::ResourcesRead => RESOURCES_READ,
            Method::ResourcesSubscribe => RESOURCES_SUBSCRIBE,
            Method::ResourcesUnsubscribe => RESOURCES_UNSUBSCRIBE,
            Method::PromptsList => PROMPTS_LIST,
            Method::PromptsGet => PROMPTS_GET,
            Method::Cancelled => CANCELLED,
        }
    }
}

/// Compatibility feature a method belongs to, if it is gated at all
pub fn feature_for_method(method: &str) -> Option<&'static str> {
    use crate::compat::features;

    if method == RESOURCES_SUBSCRIBE || method == RESOURCES_UNSUBSCRIBE {
        return Some(features::SUBSCRIPTIONS);
    }

    let (namespace, _) = method.split_once('/')?;
    match namespace {
        "tools" => Some(features::TOOLS),
        "resources" => Some(features::RESOURCES),
        "prompts" => Some(features::PROMPTS),
        "roots" => Some(features::ROOTS),
        "sampling" => Some(features::SAMPLING),
        "discovery" => Some(features::DISCOVERY),
        _ => None,
    }
}
