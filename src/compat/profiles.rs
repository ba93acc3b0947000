//! Client profile catalog
//!
//! Known MCP clients and what they can do. Profiles are matched in catalog
//! order against `"<name> <version>"`; the catch-all generic profile is last.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::Arc;

use super::features::*;

/// Name of the catch-all profile
pub const GENERIC_PROFILE: &str = "Generic MCP Client";

/// What one client supports, and how to work around what it doesn't
#[derive(Debug, Clone)]
pub struct ClientProfile {
    pub name: String,
    /// Case-insensitive pattern matched against `"<name> <version>"`
    pub match_pattern: Regex,
    pub supported_features: Vec<&'static str>,
    /// Features the server must offer for the client to be useful
    pub required_features: Vec<&'static str>,
    /// Human readable notes, returned as `initialize` instructions
    pub limitations: Vec<String>,
    /// Feature name to workaround text
    pub workarounds: HashMap<&'static str, String>,
    /// Matches every client; only used as the last resort
    pub catch_all: bool,
}

impl ClientProfile {
    /// Start a profile. Panics on an invalid pattern, which is a programming error
    /// in a static catalog; use [`ClientProfile::try_new`] for runtime input.
    pub fn new(name: &str, pattern: &str) -> Self {
        match Self::try_new(name, pattern) {
            Ok(profile) => profile,
            Err(err) => panic!("invalid pattern for client profile '{name}': {err}"),
        }
    }

    pub fn try_new(name: &str, pattern: &str) -> Result<Self, regex::Error> {
        let match_pattern = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            name: name.to_string(),
            match_pattern,
            supported_features: Vec::new(),
            required_features: Vec::new(),
            limitations: Vec::new(),
            workarounds: HashMap::new(),
            catch_all: false,
        })
    }

    pub fn supports(mut self, features: &[&'static str]) -> Self {
        self.supported_features.extend_from_slice(features);
        self
    }

    pub fn requires(mut self, features: &[&'static str]) -> Self {
        self.required_features.extend_from_slice(features);
        self
    }

    pub fn limitation(mut self, note: &str) -> Self {
        self.limitations.push(note.to_string());
        self
    }

    pub fn workaround(mut self, feature: &'static str, text: &str) -> Self {
        self.workarounds.insert(feature, text.to_string());
        self
    }

    pub fn catch_all(mut self) -> Self {
        self.catch_all = true;
        self
    }

    pub fn supports_feature(&self, feature: &str) -> bool {
        self.supported_features.contains(&feature)
    }

    pub fn matches(&self, identity: &str) -> bool {
        self.match_pattern.is_match(identity)
    }
}

static DEFAULT_CATALOG: Lazy<Vec<Arc<ClientProfile>>> = Lazy::new(|| {
    vec![
        Arc::new(
            ClientProfile::new("Claude Desktop", r"claude[\s_-]*desktop")
                .supports(&[TOOLS, RESOURCES, PROMPTS, PROGRESS, LOGGING, RICH_CONTENT])
                .requires(&[TOOLS])
                .limitation("Sampling requests are not supported")
                .limitation("Resource subscriptions are not delivered")
                .workaround(
                    SAMPLING,
                    "Run the model call server-side and return the text from a tool",
                )
                .workaround(
                    SUBSCRIPTIONS,
                    "Re-read the resource or poll resources/list instead of subscribing",
                )
                .workaround(
                    DISCOVERY,
                    "Call tools/list, resources/list and prompts/list instead",
                )
                .workaround(ROOTS, "Pass directories to tools as explicit arguments"),
        ),
        Arc::new(
            ClientProfile::new("VS Code", r"visual\s*studio\s*code|vs\s*code|copilot")
                .supports(&[
                    TOOLS,
                    RESOURCES,
                    PROMPTS,
                    SAMPLING,
                    ROOTS,
                    DISCOVERY,
                    SUBSCRIPTIONS,
                    PROGRESS,
                    LOGGING,
                    RICH_CONTENT,
                ])
                .requires(&[TOOLS]),
        ),
        Arc::new(
            ClientProfile::new("Cursor", r"cursor")
                .supports(&[TOOLS, PROGRESS])
                .requires(&[TOOLS])
                .limitation("Only tools are exposed to the model")
                .limitation("Tool results are rendered as plain text")
                .workaround(RESOURCES, "Read resources through the read_resource tool")
                .workaround(PROMPTS, "Render prompts through the get_prompt tool")
                .workaround(
                    SAMPLING,
                    "Run the model call server-side and return the text from a tool",
                )
                .workaround(
                    SUBSCRIPTIONS,
                    "Call the read_resource tool again to observe changes",
                ),
        ),
        Arc::new(
            ClientProfile::new("Continue", r"\bcontinue\b")
                .supports(&[TOOLS, RESOURCES, PROMPTS, RICH_CONTENT])
                .requires(&[TOOLS])
                .limitation("No progress or log notifications")
                .workaround(
                    SUBSCRIPTIONS,
                    "Re-read the resource or poll resources/list instead of subscribing",
                ),
        ),
        Arc::new(
            ClientProfile::new("Cline", r"\bcline\b")
                .supports(&[TOOLS, RESOURCES, PROGRESS, RICH_CONTENT])
                .requires(&[TOOLS])
                .workaround(PROMPTS, "Render prompts through the get_prompt tool"),
        ),
        Arc::new(
            ClientProfile::new("Zed", r"\bzed\b")
                .supports(&[TOOLS, PROMPTS])
                .requires(&[PROMPTS])
                .limitation("Tool results are rendered as plain text")
                .workaround(RESOURCES, "Read resources through the read_resource tool"),
        ),
        Arc::new(
            ClientProfile::new(GENERIC_PROFILE, r".*")
                .supports(&[TOOLS, RESOURCES, PROMPTS, RICH_CONTENT])
                .catch_all(),
        ),
    ]
});

/// The built-in catalog, in match order
pub fn default_catalog() -> Vec<Arc<ClientProfile>> {
    DEFAULT_CATALOG.clone()
}
