//! Client detection against the profile catalog

use parking_lot::RwLock;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::features::*;
use super::profiles::{ClientProfile, default_catalog};
use crate::protocol::types::{
    ClientCapabilities, Implementation, LoggingCapability, PromptsCapability,
    ResourcesCapability, SamplingCapability, ServerCapabilities, ToolsCapability,
};

/// Matches connecting clients against an ordered profile catalog
#[derive(Debug, Clone)]
pub struct CompatibilityDetector {
    profiles: Arc<RwLock<Vec<Arc<ClientProfile>>>>,
}

impl Default for CompatibilityDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl CompatibilityDetector {
    /// Detector over the built-in catalog
    pub fn new() -> Self {
        Self::with_profiles(default_catalog())
    }

    /// Detector over a custom catalog. A generic catch-all is appended when the
    /// catalog doesn't end with one.
    pub fn with_profiles(mut profiles: Vec<Arc<ClientProfile>>) -> Self {
        if !profiles.last().is_some_and(|profile| profile.catch_all) {
            profiles.retain(|profile| !profile.catch_all);
            if let Some(generic) = default_catalog().into_iter().find(|p| p.catch_all) {
                profiles.push(generic);
            }
        }
        Self {
            profiles: Arc::new(RwLock::new(profiles)),
        }
    }

    /// Add a profile ahead of the catch-all
    pub fn add_profile(&self, profile: ClientProfile) {
        let mut profiles = self.profiles.write();
        let index = profiles
            .iter()
            .position(|existing| existing.catch_all)
            .unwrap_or(profiles.len());
        profiles.insert(index, Arc::new(profile));
    }

    pub fn profiles(&self) -> Vec<Arc<ClientProfile>> {
        self.profiles.read().clone()
    }

    pub fn find_profile(&self, name: &str) -> Option<Arc<ClientProfile>> {
        self.profiles
            .read()
            .iter()
            .find(|profile| profile.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Pick the profile for a client.
    ///
    /// Named profiles are tried in catalog order. With no match, a client that
    /// declares sampling gets the first profile supporting it; anything else gets
    /// the catch-all.
    pub fn detect_client(
        &self,
        client_info: &Implementation,
        capabilities: &ClientCapabilities,
    ) -> Arc<ClientProfile> {
        let identity = format!("{} {}", client_info.name, client_info.version);
        let profiles = self.profiles.read();

        if let Some(profile) = profiles
            .iter()
            .filter(|profile| !profile.catch_all)
            .find(|profile| profile.matches(&identity))
        {
            debug!(client = %identity, profile = %profile.name, "Client matched by name");
            return profile.clone();
        }

        if capabilities.sampling.is_some() {
            if let Some(profile) = profiles
                .iter()
                .filter(|profile| !profile.catch_all)
                .find(|profile| profile.supports_feature(SAMPLING))
            {
                debug!(client = %identity, profile = %profile.name, "Client matched by capabilities");
                return profile.clone();
            }
        }

        let generic = profiles
            .iter()
            .rev()
            .find(|profile| profile.catch_all)
            .cloned();
        match generic {
            Some(profile) => profile,
            // with_profiles always installs a catch-all
            None => Arc::new(ClientProfile::new(super::GENERIC_PROFILE, ".*").catch_all()),
        }
    }

    /// `(true, "")` when the profile supports `feature`, otherwise `(false, hint)`
    /// where the hint is the recorded workaround or a generic message.
    pub fn check_feature_support(profile: &ClientProfile, feature: &str) -> (bool, String) {
        if profile.supports_feature(feature) {
            return (true, String::new());
        }
        let hint = profile
            .workarounds
            .get(feature)
            .cloned()
            .unwrap_or_else(|| format!("{feature} not supported by {}", profile.name));
        (false, hint)
    }

    /// Capabilities to advertise to a client with this profile.
    /// List-change notifications are only advertised with subscription support.
    pub fn get_supported_capabilities(profile: &ClientProfile) -> ServerCapabilities {
        let list_changed = profile.supports_feature(SUBSCRIPTIONS).then_some(true);
        let mut capabilities = ServerCapabilities::default();
        let mut experimental: HashMap<String, Value> = HashMap::new();

        for feature in &profile.supported_features {
            match *feature {
                TOOLS => capabilities.tools = Some(ToolsCapability { list_changed }),
                RESOURCES => {
                    capabilities.resources = Some(ResourcesCapability {
                        subscribe: list_changed,
                        list_changed,
                    })
                }
                PROMPTS => capabilities.prompts = Some(PromptsCapability { list_changed }),
                SAMPLING => capabilities.sampling = Some(SamplingCapability::default()),
                LOGGING => capabilities.logging = Some(LoggingCapability::default()),
                ROOTS => {
                    experimental.insert(ROOTS.to_string(), json!({ "listChanged": list_changed.is_some() }));
                }
                DISCOVERY | PROGRESS => {
                    experimental.insert(feature.to_string(), json!({}));
                }
                _ => {}
            }
        }

        if !experimental.is_empty() {
            capabilities.experimental = Some(experimental);
        }
        capabilities
    }

    /// Narrow a server's own capabilities to what the profile can use
    pub fn negotiate(profile: &ClientProfile, server: &ServerCapabilities) -> ServerCapabilities {
        let supported = Self::get_supported_capabilities(profile);
        let experimental = match (&supported.experimental, &server.experimental) {
            (Some(client), Some(server)) => {
                let shared: HashMap<String, Value> = server
                    .iter()
                    .filter(|(name, _)| client.contains_key(*name))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                (!shared.is_empty()).then_some(shared)
            }
            _ => None,
        };

        ServerCapabilities {
            tools: server.tools.as_ref().and(supported.tools),
            resources: server.resources.as_ref().and(supported.resources),
            prompts: server.prompts.as_ref().and(supported.prompts),
            sampling: server.sampling.as_ref().and(supported.sampling),
            logging: server.logging.as_ref().and(supported.logging),
            experimental,
        }
    }
}
