//! Resource system for MCP servers
//!
//! Resources are addressable pieces of content clients read through
//! `resources/read`. They are registered under their URI.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::context::RequestContext;
use crate::core::error::{McpError, McpResult};
use crate::protocol::types::{ResourceContents, ResourceInfo};

/// Trait for implementing resource handlers
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Read the content of a resource
    ///
    /// # Arguments
    /// * `ctx` - Request context; cancelled when the request is abandoned
    /// * `uri` - URI of the resource to read
    /// * `params` - Query parameters parsed from the URI
    async fn read(
        &self,
        ctx: RequestContext,
        uri: &str,
        params: &HashMap<String, String>,
    ) -> McpResult<Vec<ResourceContents>>;
}

/// A registered resource with its handler
#[derive(Clone)]
pub struct Resource {
    /// Descriptor advertised by `resources/list`
    pub info: ResourceInfo,
    pub handler: Arc<dyn ResourceHandler>,
    pub enabled: bool,
}

impl Resource {
    pub fn new<H>(info: ResourceInfo, handler: H) -> Self
    where
        H: ResourceHandler + 'static,
    {
        Self {
            info,
            handler: Arc::new(handler),
            enabled: true,
        }
    }

    pub fn uri(&self) -> &str {
        &self.info.uri
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Read the resource, passing any `?key=value` query parameters along
    pub async fn read(&self, ctx: RequestContext, uri: &str) -> McpResult<Vec<ResourceContents>> {
        if !self.enabled {
            return Err(McpError::ResourceNotFound(format!(
                "Resource '{uri}' is disabled"
            )));
        }

        let params = query_params(uri);
        self.handler.read(ctx, uri, &params).await
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("info", &self.info)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Split `scheme://path?a=1&b=2` into its query parameters
pub fn query_params(uri: &str) -> HashMap<String, String> {
    let Some((_, query)) = uri.split_once('?') else {
        return HashMap::new();
    };

    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

/// URI without its query string; used as the registry key
pub fn base_uri(uri: &str) -> &str {
    uri.split_once('?').map(|(base, _)| base).unwrap_or(uri)
}

// Common resource implementations

/// Simple text resource
pub struct TextResource {
    content: String,
    mime_type: String,
}

impl TextResource {
    pub fn new(content: impl Into<String>, mime_type: Option<String>) -> Self {
        Self {
            content: content.into(),
            mime_type: mime_type.unwrap_or_else(|| "text/plain".to_string()),
        }
    }
}

#[async_trait]
impl ResourceHandler for TextResource {
    async fn read(
        &self,
        _ctx: RequestContext,
        uri: &str,
        _params: &HashMap<String, String>,
    ) -> McpResult<Vec<ResourceContents>> {
        Ok(vec![ResourceContents::Text {
            uri: uri.to_string(),
            mime_type: Some(self.mime_type.clone()),
            text: self.content.clone(),
        }])
    }
}
