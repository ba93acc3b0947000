// ! MCP server implementation
// !
// ! The dispatch engine: owns the tool, resource and prompt registries, routes
// ! validated requests to their handlers and turns every outcome into exactly one
// ! reply per id-bearing request. Handlers run in their own task so a panic or an
// ! overrun deadline never takes the server down.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use crate::compat::{ClientProfile, CompatibilityDetector, FallbackHandler};
use crate::compat::fallback::{GET_PROMPT_TOOL, READ_RESOURCE_TOOL};
use crate::core::context::RequestContext;
use crate::core::error::{McpError, McpResult};
use crate::core::logging::{ErrorContext, ErrorLogger};
use crate::core::metrics::{DispatchStats, StatsSnapshot};
use crate::core::prompt::{Prompt, PromptHandler};
use crate::core::resource::{Resource, ResourceHandler, base_uri};
use crate::core::tool::{FnTool, Tool, ToolHandler};
use crate::notifications::Notifier;
use crate::protocol::messages::*;
use crate::protocol::methods::{self, Method};
use crate::protocol::types::*;
use crate::protocol::validation::{parse_optional_params, parse_params, parse_request};
use crate::server::bridge;
use crate::server::hooks::{DispatchHook, DispatchOutcome};
use crate::server::rate_limit::{RateLimitConfig, RateLimiter};
use crate::server::registry::Registry;
use crate::transport::traits::{MessageFuture, MessageHandler, ServerTransport};

/// Configuration for the MCP server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Request timeout in milliseconds; 0 disables the deadline
    pub request_timeout_ms: u64,
    /// Maximum number of handlers running at once
    pub max_concurrent_requests: usize,
    /// Let registration replace an existing entry instead of failing
    pub allow_overwrite: bool,
    /// Check `tools/call` arguments against the tool's required list
    pub validate_arguments: bool,
    /// Token-bucket limits; `None` disables rate limiting
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            max_concurrent_requests: 100,
            allow_overwrite: false,
            validate_arguments: true,
            rate_limit: None,
        }
    }
}

/// Handler for a method outside the built-in routing table
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn handle(&self, ctx: RequestContext, params: Option<Value>) -> McpResult<Value>;
}

#[async_trait]
impl<F, Fut> MethodHandler for F
where
    F: Fn(RequestContext, Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = McpResult<Value>> + Send + 'static,
{
    async fn handle(&self, ctx: RequestContext, params: Option<Value>) -> McpResult<Value> {
        (self)(ctx, params).await
    }
}

/// What the server remembers about an initialized client
#[derive(Debug, Clone)]
struct ClientState {
    info: Implementation,
    fallback: Arc<FallbackHandler>,
    /// Set by `notifications/initialized`
    initialized: bool,
}

/// Which listing a registration changed
#[derive(Debug, Clone, Copy)]
enum ListKind {
    Tools,
    Resources,
    Prompts,
}

type InFlightKey = (String, String);

/// Removes a request's cancellation entry however its dispatch ends
struct InFlightGuard {
    in_flight: Arc<Mutex<HashMap<InFlightKey, CancellationToken>>>,
    key: Option<InFlightKey>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.in_flight.lock().remove(&key);
        }
    }
}

/// Main MCP server implementation.
///
/// Cloning is cheap and every clone serves the same registries, so one server
/// can back any number of connections.
#[derive(Clone)]
pub struct McpServer {
    info: ServerInfo,
    capabilities: ServerCapabilities,
    config: ServerConfig,
    tools: Registry<Tool>,
    /// Keyed by URI without query string
    resources: Registry<Resource>,
    prompts: Registry<Prompt>,
    methods: Registry<Arc<dyn MethodHandler>>,
    detector: CompatibilityDetector,
    clients: Arc<RwLock<HashMap<String, ClientState>>>,
    in_flight: Arc<Mutex<HashMap<InFlightKey, CancellationToken>>>,
    notifier: Option<Notifier>,
    hooks: Arc<RwLock<Vec<Arc<dyn DispatchHook>>>>,
    rate_limiter: Option<Arc<RateLimiter>>,
    permits: Arc<Semaphore>,
    stats: Arc<DispatchStats>,
}

impl McpServer {
    /// Create a new MCP server with the given name and version
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::with_config(name, version, ServerConfig::default())
    }

    /// Create a new MCP server with custom configuration
    pub fn with_config(
        name: impl Into<String>,
        version: impl Into<String>,
        config: ServerConfig,
    ) -> Self {
        let permits = config.max_concurrent_requests.max(1);
        Self {
            info: ServerInfo::new(name.into(), version.into()),
            capabilities: ServerCapabilities {
                prompts: Some(PromptsCapability {
                    list_changed: Some(true),
                }),
                resources: Some(ResourcesCapability {
                    subscribe: Some(true),
                    list_changed: Some(true),
                }),
                tools: Some(ToolsCapability {
                    list_changed: Some(true),
                }),
                sampling: None,
                logging: Some(LoggingCapability::default()),
                experimental: None,
            },
            tools: Registry::new("tool"),
            resources: Registry::new("resource"),
            prompts: Registry::new("prompt"),
            methods: Registry::new("method"),
            detector: CompatibilityDetector::new(),
            clients: Arc::new(RwLock::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            notifier: None,
            hooks: Arc::new(RwLock::new(Vec::new())),
            rate_limiter: config
                .rate_limit
                .clone()
                .map(|limits| Arc::new(RateLimiter::new(limits))),
            permits: Arc::new(Semaphore::new(permits)),
            stats: Arc::new(DispatchStats::new()),
            config,
        }
    }

    /// Attach a notifier. Initialized clients are registered with it and
    /// registry changes are announced through it.
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Use a custom profile catalog for client detection
    pub fn with_detector(mut self, detector: CompatibilityDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Set server capabilities
    pub fn set_capabilities(&mut self, capabilities: ServerCapabilities) {
        self.capabilities = capabilities;
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn notifier(&self) -> Option<&Notifier> {
        self.notifier.as_ref()
    }

    pub fn detector(&self) -> &CompatibilityDetector {
        &self.detector
    }

    /// Install a dispatch hook. Hooks run in installation order.
    pub fn add_hook<H: DispatchHook + 'static>(&self, hook: H) {
        self.hooks.write().push(Arc::new(hook));
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether a client has completed the `initialize` handshake
    pub fn is_initialized(&self, client_id: &str) -> bool {
        self.clients
            .read()
            .get(client_id)
            .is_some_and(|state| state.initialized)
    }

    /// Profile detected for a client during `initialize`
    pub fn client_profile(&self, client_id: &str) -> Option<Arc<ClientProfile>> {
        self.clients
            .read()
            .get(client_id)
            .map(|state| state.fallback.profile().clone())
    }

    /// Identity a client reported during `initialize`
    pub fn client_info(&self, client_id: &str) -> Option<Implementation> {
        self.clients.read().get(client_id).map(|state| state.info.clone())
    }

    // ========================================================================
    // Tool Management
    // ========================================================================

    /// Add a tool to the server
    pub async fn add_tool<H>(
        &self,
        name: impl Into<String>,
        description: Option<String>,
        schema: Value,
        handler: H,
    ) -> McpResult<()>
    where
        H: ToolHandler + 'static,
    {
        self.add_tool_detailed(ToolInfo::new(name.into(), description, schema), handler)
            .await
    }

    /// Add a tool from a complete descriptor
    pub async fn add_tool_detailed<H>(&self, info: ToolInfo, handler: H) -> McpResult<()>
    where
        H: ToolHandler + 'static,
    {
        self.insert_tool(Tool::from_info(info, handler), self.config.allow_overwrite)
            .await
    }

    /// Add a tool backed by a plain closure and an empty object schema
    pub async fn add_simple_tool<F>(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> McpResult<()>
    where
        F: Fn(HashMap<String, Value>) -> McpResult<ToolResult> + Send + Sync + 'static,
    {
        self.add_tool(
            name,
            Some(description.into()),
            json!({"type": "object", "properties": {}}),
            FnTool(handler),
        )
        .await
    }

    /// Register a tool, replacing any tool of the same name
    pub async fn replace_tool<H>(&self, info: ToolInfo, handler: H) -> McpResult<()>
    where
        H: ToolHandler + 'static,
    {
        self.insert_tool(Tool::from_info(info, handler), true).await
    }

    async fn insert_tool(&self, tool: Tool, allow_overwrite: bool) -> McpResult<()> {
        let name = tool.info.name.clone();
        let registration = self.tools.insert(name.clone(), tool, allow_overwrite).await?;
        debug!(tool = %name, ?registration, "Tool registered");
        self.announce(ListKind::Tools).await;
        Ok(())
    }

    /// Remove a tool from the server
    pub async fn remove_tool(&self, name: &str) -> McpResult<bool> {
        let removed = self.tools.remove(name).await;
        if removed {
            self.announce(ListKind::Tools).await;
        }
        Ok(removed)
    }

    /// Descriptors of all enabled tools, ordered by name
    pub async fn list_tools(&self) -> McpResult<Vec<ToolInfo>> {
        Ok(self
            .tools
            .values()
            .await
            .into_iter()
            .filter(|tool| tool.enabled)
            .map(|tool| tool.info)
            .collect())
    }

    pub async fn has_tool(&self, name: &str) -> bool {
        self.tools.contains(name).await
    }

    pub async fn tool_count(&self) -> usize {
        self.tools.len().await
    }

    // ========================================================================
    // Resource Management
    // ========================================================================

    /// Add a resource to the server
    pub async fn add_resource<H>(
        &self,
        name: impl Into<String>,
        uri: impl Into<String>,
        handler: H,
    ) -> McpResult<()>
    where
        H: ResourceHandler + 'static,
    {
        let info = ResourceInfo::new(uri.into(), name.into());
        self.add_resource_detailed(info, handler).await
    }

    /// Add a resource with detailed information
    pub async fn add_resource_detailed<H>(&self, info: ResourceInfo, handler: H) -> McpResult<()>
    where
        H: ResourceHandler + 'static,
    {
        let key = base_uri(&info.uri).to_string();
        self.resources
            .insert(key, Resource::new(info, handler), self.config.allow_overwrite)
            .await?;
        self.announce(ListKind::Resources).await;
        Ok(())
    }

    /// Remove a resource from the server
    pub async fn remove_resource(&self, uri: &str) -> McpResult<bool> {
        let removed = self.resources.remove(base_uri(uri)).await;
        if removed {
            self.announce(ListKind::Resources).await;
        }
        Ok(removed)
    }

    pub async fn list_resources(&self) -> McpResult<Vec<ResourceInfo>> {
        Ok(self
            .resources
            .values()
            .await
            .into_iter()
            .filter(|resource| resource.enabled)
            .map(|resource| resource.info)
            .collect())
    }

    pub async fn has_resource(&self, uri: &str) -> bool {
        self.resources.contains(base_uri(uri)).await
    }

    // ========================================================================
    // Prompt Management
    // ========================================================================

    /// Add a prompt to the server
    pub async fn add_prompt<H>(&self, info: PromptInfo, handler: H) -> McpResult<()>
    where
        H: PromptHandler + 'static,
    {
        let name = info.name.clone();
        self.prompts
            .insert(name, Prompt::new(info, handler), self.config.allow_overwrite)
            .await?;
        self.announce(ListKind::Prompts).await;
        Ok(())
    }

    /// Remove a prompt from the server
    pub async fn remove_prompt(&self, name: &str) -> McpResult<bool> {
        let removed = self.prompts.remove(name).await;
        if removed {
            self.announce(ListKind::Prompts).await;
        }
        Ok(removed)
    }

    pub async fn list_prompts(&self) -> McpResult<Vec<PromptInfo>> {
        Ok(self
            .prompts
            .values()
            .await
            .into_iter()
            .filter(|prompt| prompt.enabled)
            .map(|prompt| prompt.info)
            .collect())
    }

    pub async fn has_prompt(&self, name: &str) -> bool {
        self.prompts.contains(name).await
    }

    // ========================================================================
    // Extension Methods
    // ========================================================================

    /// Serve a method outside the built-in table, e.g. `discovery/discover`.
    /// Built-in method names cannot be taken over.
    pub async fn register_method<H>(&self, name: impl Into<String>, handler: H) -> McpResult<()>
    where
        H: MethodHandler + 'static,
    {
        let name = name.into();
        if Method::parse(&name).is_some() {
            return Err(McpError::DuplicateRegistration(format!(
                "method '{name}' is built in"
            )));
        }
        self.methods
            .insert(name, Arc::new(handler), self.config.allow_overwrite)
            .await?;
        Ok(())
    }

    pub async fn unregister_method(&self, name: &str) -> bool {
        self.methods.remove(name).await
    }

    /// Tell connected clients a registry changed. Only once the notifier runs;
    /// registrations made during setup are covered by the initial list.
    async fn announce(&self, kind: ListKind) {
        let Some(notifier) = self.notifier.as_ref().filter(|n| n.is_running()) else {
            return;
        };
        let sent = match kind {
            ListKind::Tools => notifier.notify_tools_list_changed().await,
            ListKind::Resources => notifier.notify_resources_list_changed().await,
            ListKind::Prompts => notifier.notify_prompts_list_changed().await,
        };
        if let Err(e) = sent {
            warn!(?kind, "Failed to announce registry change: {}", e);
        }
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Raw-message entry point for transports
    pub fn message_handler(&self) -> MessageHandler {
        let server = self.clone();
        Arc::new(move |ctx: RequestContext, raw: Vec<u8>| -> MessageFuture {
            let server = server.clone();
            Box::pin(async move { server.handle_message(ctx, &raw).await })
        })
    }

    /// Serve one connection until the peer hangs up
    pub async fn serve<T>(&self, transport: T) -> McpResult<()>
    where
        T: ServerTransport + 'static,
    {
        self.serve_until(transport, std::future::pending()).await
    }

    /// Start server with custom transport and run until the peer hangs up or
    /// Ctrl+C is pressed
    pub async fn run_with_transport<T>(&self, transport: T) -> McpResult<()>
    where
        T: ServerTransport + 'static,
    {
        self.serve_until(transport, async {
            tokio::signal::ctrl_c()
                .await
                .map_err(|e| McpError::internal(format!("Signal handling error: {e}")))
        })
        .await
    }

    /// Serve one connection over stdin/stdout
    ///
    /// # Example
    /// ```rust,no_run
    /// use mcp_runtime::prelude::*;
    ///
    /// #[tokio::main]
    /// async fn main() -> McpResult<()> {
    ///     let server = McpServer::new("my-server", "1.0.0");
    ///     // ... add tools, resources, prompts ...
    ///     server.run_with_stdio().await
    /// }
    /// ```
    #[cfg(feature = "stdio")]
    pub async fn run_with_stdio(&self) -> McpResult<()> {
        use crate::transport::stdio::StdioServerTransport;

        self.run_with_transport(StdioServerTransport::stdio()).await
    }

    async fn serve_until<T, S>(&self, mut transport: T, shutdown: S) -> McpResult<()>
    where
        T: ServerTransport + 'static,
        S: Future<Output = McpResult<()>>,
    {
        let client_id = transport.client_id().to_string();
        let handler_key = format!("{}:{}", transport.kind(), client_id);
        if let Some(notifier) = &self.notifier {
            notifier.start().await?;
            // Registered before reading starts so no notification races the handshake
            if let Some(delivery) = transport.delivery_handler() {
                notifier.register_handler(handler_key.clone(), delivery);
            }
        }

        transport.set_handler(self.message_handler());
        if let Err(e) = transport.start().await {
            self.disconnect(&client_id, &handler_key);
            return Err(e);
        }
        info!(client_id = %client_id, "{}", transport.server_info());

        let signal = tokio::select! {
            _ = transport.closed() => {
                info!(client_id = %client_id, "Connection closed by peer");
                Ok(())
            }
            signal = shutdown => {
                info!(client_id = %client_id, "Shutdown signal received, stopping server...");
                signal
            }
        };

        let closed = transport.close().await;
        self.disconnect(&client_id, &handler_key);
        closed.and(signal)
    }

    /// Forget everything tied to a finished connection
    fn disconnect(&self, client_id: &str, handler_key: &str) {
        self.clients.write().remove(client_id);
        self.in_flight.lock().retain(|(owner, _), token| {
            if owner == client_id {
                token.cancel();
                false
            } else {
                true
            }
        });
        if let Some(notifier) = &self.notifier {
            notifier.unregister_client(client_id);
            notifier.unregister_handler(handler_key);
        }
    }

    // ========================================================================
    // Request Handling
    // ========================================================================

    /// Parse and handle one raw JSON document. Documents that are not a valid
    /// request are answered with the matching protocol error.
    pub async fn handle_message(&self, ctx: RequestContext, raw: &[u8]) -> Option<JsonRpcReply> {
        match parse_request(raw) {
            Ok(request) => self.handle_request(ctx, request).await,
            Err(rejection) => {
                debug!(client_id = ctx.client_id(), "Rejected message: {}", rejection.error);
                self.stats.record_error(&rejection.error);
                Some(rejection.into_reply())
            }
        }
    }

    /// Handle a validated request. Returns `None` for notifications.
    pub async fn handle_request(
        &self,
        ctx: RequestContext,
        request: JsonRpcRequest,
    ) -> Option<JsonRpcReply> {
        let started = Instant::now();
        let is_notification = request.is_notification();
        let served = Method::parse(&request.method).is_some()
            || self.methods.contains(&request.method).await;
        self.stats
            .record_request(served.then_some(request.method.as_str()), is_notification);

        let id = request.id.clone();
        let method = request.method.clone();
        let timeout =
            (self.config.request_timeout_ms > 0).then(|| Duration::from_millis(self.config.request_timeout_ms));
        let ctx = ctx.for_request(id.clone(), &method, timeout);
        let _guard = self.track(&ctx);

        let span = ErrorLogger::request_span(&ctx);
        let result = self.dispatch(&ctx, request).instrument(span).await;

        let outcome = DispatchOutcome {
            elapsed: started.elapsed(),
            error_code: result.as_ref().err().map(McpError::code),
        };
        for hook in self.hooks() {
            hook.after_dispatch(&ctx, &method, &outcome).await;
        }

        if let Err(err) = &result {
            self.stats.record_error(err);
            ErrorLogger::log_error(err, &ErrorContext::for_request("dispatch", &ctx));
        }

        let id = id?;
        Some(match result {
            Ok(value) => JsonRpcReply::Success(JsonRpcResponse::success(id, value)),
            Err(err) => JsonRpcReply::Error(JsonRpcError::new(id, err.to_error_object())),
        })
    }

    fn track(&self, ctx: &RequestContext) -> InFlightGuard {
        let key = ctx
            .request_id()
            .map(|id| (ctx.client_id().to_string(), id.to_string()));
        if let Some(key) = &key {
            self.in_flight.lock().insert(key.clone(), ctx.token().clone());
        }
        InFlightGuard {
            in_flight: self.in_flight.clone(),
            key,
        }
    }

    fn hooks(&self) -> Vec<Arc<dyn DispatchHook>> {
        self.hooks.read().clone()
    }

    fn fallback_for(&self, client_id: &str) -> Option<Arc<FallbackHandler>> {
        self.clients
            .read()
            .get(client_id)
            .map(|state| state.fallback.clone())
    }

    async fn dispatch(&self, ctx: &RequestContext, request: JsonRpcRequest) -> McpResult<Value> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.check(ctx.client_id())?;
        }
        for hook in self.hooks() {
            hook.before_dispatch(ctx, &request).await?;
        }

        let fallback = self.fallback_for(ctx.client_id());
        let request = match &fallback {
            Some(fallback) => {
                fallback.check_method(&request.method)?;
                match fallback.rewrite_request(&request) {
                    Some(rewritten) => {
                        debug!(from = %request.method, to = %rewritten.method, "Request rewritten for client");
                        rewritten
                    }
                    None => request,
                }
            }
            None => request,
        };

        let result = self.route(ctx, request).await?;
        Ok(match fallback {
            Some(fallback) => fallback.adapt_result(result),
            None => result,
        })
    }

    async fn route(&self, ctx: &RequestContext, request: JsonRpcRequest) -> McpResult<Value> {
        let Some(method) = Method::parse(&request.method) else {
            return self.handle_extension(ctx, request).await;
        };

        match method {
            Method::Initialize => self.handle_initialize(ctx, request.params).await,
            Method::Initialized => {
                match self.clients.write().get_mut(ctx.client_id()) {
                    Some(state) => state.initialized = true,
                    None => debug!(client_id = ctx.client_id(), "Initialized before initialize"),
                }
                Ok(Value::Null)
            }
            Method::Ping => Ok(json!({})),
            Method::ToolsList => self.handle_tools_list(ctx, request.params).await,
            Method::ToolsCall => self.handle_tools_call(ctx, request.params).await,
            Method::ResourcesList => {
                let _: ListParams = parse_optional_params(request.params)?;
                to_result(ListResourcesResult {
                    resources: self.list_resources().await?,
                    next_cursor: None,
                })
            }
            Method::ResourcesRead => {
                let params: ReadResourceParams = parse_params(request.params)?;
                let contents = self.read_resource(ctx, &params.uri).await?;
                to_result(ReadResourceResult { contents })
            }
            Method::ResourcesSubscribe => self.handle_subscribe(ctx, request.params, true).await,
            Method::ResourcesUnsubscribe => self.handle_subscribe(ctx, request.params, false).await,
            Method::PromptsList => {
                let _: ListParams = parse_optional_params(request.params)?;
                to_result(ListPromptsResult {
                    prompts: self.list_prompts().await?,
                    next_cursor: None,
                })
            }
            Method::PromptsGet => {
                let params: GetPromptParams = parse_params(request.params)?;
                let result = self
                    .get_prompt(ctx, &params.name, params.arguments.unwrap_or_default())
                    .await?;
                to_result(result)
            }
            Method::Cancelled => {
                let params: CancelledParams = parse_params(request.params)?;
                self.cancel_request(ctx.client_id(), &params);
                Ok(Value::Null)
            }
        }
    }

    async fn handle_initialize(&self, ctx: &RequestContext, params: Option<Value>) -> McpResult<Value> {
        let params: InitializeParams = parse_params(params)?;
        let profile = self
            .detector
            .detect_client(&params.client_info, &params.capabilities);
        let fallback = FallbackHandler::new(profile.clone());
        let capabilities = CompatibilityDetector::negotiate(&profile, &self.capabilities);
        let instructions = fallback.instructions();

        info!(
            client_id = ctx.client_id(),
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            profile = %profile.name,
            "Client initialized"
        );

        if let Some(notifier) = &self.notifier {
            notifier.register_client(
                ctx.client_id(),
                params.capabilities.has_experimental("progress"),
                params.capabilities.has_experimental("logging"),
            );
        }
        self.clients.write().insert(
            ctx.client_id().to_string(),
            ClientState {
                info: params.client_info,
                fallback: Arc::new(fallback),
                initialized: false,
            },
        );

        to_result(InitializeResult {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities,
            server_info: self.info.clone(),
            instructions,
        })
    }

    async fn handle_tools_list(&self, ctx: &RequestContext, params: Option<Value>) -> McpResult<Value> {
        let _: ListParams = parse_optional_params(params)?;
        let mut tools = self.list_tools().await?;

        if let Some(fallback) = self.fallback_for(ctx.client_id()) {
            if fallback.needs_resource_bridge() && !self.has_tool(READ_RESOURCE_TOOL).await {
                tools.push(bridge::read_resource_tool());
            }
            if fallback.needs_prompt_bridge() && !self.has_tool(GET_PROMPT_TOOL).await {
                tools.push(bridge::get_prompt_tool());
            }
        }

        to_result(ListToolsResult {
            tools,
            next_cursor: None,
        })
    }

    async fn handle_tools_call(&self, ctx: &RequestContext, params: Option<Value>) -> McpResult<Value> {
        let params: CallToolParams = parse_params(params)?;
        let arguments = params.arguments.unwrap_or_default();
        let result = self.call_tool(ctx, &params.name, arguments).await?;
        to_result(result)
    }

    /// Call a tool by name. The bridge tools answer when no registered tool
    /// of that name exists.
    pub async fn call_tool(
        &self,
        ctx: &RequestContext,
        name: &str,
        arguments: HashMap<String, Value>,
    ) -> McpResult<ToolResult> {
        let Some(tool) = self.tools.get(name).await else {
            return match name {
                READ_RESOURCE_TOOL => {
                    let uri = string_argument(&arguments, "uri")?;
                    let contents = self.read_resource(ctx, &uri).await?;
                    Ok(bridge::resource_result(contents))
                }
                GET_PROMPT_TOOL => {
                    let prompt = string_argument(&arguments, "name")?;
                    let prompt_args = match arguments.get("arguments") {
                        Some(Value::Object(args)) => args.clone().into_iter().collect(),
                        _ => HashMap::new(),
                    };
                    let result = self.get_prompt(ctx, &prompt, prompt_args).await?;
                    Ok(bridge::prompt_result(result))
                }
                _ => Err(McpError::ToolNotFound(format!("Tool '{name}' not found"))),
            };
        };

        if !tool.enabled {
            return Err(McpError::ToolNotFound(format!("Tool '{name}' is disabled")));
        }
        if self.config.validate_arguments {
            tool.validate_arguments(&arguments)?;
        }

        let handler = tool.handler.clone();
        self.run_handler(ctx, methods::TOOLS_CALL, name, move |ctx| async move {
            handler.call(ctx, arguments).await
        })
        .await
    }

    /// Read a resource by URI; query parameters reach the handler
    pub async fn read_resource(
        &self,
        ctx: &RequestContext,
        uri: &str,
    ) -> McpResult<Vec<ResourceContents>> {
        let resource = self
            .resources
            .get(base_uri(uri))
            .await
            .ok_or_else(|| McpError::ResourceNotFound(format!("Resource '{uri}' not found")))?;

        let owned_uri = uri.to_string();
        self.run_handler(ctx, methods::RESOURCES_READ, uri, move |ctx| async move {
            resource.read(ctx, &owned_uri).await
        })
        .await
    }

    /// Render a prompt by name
    pub async fn get_prompt(
        &self,
        ctx: &RequestContext,
        name: &str,
        arguments: HashMap<String, Value>,
    ) -> McpResult<PromptResult> {
        let prompt = self
            .prompts
            .get(name)
            .await
            .ok_or_else(|| McpError::PromptNotFound(format!("Prompt '{name}' not found")))?;

        self.run_handler(ctx, methods::PROMPTS_GET, name, move |ctx| async move {
            prompt.get(ctx, arguments).await
        })
        .await
    }

    async fn handle_subscribe(
        &self,
        ctx: &RequestContext,
        params: Option<Value>,
        subscribe: bool,
    ) -> McpResult<Value> {
        let params: SubscribeResourceParams = parse_params(params)?;
        if !self.has_resource(&params.uri).await {
            return Err(McpError::ResourceNotFound(format!(
                "Resource '{}' not found",
                params.uri
            )));
        }
        if let Some(notifier) = &self.notifier {
            if subscribe {
                notifier.subscribe(ctx.client_id(), &params.uri);
            } else {
                notifier.unsubscribe(ctx.client_id(), &params.uri);
            }
        }
        Ok(json!({}))
    }

    async fn handle_extension(&self, ctx: &RequestContext, request: JsonRpcRequest) -> McpResult<Value> {
        let name = request.method;
        let handler = self
            .methods
            .get(&name)
            .await
            .ok_or_else(|| McpError::MethodNotFound(format!("Method '{name}' not found")))?;

        let params = request.params;
        self.run_handler(ctx, &name, &name, move |ctx| async move {
            handler.handle(ctx, params).await
        })
        .await
    }

    fn cancel_request(&self, client_id: &str, params: &CancelledParams) {
        let key = (client_id.to_string(), params.request_id.to_string());
        match self.in_flight.lock().get(&key) {
            Some(token) => {
                debug!(
                    client_id,
                    request_id = %params.request_id,
                    reason = params.reason.as_deref().unwrap_or(""),
                    "Request cancelled by client"
                );
                token.cancel();
            }
            None => debug!(client_id, request_id = %params.request_id, "Cancel for unknown request"),
        }
    }

    // ========================================================================
    // Handler Execution
    // ========================================================================

    /// Run a capability handler between the handler hooks
    async fn run_handler<T, F, Fut>(
        &self,
        ctx: &RequestContext,
        method: &str,
        name: &str,
        call: F,
    ) -> McpResult<T>
    where
        T: Send + 'static,
        F: FnOnce(RequestContext) -> Fut,
        Fut: Future<Output = McpResult<T>> + Send + 'static,
    {
        let hooks = self.hooks();
        for hook in &hooks {
            hook.before_handler(ctx, method, name).await;
        }

        let started = Instant::now();
        let result = self.execute(ctx, call(ctx.clone())).await;

        for hook in &hooks {
            hook.after_handler(ctx, method, name, started.elapsed(), result.is_ok())
                .await;
        }
        result
    }

    /// Run `work` in its own task, bounded by the request's deadline and
    /// cancellation. A panic becomes an internal error. On timeout the token
    /// is cancelled and the task is left to notice it.
    async fn execute<T, Fut>(&self, ctx: &RequestContext, work: Fut) -> McpResult<T>
    where
        T: Send + 'static,
        Fut: Future<Output = McpResult<T>> + Send + 'static,
    {
        let remaining = ctx.remaining();
        let deadline = async move {
            match remaining {
                Some(remaining) => tokio::time::sleep(remaining).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        // Waiting for a permit counts against the request's deadline
        let permit = tokio::select! {
            permit = self.permits.clone().acquire_owned() => {
                permit.map_err(|_| McpError::internal("server is shutting down"))?
            }
            _ = ctx.cancelled() => return Err(McpError::cancelled("request cancelled")),
            _ = &mut deadline => {
                ctx.cancel();
                return Err(McpError::timeout("request timed out"));
            }
        };

        let mut task = tokio::spawn(async move {
            let _permit = permit;
            work.await
        });

        tokio::select! {
            joined = &mut task => match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => {
                    warn!(
                        client_id = ctx.client_id(),
                        method = ctx.method().unwrap_or_default(),
                        "Handler panicked; request answered with an internal error"
                    );
                    self.stats.record_panic();
                    Err(McpError::internal("Internal server error"))
                }
                Err(_) => Err(McpError::cancelled("handler task was aborted")),
            },
            _ = ctx.cancelled() => Err(McpError::cancelled("request cancelled")),
            _ = &mut deadline => {
                ctx.cancel();
                Err(McpError::timeout("request timed out"))
            }
        }
    }
}

fn to_result<T: Serialize>(value: T) -> McpResult<Value> {
    serde_json::to_value(value).map_err(|e| McpError::Serialization(e.to_string()))
}

fn string_argument(arguments: &HashMap<String, Value>, key: &str) -> McpResult<String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| McpError::invalid_params(format!("missing string argument '{key}'")))
}
