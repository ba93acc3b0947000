// ! Asynchronous notification delivery
// !
// ! Notifications are queued on a bounded channel and drained by one background
// ! consumer that hands each message to the registered delivery handlers.
// ! Delivery is best-effort and at-most-once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::error::{McpError, McpResult};
use crate::protocol::messages::{LoggingMessageParams, ProgressParams, ResourceUpdatedParams};
use crate::protocol::methods::{
    LOGGING_MESSAGE, PROGRESS, PROMPTS_LIST_CHANGED, RESOURCES_LIST_CHANGED, RESOURCES_UPDATED,
    ROOTS_LIST_CHANGED, TOOLS_LIST_CHANGED,
};
use crate::protocol::types::{JsonRpcNotification, LoggingLevel, ProgressToken};

/// Pushes a notification to one client over some transport.
///
/// Handlers that don't serve `client_id` must return an error so the next handler
/// gets a chance.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn deliver(&self, client_id: &str, notification: &JsonRpcNotification) -> McpResult<()>;
}

/// Notifier configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Capacity of the pending notification queue
    pub queue_size: usize,
    /// How long an enqueue may wait for space before failing with backpressure
    pub enqueue_timeout_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            queue_size: 1024,
            enqueue_timeout_ms: 1_000,
        }
    }
}

/// Bookkeeping for one connected client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientSession {
    pub id: String,
    pub supports_progress: bool,
    pub supports_logging: bool,
    pub connected_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// A queued notification
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    pub client_id: String,
    pub notification: JsonRpcNotification,
    pub timestamp: DateTime<Utc>,
}

const CREATED: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

type HandlerMap = HashMap<String, Vec<Arc<dyn DeliveryHandler>>>;

struct NotifierInner {
    config: NotifierConfig,
    queue: mpsc::Sender<NotificationMessage>,
    receiver: Mutex<Option<mpsc::Receiver<NotificationMessage>>>,
    clients: RwLock<HashMap<String, ClientSession>>,
    handlers: RwLock<HandlerMap>,
    subscriptions: RwLock<HashMap<String, HashSet<String>>>,
    token: CancellationToken,
    consumer: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    state: AtomicU8,
}

/// Per-client, capability-filtered notification delivery
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<NotifierInner>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("config", &self.inner.config)
            .field("clients", &self.inner.clients.read().len())
            .field("state", &self.inner.state.load(Ordering::Acquire))
            .finish()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self::with_config(NotifierConfig::default())
    }

    pub fn with_config(config: NotifierConfig) -> Self {
        let (queue, receiver) = mpsc::channel(config.queue_size.max(1));
        Self {
            inner: Arc::new(NotifierInner {
                config,
                queue,
                receiver: Mutex::new(Some(receiver)),
                clients: RwLock::new(HashMap::new()),
                handlers: RwLock::new(HashMap::new()),
                subscriptions: RwLock::new(HashMap::new()),
                token: CancellationToken::new(),
                consumer: tokio::sync::Mutex::new(None),
                state: AtomicU8::new(CREATED),
            }),
        }
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Spawn the delivery consumer. Fails once the notifier has been stopped.
    pub async fn start(&self) -> McpResult<()> {
        match self.inner.state.compare_exchange(
            CREATED,
            RUNNING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(RUNNING) => return Ok(()),
            Err(_) => return Err(McpError::protocol("notifier cannot be restarted after stop")),
        }

        let receiver = self
            .inner
            .receiver
            .lock()
            .take()
            .ok_or_else(|| McpError::internal("notification queue already consumed"))?;

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { consume(inner, receiver).await });
        *self.inner.consumer.lock().await = Some(handle);

        debug!("Notifier started");
        Ok(())
    }

    /// Cancel the consumer, wait for the delivery in progress, then release the queue
    pub async fn stop(&self) -> McpResult<()> {
        let previous = self.inner.state.swap(STOPPED, Ordering::AcqRel);
        if previous == STOPPED {
            return Ok(());
        }

        self.inner.token.cancel();
        if let Some(handle) = self.inner.consumer.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Notification consumer ended abnormally: {}", e);
            }
        }
        // Never started: nothing owns the receiver yet, drop it here
        self.inner.receiver.lock().take();

        debug!("Notifier stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == RUNNING
    }

    // ------------------------------------------------------------------------
    // Clients and handlers
    // ------------------------------------------------------------------------

    pub fn register_client(
        &self,
        client_id: impl Into<String>,
        supports_progress: bool,
        supports_logging: bool,
    ) {
        let id = client_id.into();
        let now = Utc::now();
        debug!(client_id = %id, supports_progress, supports_logging, "Client registered");
        self.inner.clients.write().insert(
            id.clone(),
            ClientSession {
                id,
                supports_progress,
                supports_logging,
                connected_at: now,
                last_seen_at: now,
            },
        );
    }

    /// Forget a client and its subscriptions
    pub fn unregister_client(&self, client_id: &str) -> bool {
        let removed = self.inner.clients.write().remove(client_id).is_some();
        self.drop_subscriptions(client_id);
        removed
    }

    pub fn get_client_info(&self, client_id: &str) -> Option<ClientSession> {
        self.inner.clients.read().get(client_id).cloned()
    }

    pub fn connected_clients(&self) -> Vec<String> {
        self.inner.clients.read().keys().cloned().collect()
    }

    /// Add a delivery handler under a transport kind
    pub fn register_handler(&self, kind: impl Into<String>, handler: Arc<dyn DeliveryHandler>) {
        self.inner
            .handlers
            .write()
            .entry(kind.into())
            .or_default()
            .push(handler);
    }

    /// Remove every handler registered under `kind`
    pub fn unregister_handler(&self, kind: &str) -> bool {
        self.inner.handlers.write().remove(kind).is_some()
    }

    /// Drop sessions not seen within `max_inactive`. Connections stay open.
    pub fn cleanup_inactive_clients(&self, max_inactive: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(max_inactive)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let removed: Vec<String> = {
            let mut clients = self.inner.clients.write();
            let stale: Vec<String> = clients
                .values()
                .filter(|session| session.last_seen_at < cutoff)
                .map(|session| session.id.clone())
                .collect();
            for id in &stale {
                clients.remove(id);
            }
            stale
        };

        for id in &removed {
            self.drop_subscriptions(id);
        }
        if !removed.is_empty() {
            debug!(removed = removed.len(), "Removed inactive clients");
        }
        removed.len()
    }

    // ------------------------------------------------------------------------
    // Resource subscriptions
    // ------------------------------------------------------------------------

    pub fn subscribe(&self, client_id: &str, uri: &str) {
        self.inner
            .subscriptions
            .write()
            .entry(uri.to_string())
            .or_default()
            .insert(client_id.to_string());
    }

    pub fn unsubscribe(&self, client_id: &str, uri: &str) -> bool {
        let mut subscriptions = self.inner.subscriptions.write();
        let Some(clients) = subscriptions.get_mut(uri) else {
            return false;
        };
        let removed = clients.remove(client_id);
        if clients.is_empty() {
            subscriptions.remove(uri);
        }
        removed
    }

    pub fn subscribers(&self, uri: &str) -> Vec<String> {
        self.inner
            .subscriptions
            .read()
            .get(uri)
            .map(|clients| clients.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn drop_subscriptions(&self, client_id: &str) {
        let mut subscriptions = self.inner.subscriptions.write();
        subscriptions.retain(|_, clients| {
            clients.remove(client_id);
            !clients.is_empty()
        });
    }

    // ------------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------------

    /// Queue a notification for one client, waiting at most `enqueue_timeout_ms`
    /// for queue space
    pub async fn send_to_client(
        &self,
        client_id: &str,
        method: &str,
        params: Option<Value>,
    ) -> McpResult<()> {
        if !self.inner.clients.read().contains_key(client_id) {
            return Err(McpError::ClientNotFound(format!("client {client_id} not found")));
        }

        let message = NotificationMessage {
            client_id: client_id.to_string(),
            notification: JsonRpcNotification::new(method, params),
            timestamp: Utc::now(),
        };
        let wait = Duration::from_millis(self.inner.config.enqueue_timeout_ms);

        match self.inner.queue.send_timeout(message, wait).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => {
                Err(McpError::Backpressure("notification queue full".to_string()))
            }
            Err(SendTimeoutError::Closed(_)) => Err(McpError::transport("notifier stopped")),
        }
    }

    /// Queue a notification for every known client. Each client is attempted
    /// independently; the last failure is returned.
    pub async fn broadcast(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        let clients = self.connected_clients();
        self.send_to_each(&clients, method, params).await
    }

    async fn send_to_each(
        &self,
        clients: &[String],
        method: &str,
        params: Option<Value>,
    ) -> McpResult<()> {
        let attempts = clients.iter().map(|client_id| {
            let params = params.clone();
            async move {
                let result = self.send_to_client(client_id, method, params).await;
                (client_id, result)
            }
        });

        let mut last_error = None;
        for (client_id, result) in join_all(attempts).await {
            if let Err(e) = result {
                warn!(client_id = %client_id, method, "Failed to queue notification: {}", e);
                last_error = Some(e);
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn notify_tools_list_changed(&self) -> McpResult<()> {
        self.broadcast(TOOLS_LIST_CHANGED, Some(json!({}))).await
    }

    pub async fn notify_resources_list_changed(&self) -> McpResult<()> {
        self.broadcast(RESOURCES_LIST_CHANGED, Some(json!({}))).await
    }

    pub async fn notify_prompts_list_changed(&self) -> McpResult<()> {
        self.broadcast(PROMPTS_LIST_CHANGED, Some(json!({}))).await
    }

    pub async fn notify_roots_list_changed(&self) -> McpResult<()> {
        self.broadcast(ROOTS_LIST_CHANGED, Some(json!({}))).await
    }

    /// Tell every client a resource changed
    pub async fn notify_resource_changed(&self, uri: &str) -> McpResult<()> {
        let params = serde_json::to_value(ResourceUpdatedParams {
            uri: uri.to_string(),
        })?;
        self.broadcast(RESOURCES_UPDATED, Some(params)).await
    }

    /// Tell only the clients subscribed to `uri` that it changed
    pub async fn notify_resource_updated(&self, uri: &str) -> McpResult<()> {
        let subscribers = self.subscribers(uri);
        if subscribers.is_empty() {
            return Ok(());
        }
        let params = serde_json::to_value(ResourceUpdatedParams {
            uri: uri.to_string(),
        })?;
        self.send_to_each(&subscribers, RESOURCES_UPDATED, Some(params))
            .await
    }

    /// Progress for one client; skipped for clients without progress support
    pub async fn send_progress(
        &self,
        client_id: &str,
        progress_token: ProgressToken,
        progress: f64,
        message: Option<String>,
    ) -> McpResult<()> {
        let supports_progress = self
            .get_client_info(client_id)
            .map(|session| session.supports_progress)
            .ok_or_else(|| McpError::ClientNotFound(format!("client {client_id} not found")))?;
        if !supports_progress {
            return Ok(());
        }

        let params = serde_json::to_value(ProgressParams {
            progress_token,
            progress,
            message,
        })?;
        self.send_to_client(client_id, PROGRESS, Some(params)).await
    }

    /// Log message for every client that accepts them
    pub async fn send_log_message(
        &self,
        level: LoggingLevel,
        logger: Option<&str>,
        message: &str,
        data: Option<Value>,
    ) -> McpResult<()> {
        let data = match data {
            Some(data) => json!({ "message": message, "data": data }),
            None => Value::String(message.to_string()),
        };
        let params = serde_json::to_value(LoggingMessageParams {
            level,
            logger: logger.map(str::to_string),
            data,
        })?;

        let clients: Vec<String> = self
            .inner
            .clients
            .read()
            .values()
            .filter(|session| session.supports_logging)
            .map(|session| session.id.clone())
            .collect();
        self.send_to_each(&clients, LOGGING_MESSAGE, Some(params))
            .await
    }
}

async fn consume(inner: Arc<NotifierInner>, mut receiver: mpsc::Receiver<NotificationMessage>) {
    loop {
        let message = tokio::select! {
            biased;
            _ = inner.token.cancelled() => break,
            message = receiver.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        deliver(&inner, message).await;
    }
    // receiver drops here, closing the queue for senders
}

async fn deliver(inner: &NotifierInner, message: NotificationMessage) {
    {
        let mut clients = inner.clients.write();
        match clients.get_mut(&message.client_id) {
            Some(session) => session.last_seen_at = Utc::now(),
            // Disconnected since the message was queued
            None => return,
        }
    }

    let handlers: Vec<Arc<dyn DeliveryHandler>> =
        inner.handlers.read().values().flatten().cloned().collect();

    for handler in &handlers {
        if handler
            .deliver(&message.client_id, &message.notification)
            .await
            .is_ok()
        {
            return;
        }
    }

    warn!(
        client_id = %message.client_id,
        method = %message.notification.method,
        queued_at = %message.timestamp,
        "Failed to deliver notification"
    );
}
