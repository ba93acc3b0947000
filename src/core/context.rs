//! Per-request execution context
//!
//! Every handler call receives a [`RequestContext`]. It names the connection
//! and request being served and carries a cancellation token that fires when
//! the request deadline passes, the peer cancels the request, or the
//! connection is closed.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::protocol::types::RequestId;

/// Client ID used when a request arrives without a connection (direct calls)
pub const LOCAL_CLIENT_ID: &str = "local";

#[derive(Debug, Clone)]
pub struct RequestContext {
    client_id: String,
    request_id: Option<RequestId>,
    method: Option<String>,
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(LOCAL_CLIENT_ID)
    }
}

impl RequestContext {
    /// Root context for a connection
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            request_id: None,
            method: None,
            deadline: None,
            token: CancellationToken::new(),
        }
    }

    /// Root context bound to an existing token, e.g. a connection's lifetime
    pub fn with_token(client_id: impl Into<String>, token: CancellationToken) -> Self {
        Self {
            token,
            ..Self::new(client_id)
        }
    }

    /// Derive the context for one request. Cancelling the parent cancels the
    /// child; the child never cancels its parent.
    pub fn for_request(
        &self,
        request_id: Option<RequestId>,
        method: &str,
        timeout: Option<Duration>,
    ) -> Self {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        Self {
            client_id: self.client_id.clone(),
            request_id,
            method: Some(method.to_string()),
            deadline: match (self.deadline, deadline) {
                (Some(parent), Some(own)) => Some(parent.min(own)),
                (parent, own) => own.or(parent),
            },
            token: self.token.child_token(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` without a deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the context is cancelled
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The underlying token, for handlers that spawn their own work
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_child_follows_parent_cancellation() {
        let connection = RequestContext::new("client-1");
        let request = connection.for_request(Some(json!(1)), "tools/call", None);

        assert_eq!(request.client_id(), "client-1");
        assert_eq!(request.method(), Some("tools/call"));
        assert!(!request.is_cancelled());

        connection.cancel();
        request.cancelled().await;
        assert!(request.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_cancel_leaves_parent_running() {
        let connection = RequestContext::new("client-1");
        let request = connection.for_request(Some(json!("a")), "ping", None);
        request.cancel();
        assert!(!connection.is_cancelled());
    }

    #[tokio::test]
    async fn test_deadline_is_tightest_of_parent_and_child() {
        let connection = RequestContext::new("client-1");
        let outer = connection.for_request(None, "a", Some(Duration::from_secs(5)));
        let inner = outer.for_request(None, "b", Some(Duration::from_secs(30)));

        assert_eq!(inner.deadline(), outer.deadline());
        assert!(inner.remaining().unwrap() <= Duration::from_secs(5));
        assert_eq!(connection.remaining(), None);
    }
}
