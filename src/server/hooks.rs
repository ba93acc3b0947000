// ! Dispatch hooks
// !
// ! Observation points around request dispatch and handler execution. A hook's
// ! `before_dispatch` may veto a request, which is where authorization policy plugs in.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use crate::core::context::RequestContext;
use crate::core::error::McpResult;
use crate::protocol::types::JsonRpcRequest;

/// How a dispatched request ended
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub elapsed: Duration,
    /// Wire error code, `None` on success
    pub error_code: Option<i32>,
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        self.error_code.is_none()
    }
}

/// Hook points around dispatch. Every method defaults to a no-op.
#[async_trait]
pub trait DispatchHook: Send + Sync {
    /// Runs before routing. An error rejects the request with that error.
    async fn before_dispatch(&self, _ctx: &RequestContext, _request: &JsonRpcRequest) -> McpResult<()> {
        Ok(())
    }

    async fn after_dispatch(&self, _ctx: &RequestContext, _method: &str, _outcome: &DispatchOutcome) {}

    /// Runs before a tool, resource or prompt handler is invoked
    async fn before_handler(&self, _ctx: &RequestContext, _method: &str, _name: &str) {}

    async fn after_handler(
        &self,
        _ctx: &RequestContext,
        _method: &str,
        _name: &str,
        _elapsed: Duration,
        _ok: bool,
    ) {
    }
}

/// Logs every dispatch through `tracing`
#[derive(Debug, Default, Clone)]
pub struct LoggingHook;

#[async_trait]
impl DispatchHook for LoggingHook {
    async fn after_dispatch(&self, ctx: &RequestContext, method: &str, outcome: &DispatchOutcome) {
        info!(
            client_id = ctx.client_id(),
            method,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            error_code = outcome.error_code,
            "Request dispatched"
        );
    }

    async fn after_handler(
        &self,
        ctx: &RequestContext,
        method: &str,
        name: &str,
        elapsed: Duration,
        ok: bool,
    ) {
        debug!(
            client_id = ctx.client_id(),
            method,
            handler = name,
            elapsed_ms = elapsed.as_millis() as u64,
            ok,
            "Handler finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::McpError;

    struct DenyAll;

    #[async_trait]
    impl DispatchHook for DenyAll {
        async fn before_dispatch(&self, _ctx: &RequestContext, request: &JsonRpcRequest) -> McpResult<()> {
            Err(McpError::rpc(-32001, format!("{} denied", request.method), None))
        }
    }

    #[tokio::test]
    async fn test_default_hooks_are_no_ops() {
        let hook = LoggingHook;
        let ctx = RequestContext::default();
        let request = JsonRpcRequest::notification("ping", None);
        assert!(hook.before_dispatch(&ctx, &request).await.is_ok());
        hook.after_dispatch(
            &ctx,
            "ping",
            &DispatchOutcome {
                elapsed: Duration::from_millis(1),
                error_code: None,
            },
        )
        .await;
    }

    #[tokio::test]
    async fn test_hook_can_veto() {
        let ctx = RequestContext::default();
        let request = JsonRpcRequest::new(serde_json::json!(1), "tools/list", None);
        let err = DenyAll.before_dispatch(&ctx, &request).await.unwrap_err();
        assert_eq!(err.code(), -32001);
    }
}
