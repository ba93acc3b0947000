// Copyright (c) 2025 MCP Rust Contributors
// SPDX-License-Identifier: MIT

// ! Tests for the dispatch engine

use async_trait::async_trait;
use mcp_runtime::{
    core::{
        UNKNOWN_METHOD,
        context::RequestContext,
        error::{McpError, McpResult},
        tool::{StaticTextTool, ToolHandler},
    },
    protocol::types::{JsonRpcReply, JsonRpcRequest, ToolResult, error_codes},
    server::{DispatchHook, DispatchOutcome, McpServer, ServerConfig},
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[cfg(test)]
mod server_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        async fn call(
            &self,
            _ctx: RequestContext,
            arguments: HashMap<String, Value>,
        ) -> McpResult<ToolResult> {
            let message = arguments
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Ok(ToolResult::text(message))
        }
    }

    struct FaultyTool;

    #[async_trait]
    impl ToolHandler for FaultyTool {
        async fn call(&self, _ctx: RequestContext, _args: HashMap<String, Value>) -> McpResult<ToolResult> {
            Err(McpError::rpc(-32010, "quota exhausted", Some(json!({"retryAfter": 5}))))
        }
    }

    async fn echo_server() -> McpServer {
        let server = McpServer::new("test-server", "1.0.0");
        server
            .add_tool(
                "echo",
                Some("Echo a message".to_string()),
                json!({
                    "type": "object",
                    "properties": { "message": {"type": "string"} },
                    "required": ["message"]
                }),
                EchoTool,
            )
            .await
            .unwrap();
        server
    }

    async fn send(server: &McpServer, raw: &str) -> Option<JsonRpcReply> {
        server
            .handle_message(RequestContext::new("client-1"), raw.as_bytes())
            .await
    }

    #[tokio::test]
    async fn test_ids_are_echoed_verbatim() {
        let server = echo_server().await;
        for id in [json!(7), json!("req-7"), json!(7.5)] {
            let raw = json!({"jsonrpc": "2.0", "id": id, "method": "ping"}).to_string();
            let reply = send(&server, &raw).await.unwrap();
            assert_eq!(reply.id(), &id);
            assert!(!reply.is_error());
        }
    }

    #[tokio::test]
    async fn test_notifications_get_no_reply() {
        let server = echo_server().await;
        let reply = send(&server, r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).await;
        assert!(reply.is_none());

        // Even a failing notification stays silent
        let reply = send(&server, r#"{"jsonrpc":"2.0","method":"no/such"}"#).await;
        assert!(reply.is_none());
        assert_eq!(server.stats().notifications, 2);
    }

    #[tokio::test]
    async fn test_per_method_counts_stay_bounded() {
        let server = echo_server().await;
        server
            .register_method("acme/status", |_ctx: RequestContext, _params: Option<Value>| async {
                Ok::<_, McpError>(json!({"ok": true}))
            })
            .await
            .unwrap();

        for n in 0..50 {
            let raw = json!({"jsonrpc": "2.0", "id": n, "method": format!("made/up/{n}")}).to_string();
            send(&server, &raw).await.unwrap();
        }
        send(&server, r#"{"jsonrpc":"2.0","id":"s","method":"acme/status"}"#).await.unwrap();
        send(&server, r#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#).await.unwrap();

        let by_method = server.stats().requests_by_method;
        assert_eq!(by_method.len(), 3);
        assert_eq!(by_method.get(UNKNOWN_METHOD), Some(&50));
        assert_eq!(by_method.get("acme/status"), Some(&1));
        assert_eq!(by_method.get("ping"), Some(&1));
    }

    #[tokio::test]
    async fn test_echo_tool_call() {
        let server = echo_server().await;
        let reply = send(
            &server,
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"echo","arguments":{"message":"hi"}}}"#,
        )
        .await
        .unwrap();
        assert_eq!(
            reply.result(),
            Some(&json!({"content": [{"type": "text", "text": "hi"}], "isError": false}))
        );
    }

    #[tokio::test]
    async fn test_error_codes() {
        let server = echo_server().await;
        let cases = [
            (r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"missing"}}"#, error_codes::METHOD_NOT_FOUND),
            (r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"echo","arguments":{}}}"#, error_codes::INVALID_PARAMS),
            (r#"{"jsonrpc":"2.0","id":3,"method":"tools/call"}"#, error_codes::INVALID_PARAMS),
            (r#"{"jsonrpc":"2.0","id":4,"method":"unknown/method"}"#, error_codes::METHOD_NOT_FOUND),
            (r#"{"jsonrpc":"1.0","id":5,"method":"ping"}"#, error_codes::INVALID_REQUEST),
            (r#"{"jsonrpc":"2.0","id":6"#, error_codes::PARSE_ERROR),
        ];
        for (raw, code) in cases {
            let reply = send(&server, raw).await.unwrap();
            assert_eq!(reply.error().map(|e| e.code), Some(code), "{raw}");
        }
    }

    #[tokio::test]
    async fn test_structured_handler_error_is_kept() {
        let server = McpServer::new("test-server", "1.0.0");
        server.add_tool("faulty", None, json!({}), FaultyTool).await.unwrap();

        let reply = send(&server, r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"faulty"}}"#)
            .await
            .unwrap();
        let error = reply.error().unwrap();
        assert_eq!(error.code, -32010);
        assert_eq!(error.message, "quota exhausted");
        assert_eq!(error.data, Some(json!({"retryAfter": 5})));
    }

    #[tokio::test]
    async fn test_tools_list_is_sorted() {
        let server = echo_server().await;
        server.add_tool("alpha", None, json!({}), StaticTextTool::new("a")).await.unwrap();

        let reply = send(&server, r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
            .await
            .unwrap();
        let names: Vec<&str> = reply.result().unwrap()["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|tool| tool["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["alpha", "echo"]);
    }

    #[tokio::test]
    async fn test_remove_tool() {
        let server = echo_server().await;
        assert!(server.remove_tool("echo").await.unwrap());
        assert!(!server.remove_tool("echo").await.unwrap());
        assert!(!server.has_tool("echo").await);
    }

    #[tokio::test]
    async fn test_overwrite_allowed_by_config() {
        let server = McpServer::with_config(
            "test-server",
            "1.0.0",
            ServerConfig {
                allow_overwrite: true,
                ..Default::default()
            },
        );
        server.add_tool("t", None, json!({}), StaticTextTool::new("one")).await.unwrap();
        server.add_tool("t", None, json!({}), StaticTextTool::new("two")).await.unwrap();
        assert_eq!(server.tool_count().await, 1);
    }

    #[tokio::test]
    async fn test_argument_validation_can_be_disabled() {
        let server = McpServer::with_config(
            "test-server",
            "1.0.0",
            ServerConfig {
                validate_arguments: false,
                ..Default::default()
            },
        );
        server
            .add_tool("echo", None, json!({"type": "object", "required": ["message"]}), EchoTool)
            .await
            .unwrap();
        let result = server
            .call_tool(&RequestContext::default(), "echo", HashMap::new())
            .await
            .unwrap();
        assert_eq!(result.content[0].as_text(), Some(""));
    }

    #[tokio::test]
    async fn test_requests_run_concurrently() {
        struct Gate(Arc<tokio::sync::Barrier>);

        #[async_trait]
        impl ToolHandler for Gate {
            async fn call(&self, _ctx: RequestContext, _args: HashMap<String, Value>) -> McpResult<ToolResult> {
                self.0.wait().await;
                Ok(ToolResult::text("through"))
            }
        }

        // Both calls must be inside the handler at once to pass the barrier
        let server = McpServer::new("test-server", "1.0.0");
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        server.add_tool("gate", None, json!({}), Gate(barrier)).await.unwrap();

        let raw = r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"gate"}}"#;
        let (a, b) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(send(&server, raw), send(&server, raw))
        })
        .await
        .expect("handlers ran in parallel");
        assert!(!a.unwrap().is_error());
        assert!(!b.unwrap().is_error());
    }

    #[derive(Default)]
    struct Counts {
        before: AtomicUsize,
        after: AtomicUsize,
        handlers: AtomicUsize,
    }

    struct CountingHook(Arc<Counts>);

    #[async_trait]
    impl DispatchHook for CountingHook {
        async fn before_dispatch(&self, _ctx: &RequestContext, request: &JsonRpcRequest) -> McpResult<()> {
            self.0.before.fetch_add(1, Ordering::SeqCst);
            if request.method == "tools/list" {
                return Err(McpError::rpc(-32001, "forbidden", None));
            }
            Ok(())
        }

        async fn after_dispatch(&self, _ctx: &RequestContext, _method: &str, _outcome: &DispatchOutcome) {
            self.0.after.fetch_add(1, Ordering::SeqCst);
        }

        async fn after_handler(
            &self,
            _ctx: &RequestContext,
            _method: &str,
            name: &str,
            _elapsed: Duration,
            ok: bool,
        ) {
            assert_eq!(name, "echo");
            assert!(ok);
            self.0.handlers.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_hooks_observe_and_veto() {
        let server = echo_server().await;
        let counts = Arc::new(Counts::default());
        server.add_hook(CountingHook(counts.clone()));

        let vetoed = send(&server, r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
            .await
            .unwrap();
        assert_eq!(vetoed.error().unwrap().code, -32001);

        let called = send(
            &server,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"echo","arguments":{"message":"x"}}}"#,
        )
        .await
        .unwrap();
        assert!(!called.is_error());

        assert_eq!(counts.before.load(Ordering::SeqCst), 2);
        assert_eq!(counts.after.load(Ordering::SeqCst), 2);
        assert_eq!(counts.handlers.load(Ordering::SeqCst), 1);
    }
}
