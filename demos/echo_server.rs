// ! Echo Server Demo
// !
// ! A minimal STDIO server with one tool, one resource and one prompt.
// ! Clients that only understand tools (Cursor, Zed, ...) still reach the
// ! resource and the prompt through the `read_resource` and `get_prompt` tools.
// !
// ! Run with: cargo run --example echo_server
// ! Logs go to stderr; set RUST_LOG=debug to see every dispatched request.

use mcp_runtime::prelude::*;

struct EchoHandler;

#[async_trait]
impl ToolHandler for EchoHandler {
    async fn call(&self, ctx: RequestContext, arguments: HashMap<String, Value>) -> McpResult<ToolResult> {
        let message = arguments
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| McpError::validation("message must be a string"))?;

        if ctx.is_cancelled() {
            return Err(McpError::Cancelled("echo cancelled".to_string()));
        }
        Ok(ToolResult::text(format!("Echo: {message}")))
    }
}

#[tokio::main]
async fn main() -> McpResult<()> {
    init_tracing();

    let notifier = Notifier::with_config(NotifierConfig {
        queue_size: 256,
        ..Default::default()
    });
    let server = McpServer::new("echo-server", env!("CARGO_PKG_VERSION")).with_notifier(notifier);

    server
        .add_tool(
            "echo",
            Some("Echo a message back to the caller".to_string()),
            json!({
                "type": "object",
                "properties": { "message": { "type": "string" } },
                "required": ["message"]
            }),
            EchoHandler,
        )
        .await?;

    server
        .add_simple_tool("time", "Current UTC time", |_args| {
            Ok(ToolResult::text(chrono::Utc::now().to_rfc3339()))
        })
        .await?;

    server
        .add_resource(
            "readme",
            "memo://readme",
            TextResource::new(
                "This server echoes messages. Try the echo tool.",
                Some("text/plain".to_string()),
            ),
        )
        .await?;

    server
        .add_prompt(
            PromptInfo::new("greet", Some("Greet someone by name".to_string()))
                .with_argument("name", "Who to greet", true),
            TemplatePrompt::new("Write a warm greeting for {name}."),
        )
        .await?;

    tracing::info!("echo-server ready on stdio");
    server.run_with_stdio().await
}
