//! Line-delimited stdio transport.
//!
//! One JSON-RPC message per line in, one per line out. Requests are handled
//! concurrently, so responses may be written out of order; clients match
//! them by id. Logs must go to stderr.

use crate::error::McpError;
use crate::notifications::NotificationContext;
use crate::protocol::JsonRpcResponse;
use crate::server::McpServer;
use gateway_core::RequestContext;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Session id used for the single stdio client.
pub const STDIO_SESSION: &str = "stdio";

pub struct StdioServer {
    server: Arc<McpServer>,
}

impl StdioServer {
    pub fn new(server: Arc<McpServer>) -> Self {
        Self { server }
    }

    /// Serve the process's stdin and stdout until stdin closes.
    pub async fn run(self) -> Result<(), McpError> {
        tracing::info!("Starting MCP server with stdio transport");
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve an arbitrary byte stream pair.
    pub async fn serve<R, W>(self, reader: R, mut writer: W) -> Result<(), McpError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        let mut subscription = self.server.subscribe(NotificationContext {
            client_id: STDIO_SESSION.to_string(),
            session_id: STDIO_SESSION.to_string(),
        });
        let (response_tx, mut response_rx) = mpsc::channel::<JsonRpcResponse>(64);
        let mut response_tx = Some(response_tx);

        loop {
            tokio::select! {
                line = lines.next_line(), if response_tx.is_some() => {
                    let Some(line) = line? else {
                        // Stop reading but flush in-flight responses.
                        response_tx = None;
                        continue;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let Some(tx) = response_tx.clone() else { continue };
                    let server = Arc::clone(&self.server);
                    tokio::spawn(async move {
                        let ctx = RequestContext::new().with_session(STDIO_SESSION);
                        if let Some(response) = server.handle_message(ctx, &line).await {
                            let _ = tx.send(response).await;
                        }
                    });
                }
                response = response_rx.recv() => {
                    let Some(response) = response else { break };
                    write_line(&mut writer, &serde_json::to_string(&response)?).await?;
                }
                Some(notification) = subscription.recv(), if response_tx.is_some() => {
                    write_line(&mut writer, &serde_json::to_string(&notification.notification)?).await?;
                }
            }
        }

        tracing::info!("stdin closed, stopping stdio transport");
        Ok(())
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<(), McpError> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CallToolResult, Tool};
    use crate::tools::tool_handler;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_round_trip_over_byte_streams() {
        let server = Arc::new(McpServer::new("gw", "1"));
        server
            .add_tool(
                Tool::new("hello"),
                tool_handler(|_ctx, _req| async { Ok(CallToolResult::text("hi")) }),
            )
            .unwrap();

        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"hello"}}"#,
            "\n",
        );
        let mut output = Vec::new();
        StdioServer::new(server)
            .serve(input.as_bytes(), &mut output)
            .await
            .unwrap();

        let mut responses: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        responses.sort_by_key(|r| r["id"].as_i64());

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0], json!({ "jsonrpc": "2.0", "id": 1, "result": {} }));
        assert_eq!(responses[1]["result"]["content"][0]["text"], "hi");
    }
}
