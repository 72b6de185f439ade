//! JSON-RPC dispatch behaviour of the protocol server.

use gateway_core::RequestContext;
use gateway_mcp::protocol::{
    GetPromptResult, PromptMessage, Role, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST,
    METHOD_NOT_FOUND, PARSE_ERROR,
};
use gateway_mcp::{
    middleware_fn, prompt_handler, resource_handler, CallToolRequest, CallToolResult, Content,
    McpError, McpServer, NotificationContext, Prompt, Resource, ResourceContents,
    ResourceTemplate, ServerTool, Tool, ToolMiddleware, tool_handler,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

fn sum_tool() -> ServerTool {
    ServerTool::new(
        Tool::new("sum")
            .with_description("Add two numbers")
            .with_property("a", json!({ "type": "number" }), true)
            .with_property("b", json!({ "type": "number" }), true),
        tool_handler(|_ctx, req: CallToolRequest| async move {
            let a = req.arguments.get("a").and_then(Value::as_f64).unwrap_or_default();
            let b = req.arguments.get("b").and_then(Value::as_f64).unwrap_or_default();
            Ok(CallToolResult::text(format!("{}", a + b)))
        }),
    )
}

fn named_tool(name: &str) -> ServerTool {
    ServerTool::new(
        Tool::new(name),
        tool_handler(|_ctx, _req| async { Ok(CallToolResult::text("ok")) }),
    )
}

async fn send(server: &McpServer, message: Value) -> Option<Value> {
    server
        .handle_value(RequestContext::new(), message)
        .await
        .map(|r| serde_json::to_value(r).unwrap())
}

async fn initialize(server: &McpServer) {
    send(server, json!({ "jsonrpc": "2.0", "id": 0, "method": "initialize" })).await;
}

#[tokio::test]
async fn test_sum_tool_end_to_end() {
    let server = McpServer::new("calc", "1.0");
    server.add_tools(vec![sum_tool()]).unwrap();
    initialize(&server).await;

    let response = send(
        &server,
        json!({ "jsonrpc": "2.0", "id": "call-1", "method": "tools/call",
                "params": { "name": "sum", "arguments": { "a": 2, "b": 3 } } }),
    )
    .await
    .unwrap();

    assert_eq!(response["id"], "call-1");
    assert_eq!(
        response["result"],
        json!({ "content": [{ "type": "text", "text": "5" }] })
    );
}

#[tokio::test]
async fn test_error_codes_echo_request_id() {
    let server = McpServer::new("gw", "1");
    server.add_tools(vec![sum_tool()]).unwrap();

    let parse = server
        .handle_message(RequestContext::new(), "{not json")
        .await
        .unwrap();
    assert_eq!(parse.error_code(), Some(PARSE_ERROR));
    assert_eq!(parse.id, Value::Null);
    assert_eq!(parse.error.unwrap().message, "Failed to parse message");

    let version = send(&server, json!({ "jsonrpc": "1.0", "id": 7, "method": "ping" }))
        .await
        .unwrap();
    assert_eq!(version["id"], 7);
    assert_eq!(version["error"]["code"], INVALID_REQUEST);

    let missing_version = send(&server, json!({ "id": 8, "method": "ping" })).await.unwrap();
    assert_eq!(missing_version["error"]["code"], INVALID_REQUEST);

    let unknown = send(&server, json!({ "jsonrpc": "2.0", "id": 9, "method": "nope" }))
        .await
        .unwrap();
    assert_eq!(unknown["id"], 9);
    assert_eq!(unknown["error"]["code"], METHOD_NOT_FOUND);
    assert_eq!(unknown["error"]["message"], "Method nope not found");

    let not_found = send(
        &server,
        json!({ "jsonrpc": "2.0", "id": 10, "method": "tools/call", "params": { "name": "mul" } }),
    )
    .await
    .unwrap();
    assert_eq!(not_found["error"]["code"], INVALID_PARAMS);
    assert_eq!(not_found["error"]["message"], "Tool not found: mul");

    let malformed = send(
        &server,
        json!({ "jsonrpc": "2.0", "id": 11, "method": "tools/call", "params": { "arguments": 3 } }),
    )
    .await
    .unwrap();
    assert_eq!(malformed["error"]["code"], INVALID_REQUEST);
}

#[tokio::test]
async fn test_notifications_never_get_a_response() {
    let server = McpServer::new("gw", "1");
    assert!(send(&server, json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .await
        .is_none());
    assert!(send(&server, json!({ "jsonrpc": "2.0", "id": null, "method": "tools/list" }))
        .await
        .is_none());
    assert!(send(&server, json!({ "jsonrpc": "2.0", "method": "unknown/thing" }))
        .await
        .is_none());
}

#[tokio::test]
async fn test_capability_gating() {
    let bare = McpServer::new("gw", "1");
    let tools = send(&bare, json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }))
        .await
        .unwrap();
    assert_eq!(tools["error"]["message"], "Tools not supported");
    let resources = send(&bare, json!({ "jsonrpc": "2.0", "id": 2, "method": "resources/list" }))
        .await
        .unwrap();
    assert_eq!(resources["error"]["code"], METHOD_NOT_FOUND);
    assert_eq!(resources["error"]["message"], "Resources not supported");
    let prompts = send(&bare, json!({ "jsonrpc": "2.0", "id": 3, "method": "prompts/get" }))
        .await
        .unwrap();
    assert_eq!(prompts["error"]["message"], "Prompts not supported");

    let err = bare
        .add_resource(
            Resource::new("db://x", "x"),
            resource_handler(|_ctx, _req| async { Ok(Vec::new()) }),
        )
        .unwrap_err();
    assert!(matches!(err, McpError::CapabilityDisabled("resource")));
}

#[tokio::test]
async fn test_tools_list_is_sorted_after_add_and_delete() {
    let server = McpServer::new("gw", "1");
    server
        .add_tools(vec![named_tool("zeta"), named_tool("alpha"), named_tool("mid")])
        .unwrap();
    server.delete_tools(&["mid", "missing"]).unwrap();
    server.add_tool(Tool::new("beta"), named_tool("beta").handler).unwrap();

    let response = send(&server, json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }))
        .await
        .unwrap();
    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["alpha", "beta", "zeta"]);
}

#[tokio::test]
async fn test_list_changed_only_after_initialize() {
    let server = McpServer::new("gw", "1");
    let mut sub = server.subscribe(NotificationContext {
        client_id: "c".into(),
        session_id: "s".into(),
    });

    server.add_tools(vec![named_tool("a")]).unwrap();
    assert!(sub.try_recv().is_none());

    initialize(&server).await;
    server.add_tools(vec![named_tool("b")]).unwrap();
    server.delete_tools(&["a"]).unwrap();

    for _ in 0..2 {
        let n = sub.try_recv().unwrap();
        assert_eq!(n.notification.method, "notifications/tools/list_changed");
        assert_eq!(n.context.session_id, "s");
    }
    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn test_full_queue_does_not_undo_registration() {
    let server = McpServer::new("gw", "1").with_notification_capacity(100);
    let _sub = server.subscribe(NotificationContext {
        client_id: "c".into(),
        session_id: "s".into(),
    });
    initialize(&server).await;

    for i in 0..100 {
        server.send_notification_to("s", "notifications/message", Some(json!({ "n": i }))).unwrap();
    }
    let overflow = server.send_notification_to("s", "notifications/message", None).unwrap_err();
    assert!(matches!(overflow, McpError::QueueFull(_)));

    let err = server.add_tools(vec![named_tool("late")]).unwrap_err();
    assert!(err.is_notification_failure());
    assert!(server.has_tool("late"));
}

#[tokio::test]
async fn test_middleware_last_registered_runs_first() {
    let server = McpServer::new("gw", "1");
    server.add_tools(vec![sum_tool()]).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    for label in ["A", "B"] {
        let order = Arc::clone(&order);
        let middleware: Arc<dyn ToolMiddleware> =
            Arc::new(middleware_fn(move |ctx, next: ServerTool, req| {
                let order = Arc::clone(&order);
                async move {
                    order.lock().unwrap().push(label);
                    next.call(ctx, req).await
                }
            }));
        server.add_tool_middleware(middleware);
    }

    let response = send(
        &server,
        json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/call",
                "params": { "name": "sum", "arguments": { "a": 1, "b": 1 } } }),
    )
    .await
    .unwrap();
    assert_eq!(response["result"]["content"][0]["text"], "2");
    assert_eq!(*order.lock().unwrap(), vec!["B", "A"]);
}

#[tokio::test]
async fn test_tool_handler_error_is_internal_error() {
    let server = McpServer::new("gw", "1");
    server
        .add_tool(
            Tool::new("boom"),
            tool_handler(|_ctx, _req| async { anyhow::bail!("exploded") }),
        )
        .unwrap();
    let response = send(
        &server,
        json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": { "name": "boom" } }),
    )
    .await
    .unwrap();
    assert_eq!(response["error"]["code"], INTERNAL_ERROR);
    assert_eq!(response["error"]["message"], "exploded");
}

#[tokio::test]
async fn test_resources_exact_then_template() {
    let server = McpServer::new("gw", "1").with_resource_capabilities(false, false);
    server
        .add_resource(
            Resource::new("/widgets/special", "special").with_mime_type("text/plain"),
            resource_handler(|_ctx, req| async move {
                Ok(vec![ResourceContents::text(req.uri, Some("text/plain"), "exact")])
            }),
        )
        .unwrap();
    server
        .add_resource_template(
            ResourceTemplate::new("/widgets/{id}", "widget"),
            resource_handler(|_ctx, req| async move {
                Ok(vec![ResourceContents::text(req.uri, None, "templated")])
            }),
        )
        .unwrap();

    let read = |uri: &'static str| {
        json!({ "jsonrpc": "2.0", "id": 1, "method": "resources/read", "params": { "uri": uri } })
    };

    let exact = send(&server, read("/widgets/special")).await.unwrap();
    assert_eq!(exact["result"]["contents"][0]["text"], "exact");
    assert_eq!(exact["result"]["contents"][0]["mimeType"], "text/plain");

    let templated = send(&server, read("/widgets/42")).await.unwrap();
    assert_eq!(templated["result"]["contents"][0]["text"], "templated");
    assert_eq!(templated["result"]["contents"][0]["uri"], "/widgets/42");

    let nested = send(&server, read("/widgets/42/parts")).await.unwrap();
    assert_eq!(nested["error"]["code"], INVALID_PARAMS);
    assert_eq!(
        nested["error"]["message"],
        "No handler found for resource URI: /widgets/42/parts"
    );

    let templates = send(
        &server,
        json!({ "jsonrpc": "2.0", "id": 2, "method": "resources/templates/list" }),
    )
    .await
    .unwrap();
    assert_eq!(
        templates["result"]["resourceTemplates"],
        json!([{ "uriTemplate": "/widgets/{id}", "name": "widget" }])
    );
}

#[tokio::test]
async fn test_prompts_get_and_missing() {
    let server = McpServer::new("gw", "1").with_prompt_capabilities(false);
    server
        .add_prompt(
            Prompt::new("greet").with_argument("who", true),
            prompt_handler(|_ctx, req| async move {
                let who = req.arguments.get("who").cloned().unwrap_or_default();
                Ok(GetPromptResult {
                    description: None,
                    messages: vec![PromptMessage {
                        role: Role::User,
                        content: Content::text(format!("Hello {who}")),
                    }],
                })
            }),
        )
        .unwrap();

    let got = send(
        &server,
        json!({ "jsonrpc": "2.0", "id": 1, "method": "prompts/get",
                "params": { "name": "greet", "arguments": { "who": "Ada" } } }),
    )
    .await
    .unwrap();
    assert_eq!(got["result"]["messages"][0]["role"], "user");
    assert_eq!(got["result"]["messages"][0]["content"]["text"], "Hello Ada");

    let missing = send(
        &server,
        json!({ "jsonrpc": "2.0", "id": 2, "method": "prompts/get", "params": { "name": "nope" } }),
    )
    .await
    .unwrap();
    assert_eq!(missing["error"]["code"], INVALID_PARAMS);
    assert_eq!(missing["error"]["message"], "Prompt not found: nope");
}
