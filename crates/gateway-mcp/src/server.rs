//! MCP server core: registries, dispatch and the initialize handshake.
//!
//! The server is transport-agnostic. Transports feed raw JSON-RPC text into
//! [`McpServer::handle_message`] together with a [`RequestContext`] and write
//! back whatever response comes out. Notifications never produce one.

use crate::error::McpError;
use crate::notifications::{NotificationContext, NotificationHub, Subscription};
use crate::protocol::{
    negotiate_protocol_version, BaseMessage, CallToolRequest, GetPromptRequest, Implementation,
    InitializeRequest, InitializeResult, JsonRpcNotification, JsonRpcResponse,
    ListChangedCapability, ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult,
    ListToolsResult, PaginatedRequest, Prompt, ReadResourceRequest, ReadResourceResult, Resource,
    ResourceTemplate, ResourcesCapability, ServerCapabilities, Tool, INTERNAL_ERROR,
    INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::resources::{
    template_pattern, PromptHandler, ResourceHandler, ServerPrompt, ServerResource,
    ServerResourceTemplate,
};
use crate::tools::{compose, ServerTool, ToolHandler, ToolMiddleware};
use gateway_core::{McpSettings, RequestContext};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";

/// Handler for a client notification method.
pub type NotificationHandler = Arc<dyn Fn(RequestContext, JsonRpcNotification) + Send + Sync>;

/// Admission check run by transports before opening a session.
pub type Authorizer = Arc<dyn Fn(&RequestContext) -> bool + Send + Sync>;

#[derive(Default)]
struct ServerState {
    tools: BTreeMap<String, ServerTool>,
    middlewares: Vec<Arc<dyn ToolMiddleware>>,
    resources: BTreeMap<String, ServerResource>,
    templates: Vec<ServerResourceTemplate>,
    prompts: BTreeMap<String, ServerPrompt>,
    notification_handlers: HashMap<String, NotificationHandler>,
    authorizers: Vec<Authorizer>,
}

/// MCP server.
pub struct McpServer {
    name: String,
    version: String,
    instructions: Option<String>,
    resources: Option<ResourcesCapability>,
    prompts: Option<ListChangedCapability>,
    logging: bool,
    strict_handshake: bool,
    initialized: AtomicBool,
    notifications: NotificationHub,
    state: RwLock<ServerState>,
}

impl McpServer {
    /// Create a server with tools only. Resource, prompt and logging
    /// capabilities are opt-in.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            instructions: None,
            resources: None,
            prompts: None,
            logging: false,
            strict_handshake: false,
            initialized: AtomicBool::new(false),
            notifications: NotificationHub::default(),
            state: RwLock::new(ServerState::default()),
        }
    }

    /// Create a server from the `mcp` config section.
    pub fn from_settings(settings: &McpSettings) -> Self {
        let server = Self::new(&settings.name, &settings.version)
            .with_notification_capacity(settings.notification_capacity)
            .with_strict_handshake(settings.strict_handshake);
        match &settings.instructions {
            Some(instructions) => server.with_instructions(instructions),
            None => server,
        }
    }

    pub fn with_resource_capabilities(mut self, subscribe: bool, list_changed: bool) -> Self {
        self.resources = Some(ResourcesCapability {
            subscribe,
            list_changed,
        });
        self
    }

    pub fn with_prompt_capabilities(mut self, list_changed: bool) -> Self {
        self.prompts = Some(ListChangedCapability { list_changed });
        self
    }

    pub fn with_logging(mut self) -> Self {
        self.logging = true;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notifications = NotificationHub::new(capacity);
        self
    }

    /// Reject everything except `initialize` and `ping` until the client
    /// has initialized.
    pub fn with_strict_handshake(mut self, strict: bool) -> Self {
        self.strict_handshake = strict;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ServerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ServerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------
    // Tools
    // -----------------------------------------------------------------

    /// Register or replace a tool.
    ///
    /// The tool is always registered; an `Err` only reports that the
    /// list-changed notification could not reach every session.
    pub fn add_tool(&self, tool: Tool, handler: ToolHandler) -> Result<(), McpError> {
        self.add_tools(vec![ServerTool::new(tool, handler)])
    }

    /// Register or replace several tools with one notification.
    pub fn add_tools(&self, tools: Vec<ServerTool>) -> Result<(), McpError> {
        {
            let mut state = self.write_state();
            for tool in tools {
                tracing::debug!(tool = %tool.tool.name, "Registered tool");
                state.tools.insert(tool.tool.name.clone(), tool);
            }
        }
        self.notify_tools_changed()
    }

    /// Replace the whole tool set.
    pub fn set_tools(&self, tools: Vec<ServerTool>) -> Result<(), McpError> {
        {
            let mut state = self.write_state();
            state.tools = tools
                .into_iter()
                .map(|tool| (tool.tool.name.clone(), tool))
                .collect();
        }
        self.notify_tools_changed()
    }

    /// Remove tools by name. Unknown names are ignored.
    pub fn delete_tools<S: AsRef<str>>(&self, names: &[S]) -> Result<(), McpError> {
        {
            let mut state = self.write_state();
            for name in names {
                state.tools.remove(name.as_ref());
            }
        }
        self.notify_tools_changed()
    }

    /// Tool definitions sorted by name.
    pub fn list_tools(&self) -> Vec<Tool> {
        self.read_state().tools.values().map(|t| t.tool.clone()).collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.read_state().tools.contains_key(name)
    }

    /// Middleware registered later wraps middleware registered earlier.
    pub fn add_tool_middleware(&self, middleware: Arc<dyn ToolMiddleware>) {
        self.write_state().middlewares.push(middleware);
    }

    fn notify_tools_changed(&self) -> Result<(), McpError> {
        if !self.is_initialized() {
            return Ok(());
        }
        self.notifications
            .broadcast(TOOLS_LIST_CHANGED, None)
            .inspect_err(|e| tracing::warn!(error = %e, "Tool list change notification dropped"))
    }

    // -----------------------------------------------------------------
    // Resources and prompts
    // -----------------------------------------------------------------

    pub fn add_resource(&self, resource: Resource, handler: ResourceHandler) -> Result<(), McpError> {
        if self.resources.is_none() {
            return Err(McpError::CapabilityDisabled("resource"));
        }
        self.write_state().resources.insert(
            resource.uri.clone(),
            ServerResource { resource, handler },
        );
        Ok(())
    }

    /// Register a URI template. Templates are matched in registration
    /// order; re-registering a template string replaces it in place.
    pub fn add_resource_template(
        &self,
        template: ResourceTemplate,
        handler: ResourceHandler,
    ) -> Result<(), McpError> {
        if self.resources.is_none() {
            return Err(McpError::CapabilityDisabled("resource"));
        }
        let entry = ServerResourceTemplate {
            pattern: template_pattern(&template.uri_template),
            template,
            handler,
        };
        let mut state = self.write_state();
        match state
            .templates
            .iter_mut()
            .find(|t| t.template.uri_template == entry.template.uri_template)
        {
            Some(existing) => *existing = entry,
            None => state.templates.push(entry),
        }
        Ok(())
    }

    pub fn add_prompt(&self, prompt: Prompt, handler: PromptHandler) -> Result<(), McpError> {
        if self.prompts.is_none() {
            return Err(McpError::CapabilityDisabled("prompt"));
        }
        self.write_state()
            .prompts
            .insert(prompt.name.clone(), ServerPrompt { prompt, handler });
        Ok(())
    }

    // -----------------------------------------------------------------
    // Notifications and admission
    // -----------------------------------------------------------------

    /// Handle a client notification method. Replaces any previous handler.
    pub fn add_notification_handler<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(RequestContext, JsonRpcNotification) + Send + Sync + 'static,
    {
        self.write_state()
            .notification_handlers
            .insert(method.into(), Arc::new(handler));
    }

    /// Open a notification queue for a session.
    pub fn subscribe(&self, context: NotificationContext) -> Subscription {
        self.notifications.subscribe(context)
    }

    pub fn send_notification_to(
        &self,
        session_id: &str,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), McpError> {
        self.notifications.send_to(session_id, method, params)
    }

    pub fn broadcast_notification(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        self.notifications.broadcast(method, params)
    }

    pub fn add_authorizer<F>(&self, authorizer: F)
    where
        F: Fn(&RequestContext) -> bool + Send + Sync + 'static,
    {
        self.write_state().authorizers.push(Arc::new(authorizer));
    }

    /// True when every registered authorizer admits the request.
    pub fn is_authorized(&self, ctx: &RequestContext) -> bool {
        let authorizers = self.read_state().authorizers.clone();
        authorizers.iter().all(|check| check(ctx))
    }

    // -----------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------

    /// Handle one raw JSON-RPC message.
    pub async fn handle_message(&self, ctx: RequestContext, raw: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => self.handle_value(ctx, value).await,
            Err(e) => {
                tracing::debug!(error = %e, "Unparseable message");
                Some(parse_error())
            }
        }
    }

    /// Handle one already-decoded JSON-RPC message.
    pub async fn handle_value(&self, ctx: RequestContext, value: Value) -> Option<JsonRpcResponse> {
        let message: BaseMessage = match serde_json::from_value(value) {
            Ok(message) => message,
            Err(_) => return Some(parse_error()),
        };

        if message.jsonrpc.as_deref() != Some(JSONRPC_VERSION) {
            let id = message.id.unwrap_or(Value::Null);
            return Some(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                "Invalid JSON-RPC version",
            ));
        }

        let method = message.method.unwrap_or_default();
        let Some(id) = message.id else {
            self.handle_notification(ctx, JsonRpcNotification::new(method, message.params));
            return None;
        };

        if self.strict_handshake
            && !self.is_initialized()
            && !matches!(method.as_str(), "initialize" | "ping")
        {
            return Some(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                "Server not initialized",
            ));
        }

        tracing::debug!(method = %method, "Handling request");
        Some(self.handle_request(ctx, id, &method, message.params).await)
    }

    async fn handle_request(
        &self,
        ctx: RequestContext,
        id: Value,
        method: &str,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let no_tools = self.read_state().tools.is_empty();
        match method {
            "initialize" => self.handle_initialize(id, params),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "resources/list" | "resources/templates/list" | "resources/read"
                if self.resources.is_none() =>
            {
                JsonRpcResponse::error(id, METHOD_NOT_FOUND, "Resources not supported")
            }
            "resources/list" => self.handle_list_resources(id, params),
            "resources/templates/list" => self.handle_list_resource_templates(id, params),
            "resources/read" => self.handle_read_resource(ctx, id, params).await,
            "prompts/list" | "prompts/get" if self.prompts.is_none() => {
                JsonRpcResponse::error(id, METHOD_NOT_FOUND, "Prompts not supported")
            }
            "prompts/list" => self.handle_list_prompts(id, params),
            "prompts/get" => self.handle_get_prompt(ctx, id, params).await,
            "tools/list" | "tools/call" if no_tools => {
                JsonRpcResponse::error(id, METHOD_NOT_FOUND, "Tools not supported")
            }
            "tools/list" => self.handle_list_tools(id, params),
            "tools/call" => self.handle_call_tool(ctx, id, params).await,
            other => JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method {other} not found"),
            ),
        }
    }

    fn handle_notification(&self, ctx: RequestContext, notification: JsonRpcNotification) {
        let handler = self
            .read_state()
            .notification_handlers
            .get(&notification.method)
            .cloned();
        match handler {
            Some(handler) => handler(ctx, notification),
            None => tracing::debug!(method = %notification.method, "Unhandled notification"),
        }
    }

    fn handle_initialize(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let request: InitializeRequest = match parse_params(params) {
            Ok(request) => request,
            Err(_) => {
                return JsonRpcResponse::error(id, INVALID_REQUEST, "Invalid initialize request")
            }
        };

        let result = InitializeResult {
            protocol_version: negotiate_protocol_version(&request.protocol_version).to_string(),
            capabilities: self.capabilities(),
            server_info: Implementation {
                name: self.name.clone(),
                version: self.version.clone(),
            },
            instructions: self.instructions.clone(),
        };

        if !self.initialized.swap(true, Ordering::SeqCst) {
            tracing::info!(
                client = %request.client_info.name,
                client_version = %request.client_info.version,
                protocol = %result.protocol_version,
                "MCP session initialized"
            );
        }
        respond(id, &result)
    }

    /// Capabilities advertised by `initialize`.
    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            logging: self.logging.then(Map::new),
            prompts: self.prompts,
            resources: self.resources,
            tools: Some(ListChangedCapability { list_changed: true }),
        }
    }

    fn handle_list_tools(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        if parse_params::<PaginatedRequest>(params).is_err() {
            return JsonRpcResponse::error(id, INVALID_REQUEST, "Invalid list tools request");
        }
        respond(
            id,
            &ListToolsResult {
                tools: self.list_tools(),
                next_cursor: None,
            },
        )
    }

    async fn handle_call_tool(
        &self,
        ctx: RequestContext,
        id: Value,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let request: CallToolRequest = match parse_params(params) {
            Ok(request) => request,
            Err(_) => return JsonRpcResponse::error(id, INVALID_REQUEST, "Invalid call tool request"),
        };

        let composed = {
            let state = self.read_state();
            state
                .tools
                .get(&request.name)
                .map(|tool| compose(tool.clone(), &state.middlewares))
        };
        let Some(tool) = composed else {
            return JsonRpcResponse::error(
                id,
                INVALID_PARAMS,
                format!("Tool not found: {}", request.name),
            );
        };

        let name = request.name.clone();
        match tool.call(ctx, request).await {
            Ok(result) => respond(id, &result),
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "Tool handler failed");
                JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string())
            }
        }
    }

    fn handle_list_resources(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        if parse_params::<PaginatedRequest>(params).is_err() {
            return JsonRpcResponse::error(id, INVALID_REQUEST, "Invalid list resources request");
        }
        let resources = self
            .read_state()
            .resources
            .values()
            .map(|r| r.resource.clone())
            .collect();
        respond(
            id,
            &ListResourcesResult {
                resources,
                next_cursor: None,
            },
        )
    }

    fn handle_list_resource_templates(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        if parse_params::<PaginatedRequest>(params).is_err() {
            return JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                "Invalid list resource templates request",
            );
        }
        let resource_templates = self
            .read_state()
            .templates
            .iter()
            .map(|t| t.template.clone())
            .collect();
        respond(
            id,
            &ListResourceTemplatesResult {
                resource_templates,
                next_cursor: None,
            },
        )
    }

    async fn handle_read_resource(
        &self,
        ctx: RequestContext,
        id: Value,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let request: ReadResourceRequest = match parse_params(params) {
            Ok(request) => request,
            Err(_) => {
                return JsonRpcResponse::error(id, INVALID_REQUEST, "Invalid read resource request")
            }
        };

        let handler = {
            let state = self.read_state();
            state
                .resources
                .get(&request.uri)
                .map(|r| Arc::clone(&r.handler))
                .or_else(|| {
                    state
                        .templates
                        .iter()
                        .find(|t| t.pattern.is_match(&request.uri))
                        .map(|t| Arc::clone(&t.handler))
                })
        };
        let Some(handler) = handler else {
            return JsonRpcResponse::error(
                id,
                INVALID_PARAMS,
                format!("No handler found for resource URI: {}", request.uri),
            );
        };

        match handler(ctx, request).await {
            Ok(contents) => respond(id, &ReadResourceResult { contents }),
            Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
        }
    }

    fn handle_list_prompts(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        if parse_params::<PaginatedRequest>(params).is_err() {
            return JsonRpcResponse::error(id, INVALID_REQUEST, "Invalid list prompts request");
        }
        let prompts = self
            .read_state()
            .prompts
            .values()
            .map(|p| p.prompt.clone())
            .collect();
        respond(
            id,
            &ListPromptsResult {
                prompts,
                next_cursor: None,
            },
        )
    }

    async fn handle_get_prompt(
        &self,
        ctx: RequestContext,
        id: Value,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let request: GetPromptRequest = match parse_params(params) {
            Ok(request) => request,
            Err(_) => return JsonRpcResponse::error(id, INVALID_REQUEST, "Invalid get prompt request"),
        };

        let handler = self
            .read_state()
            .prompts
            .get(&request.name)
            .map(|p| Arc::clone(&p.handler));
        let Some(handler) = handler else {
            return JsonRpcResponse::error(
                id,
                INVALID_PARAMS,
                format!("Prompt not found: {}", request.name),
            );
        };

        match handler(ctx, request).await {
            Ok(result) => respond(id, &result),
            Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
        }
    }
}

fn parse_error() -> JsonRpcResponse {
    JsonRpcResponse::error(Value::Null, PARSE_ERROR, "Failed to parse message")
}

/// Absent or null params decode as the default value.
fn parse_params<T: DeserializeOwned + Default>(params: Option<Value>) -> Result<T, serde_json::Error> {
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value),
    }
}

fn respond<T: Serialize>(id: Value, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CallToolResult;
    use crate::tools::tool_handler;

    fn echo_tool(name: &str) -> ServerTool {
        ServerTool::new(
            Tool::new(name),
            tool_handler(|_ctx, req: CallToolRequest| async move {
                Ok(CallToolResult::text(req.name))
            }),
        )
    }

    async fn call(server: &McpServer, message: Value) -> Option<JsonRpcResponse> {
        server.handle_value(RequestContext::new(), message).await
    }

    #[tokio::test]
    async fn test_initialize_reports_server_info() {
        let server = McpServer::new("gw", "1.2.3").with_instructions("Query the warehouse");
        let response = call(
            &server,
            json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize",
                    "params": { "protocolVersion": "2024-11-05", "clientInfo": { "name": "t", "version": "0" } } }),
        )
        .await
        .unwrap();

        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"], json!({ "name": "gw", "version": "1.2.3" }));
        assert_eq!(result["instructions"], "Query the warehouse");
        assert_eq!(result["capabilities"]["tools"], json!({ "listChanged": true }));
        assert!(result["capabilities"].get("resources").is_none());
        assert!(server.is_initialized());
    }

    #[tokio::test]
    async fn test_capabilities_follow_builder() {
        let server = McpServer::new("gw", "1")
            .with_resource_capabilities(true, false)
            .with_prompt_capabilities(true)
            .with_logging();
        let caps = serde_json::to_value(server.capabilities()).unwrap();
        assert_eq!(caps["resources"], json!({ "subscribe": true }));
        assert_eq!(caps["prompts"], json!({ "listChanged": true }));
        assert_eq!(caps["logging"], json!({}));
    }

    #[tokio::test]
    async fn test_strict_handshake_rejects_before_initialize() {
        let server = McpServer::new("gw", "1").with_strict_handshake(true);
        server.add_tools(vec![echo_tool("a")]).unwrap();

        let early = call(&server, json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }))
            .await
            .unwrap();
        assert_eq!(early.error_code(), Some(INVALID_REQUEST));

        let ping = call(&server, json!({ "jsonrpc": "2.0", "id": 2, "method": "ping" }))
            .await
            .unwrap();
        assert_eq!(ping.result, Some(json!({})));

        call(&server, json!({ "jsonrpc": "2.0", "id": 3, "method": "initialize" })).await;
        let late = call(&server, json!({ "jsonrpc": "2.0", "id": 4, "method": "tools/list" }))
            .await
            .unwrap();
        assert!(!late.is_error());
    }

    #[tokio::test]
    async fn test_set_tools_replaces_registry() {
        let server = McpServer::new("gw", "1");
        server.add_tools(vec![echo_tool("a"), echo_tool("b")]).unwrap();
        server.set_tools(vec![echo_tool("c")]).unwrap();
        let names: Vec<_> = server.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["c"]);
    }

    #[tokio::test]
    async fn test_authorizers_must_all_pass() {
        let server = McpServer::new("gw", "1");
        assert!(server.is_authorized(&RequestContext::new()));

        server.add_authorizer(|ctx| ctx.header("authorization") == Some("Bearer ok"));
        assert!(!server.is_authorized(&RequestContext::new()));
        assert!(server.is_authorized(&RequestContext::new().with_header("Authorization", "Bearer ok")));
    }

    #[tokio::test]
    async fn test_notification_handler_runs_without_response() {
        let server = McpServer::new("gw", "1");
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        server.add_notification_handler("notifications/initialized", move |_ctx, n| {
            sink.lock().unwrap().push(n.method);
        });

        let response = call(
            &server,
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
        )
        .await;
        assert!(response.is_none());
        assert_eq!(*seen.lock().unwrap(), vec!["notifications/initialized"]);
    }
}
