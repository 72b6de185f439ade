//! Gateway tools: every configured endpoint becomes an MCP tool backed by
//! the (plugin-wrapped) connector, plus optional raw exploration tools.

use crate::error::McpError;
use crate::http_transport::{mcp_routes, SseServer, SseState};
use crate::prompt::{columns_yaml, table_yaml, tables_prompt, yamlify};
use crate::protocol::{CallToolRequest, CallToolResult, Content, Tool};
use crate::server::McpServer;
use crate::stdio::StdioServer;
use crate::tools::{tool_handler, ServerTool};
use axum::Router;
use gateway_connectors::{Connector, ConnectorRegistry};
use gateway_core::{Endpoint, EndpointParam, GatewayConfig, RequestContext};
use gateway_plugins::{InterceptorChain, PluginRegistry, PluginSet};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, PoisonError};

pub const LIST_TABLES: &str = "list_tables";
pub const DISCOVER_DATA: &str = "discover_data";
pub const PREPARE_QUERY: &str = "prepare_query";
pub const QUERY: &str = "query";

/// MCP face of the data gateway.
pub struct GatewayMcp {
    server: Arc<McpServer>,
    connector: Arc<dyn Connector>,
    plugins: PluginSet,
    interceptors: Arc<InterceptorChain>,
    endpoint_tools: Mutex<Vec<String>>,
}

impl GatewayMcp {
    /// Assemble the gateway from a config document: build the connector,
    /// resolve plugins in declared order, wrap, then register endpoint tools.
    pub fn new(
        config: &GatewayConfig,
        connectors: &ConnectorRegistry,
        plugins: &PluginRegistry,
    ) -> Result<Self, McpError> {
        let connector = connectors.build(&config.database.kind, config.database.connection.clone())?;
        let plugin_set = PluginSet::resolve(plugins, config.plugins.entries())?;
        Self::from_config(config, connector, plugin_set)
    }

    /// Assemble from a config document and an already-built connector.
    pub fn from_config(
        config: &GatewayConfig,
        connector: Arc<dyn Connector>,
        plugin_set: PluginSet,
    ) -> Result<Self, McpError> {
        let server = Arc::new(McpServer::from_settings(&config.mcp));
        let gateway = Self::from_parts(server, connector, plugin_set)?;
        gateway.set_endpoints(&config.database.endpoints)?;
        if config.mcp.raw_tools {
            gateway.enable_raw_tools()?;
        }
        tracing::info!(
            connector = %config.database.kind,
            plugins = ?gateway.plugins.tags(),
            tools = gateway.server.list_tools().len(),
            "MCP gateway ready"
        );
        Ok(gateway)
    }

    /// Assemble from already-built parts. Wrappers are applied here.
    pub fn from_parts(
        server: Arc<McpServer>,
        connector: Arc<dyn Connector>,
        plugins: PluginSet,
    ) -> Result<Self, McpError> {
        let connector = plugins.wrap(connector)?;
        let interceptors = Arc::new(plugins.interceptors());
        Ok(Self {
            server,
            connector,
            plugins,
            interceptors,
            endpoint_tools: Mutex::new(Vec::new()),
        })
    }

    pub fn server(&self) -> Arc<McpServer> {
        Arc::clone(&self.server)
    }

    /// The connector after every wrapper has been applied.
    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::clone(&self.connector)
    }

    pub fn plugins(&self) -> &PluginSet {
        &self.plugins
    }

    /// Replace the endpoint tools. Raw tools and tools registered by other
    /// code are left alone unless a new endpoint reuses their name.
    pub fn set_endpoints(&self, endpoints: &[Endpoint]) -> Result<(), McpError> {
        let tools: Vec<ServerTool> = endpoints
            .iter()
            .filter(|e| !e.mcp_method.is_empty())
            .map(|e| self.endpoint_tool(e.clone()))
            .collect();
        let names: Vec<String> = tools.iter().map(|t| t.tool.name.clone()).collect();

        let mut registered = self
            .endpoint_tools
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut stale: Vec<String> = registered
            .iter()
            .filter(|name| !names.contains(name))
            .cloned()
            .collect();
        stale.extend(names.iter().cloned());

        // Notification failures are logged by the server and never undo
        // the registration.
        if let Err(e) = self.server.delete_tools(&stale) {
            if !e.is_notification_failure() {
                return Err(e);
            }
        }
        *registered = names;
        match self.server.add_tools(tools) {
            Err(e) if !e.is_notification_failure() => Err(e),
            _ => Ok(()),
        }
    }

    fn endpoint_tool(&self, endpoint: Endpoint) -> ServerTool {
        let tool = endpoint_tool_definition(&endpoint);
        let connector = Arc::clone(&self.connector);
        let interceptors = Arc::clone(&self.interceptors);
        let endpoint = Arc::new(endpoint);

        ServerTool::new(
            tool,
            tool_handler(move |ctx: RequestContext, request: CallToolRequest| {
                call_endpoint(
                    Arc::clone(&connector),
                    Arc::clone(&interceptors),
                    Arc::clone(&endpoint),
                    ctx,
                    request,
                )
            }),
        )
    }

    /// Register `list_tables`, `discover_data`, `prepare_query` and `query`.
    pub fn enable_raw_tools(&self) -> Result<(), McpError> {
        let tools = vec![
            self.list_tables_tool(),
            self.discover_data_tool(),
            self.prepare_query_tool(),
            self.query_tool(),
        ];
        let names: Vec<String> = tools.iter().map(|t| t.tool.name.clone()).collect();
        for result in [self.server.delete_tools(&names), self.server.add_tools(tools)] {
            if let Err(e) = result {
                if !e.is_notification_failure() {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn list_tables_tool(&self) -> ServerTool {
        let connector = Arc::clone(&self.connector);
        ServerTool::new(
            Tool::new(LIST_TABLES)
                .with_description("List all tables in the database with their columns and row counts"),
            tool_handler(move |ctx: RequestContext, _request: CallToolRequest| {
                let connector = Arc::clone(&connector);
                async move {
                    let tables = connector.discovery(&ctx, &[]).await?;
                    let config = connector.config();
                    let schema = config.schema.as_str().unwrap_or_default();
                    let mut content = vec![Content::text(format!("Found {} records-(s).", tables.len()))];
                    content.extend(tables.iter().map(|t| Content::text(table_yaml(t, schema))));
                    Ok::<_, anyhow::Error>(CallToolResult::new(content))
                }
            }),
        )
    }

    fn discover_data_tool(&self) -> ServerTool {
        let connector = Arc::clone(&self.connector);
        ServerTool::new(
            Tool::new(DISCOVER_DATA)
                .with_description(
                    "Describe tables: column schema, a data sample and an estimated row count",
                )
                .with_property(
                    "tables_list",
                    json!({
                        "type": "string",
                        "description": "Comma separated table names. Empty means every table.",
                    }),
                    false,
                ),
            tool_handler(move |ctx: RequestContext, request: CallToolRequest| {
                let connector = Arc::clone(&connector);
                async move {
                    let filter = split_table_list(request.arguments.get("tables_list"));
                    let tables = connector.discovery(&ctx, &filter).await?;
                    let mut described = Vec::with_capacity(tables.len());
                    for table in tables {
                        let sample = connector.sample(&ctx, &table).await?;
                        described.push((table, sample));
                    }
                    let config = connector.config();
                    let schema = config.schema.as_str().unwrap_or_default();

                    let mut content = vec![
                        Content::text(format!("Found a {} tables-(s).", described.len())),
                        Content::text(tables_prompt(&described, schema)),
                    ];
                    if !config.extra_prompt.is_empty() {
                        content.push(Content::text(config.extra_prompt));
                    }
                    Ok::<_, anyhow::Error>(CallToolResult::new(content))
                }
            }),
        )
    }

    fn prepare_query_tool(&self) -> ServerTool {
        let connector = Arc::clone(&self.connector);
        ServerTool::new(
            Tool::new(PREPARE_QUERY)
                .with_description("Validate a query and describe the columns it returns")
                .with_property(
                    "query",
                    json!({ "type": "string", "description": "Query to prepare" }),
                    true,
                ),
            tool_handler(move |ctx: RequestContext, request: CallToolRequest| {
                let connector = Arc::clone(&connector);
                async move {
                    let query = required_string(&request, "query")?;
                    let columns = connector.infer_query(&ctx, &query).await?;
                    Ok::<_, anyhow::Error>(CallToolResult::new(vec![
                        Content::text(format!("Query has a {} column-(s).", columns.len())),
                        Content::text(columns_yaml(&columns)),
                    ]))
                }
            }),
        )
    }

    fn query_tool(&self) -> ServerTool {
        let connector = Arc::clone(&self.connector);
        let interceptors = Arc::clone(&self.interceptors);
        ServerTool::new(
            Tool::new(QUERY)
                .with_description("Run a raw query and return its rows")
                .with_property(
                    "query",
                    json!({ "type": "string", "description": "Query to run" }),
                    true,
                ),
            tool_handler(move |ctx: RequestContext, request: CallToolRequest| {
                let connector = Arc::clone(&connector);
                let interceptors = Arc::clone(&interceptors);
                async move {
                    let query = required_string(&request, "query")?;
                    let endpoint = Endpoint::raw(query);
                    let rows = connector.query(&ctx, &endpoint, &Default::default()).await?;
                    let rows = interceptors.apply(rows, &ctx);
                    let mut content = Vec::with_capacity(rows.len() + 1);
                    content.push(Content::text(format!("Found {} records-(s).", rows.len())));
                    content.extend(rows.iter().map(|row| Content::text(yamlify(row))));
                    Ok::<_, anyhow::Error>(CallToolResult::new(content))
                }
            }),
        )
    }

    /// SSE transport over this gateway's server.
    pub fn sse(&self, addr: impl Into<String>, prefix: impl Into<String>) -> SseServer {
        SseServer::new(self.server(), addr, prefix)
    }

    /// The MCP HTTP routes without `/health`, for mounting into another
    /// router on the same listener.
    pub fn routes(&self, prefix: impl Into<String>) -> Router {
        mcp_routes(Arc::new(SseState::new(self.server(), prefix)))
    }

    /// Stdio transport over this gateway's server.
    pub fn stdio(&self) -> StdioServer {
        StdioServer::new(self.server())
    }
}

/// Run an endpoint tool. Query failures are reported to the agent as an
/// error result, not as a protocol error.
async fn call_endpoint(
    connector: Arc<dyn Connector>,
    interceptors: Arc<InterceptorChain>,
    endpoint: Arc<Endpoint>,
    ctx: RequestContext,
    request: CallToolRequest,
) -> anyhow::Result<CallToolResult> {
    let mut params = request.arguments;
    endpoint.fill_missing_params(&mut params);

    let rows = match connector.query(&ctx, &endpoint, &params).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(tool = %endpoint.mcp_method, error = %e, "Endpoint query failed");
            return Ok(CallToolResult::error(format!("Unable to query: {e}")));
        }
    };
    let rows = interceptors.apply(rows, &ctx);

    let mut content = Vec::with_capacity(rows.len() + 1);
    content.push(Content::text(format!(
        "Found a {} row-(s) in {}.",
        rows.len(),
        endpoint.group
    )));
    for row in &rows {
        content.push(Content::text(serde_json::to_string(row)?));
    }
    Ok(CallToolResult::new(content))
}

/// JSON Schema `type` for a declared endpoint parameter.
fn json_type(param: &EndpointParam) -> &'static str {
    match param.param_type.to_ascii_lowercase().as_str() {
        "integer" | "number" | "double" | "float" => "number",
        "bool" | "boolean" => "boolean",
        _ => "string",
    }
}

/// Tool definition for an endpoint: one property per declared parameter.
pub fn endpoint_tool_definition(endpoint: &Endpoint) -> Tool {
    let description = if endpoint.description.is_empty() {
        &endpoint.summary
    } else {
        &endpoint.description
    };
    let mut tool = Tool::new(&endpoint.mcp_method);
    if !description.is_empty() {
        tool = tool.with_description(description);
    }
    endpoint.params.iter().fold(tool, |tool, param| {
        let mut schema = json!({
            "type": json_type(param),
            "title": format!("Column {}", param.name),
        });
        if let Some(default) = &param.default {
            schema["default"] = default.clone();
        }
        tool.with_property(&param.name, schema, param.required)
    })
}

fn split_table_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_str)
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn required_string(request: &CallToolRequest, name: &str) -> anyhow::Result<String> {
    match request.arguments.get(name) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        _ => anyhow::bail!("{name} argument is required"),
    }
}
