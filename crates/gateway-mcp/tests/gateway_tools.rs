//! Endpoint and raw tools over an in-memory connector.

use async_trait::async_trait;
use gateway_connectors::{Connector, ConnectorConfig, ConnectorError, ConnectorRegistry};
use gateway_core::{
    ColumnSchema, ColumnType, Endpoint, GatewayConfig, Params, RequestContext, Row, Table,
};
use gateway_mcp::protocol::INTERNAL_ERROR;
use gateway_mcp::{GatewayMcp, McpError};
use gateway_plugins::PluginRegistry;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Serves a fixed `users` table and records the params of the last query.
#[derive(Default)]
struct MemoryConnector {
    last_params: Mutex<Option<Params>>,
}

fn users() -> Vec<Row> {
    json!([
        { "id": 1, "name": "Ada", "email": "ada@example.com" },
        { "id": 2, "name": "Linus", "email": "linus@example.com" }
    ])
    .as_array()
    .unwrap()
    .iter()
    .map(|r| r.as_object().cloned().unwrap())
    .collect()
}

fn users_table() -> Table {
    let mut id = ColumnSchema::new("id", ColumnType::Integer);
    id.primary_key = true;
    Table {
        name: "users".into(),
        columns: vec![
            id,
            ColumnSchema::new("name", ColumnType::String),
            ColumnSchema::new("email", ColumnType::String),
        ],
        row_count: 2,
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn ping(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn query(
        &self,
        _ctx: &RequestContext,
        endpoint: &Endpoint,
        params: &Params,
    ) -> Result<Vec<Row>, ConnectorError> {
        *self.last_params.lock().unwrap() = Some(params.clone());
        if endpoint.query.contains("broken") {
            return Err(ConnectorError::Unsupported("broken table".into()));
        }
        Ok(users())
    }

    async fn discovery(
        &self,
        _ctx: &RequestContext,
        table_filter: &[String],
    ) -> Result<Vec<Table>, ConnectorError> {
        let table = users_table();
        if table_filter.is_empty() || table_filter.contains(&table.name) {
            Ok(vec![table])
        } else {
            Ok(Vec::new())
        }
    }

    async fn sample(&self, _ctx: &RequestContext, _table: &Table) -> Result<Vec<Row>, ConnectorError> {
        Ok(users())
    }

    async fn infer_query(
        &self,
        _ctx: &RequestContext,
        _query: &str,
    ) -> Result<Vec<ColumnSchema>, ConnectorError> {
        Ok(users_table().columns)
    }

    fn config(&self) -> ConnectorConfig {
        ConnectorConfig {
            type_name: "memory".into(),
            readonly: true,
            schema: json!("public"),
            ..Default::default()
        }
    }
}

const CONFIG: &str = r#"
api:
  name: Users
database:
  type: memory
  connection: {}
  endpoints:
    - group: users
      http_method: GET
      http_path: /users
      mcp_method: list_users
      summary: List users by status
      query: SELECT * FROM users WHERE status = :status
      is_array_result: true
      params:
        - name: status
          type: string
          location: query
          required: true
        - name: limit
          type: integer
          location: query
    - group: broken
      http_method: GET
      http_path: /broken
      mcp_method: broken_tool
      query: SELECT * FROM broken
plugins:
  column_mask:
    columns: [email]
mcp:
  name: users-gateway
  raw_tools: true
"#;

fn build(config: &str) -> (GatewayMcp, Arc<MemoryConnector>) {
    let connector = Arc::new(MemoryConnector::default());
    let mut connectors = ConnectorRegistry::new();
    let shared = Arc::clone(&connector);
    connectors.register("memory", "in-memory test data", move |_config| {
        Ok(Arc::clone(&shared) as Arc<dyn Connector>)
    });

    let config = GatewayConfig::from_yaml(config).unwrap();
    let gateway = GatewayMcp::new(&config, &connectors, &PluginRegistry::with_builtins()).unwrap();
    (gateway, connector)
}

async fn call(gateway: &GatewayMcp, name: &str, arguments: Value) -> Value {
    let response = gateway
        .server()
        .handle_value(
            RequestContext::new(),
            json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/call",
                    "params": { "name": name, "arguments": arguments } }),
        )
        .await
        .unwrap();
    serde_json::to_value(response).unwrap()
}

fn texts(response: &Value) -> Vec<String> {
    response["result"]["content"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["text"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_endpoint_tool_masks_rows_and_fills_params() {
    let (gateway, connector) = build(CONFIG);

    let response = call(&gateway, "list_users", json!({ "status": "active" })).await;
    let texts = texts(&response);

    assert_eq!(texts[0], "Found a 2 row-(s) in users.");
    let first: Value = serde_json::from_str(&texts[1]).unwrap();
    assert_eq!(first["name"], "Ada");
    assert_eq!(first["email"], "[REDACTED]");

    let params = connector.last_params.lock().unwrap().clone().unwrap();
    assert_eq!(params.get("status"), Some(&json!("active")));
    assert_eq!(params.get("limit"), Some(&Value::Null));
}

#[tokio::test]
async fn test_endpoint_query_failure_is_error_result() {
    let (gateway, _) = build(CONFIG);

    let response = call(&gateway, "broken_tool", json!({})).await;
    assert_eq!(response["result"]["isError"], true);
    assert_eq!(
        texts(&response)[0],
        "Unable to query: unsupported operation: broken table"
    );
}

#[tokio::test]
async fn test_tool_list_includes_raw_tools() {
    let (gateway, _) = build(CONFIG);
    let names: Vec<String> = gateway
        .server()
        .list_tools()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(
        names,
        vec!["broken_tool", "discover_data", "list_tables", "list_users", "prepare_query", "query"]
    );

    let list_users = gateway
        .server()
        .list_tools()
        .into_iter()
        .find(|t| t.name == "list_users")
        .unwrap();
    assert_eq!(list_users.input_schema.required, vec!["status"]);
    assert_eq!(list_users.input_schema.properties["limit"]["type"], "number");
}

#[tokio::test]
async fn test_set_endpoints_replaces_endpoint_tools_only() {
    let (gateway, _) = build(CONFIG);
    gateway
        .set_endpoints(&[Endpoint {
            group: "users".into(),
            mcp_method: "count_users".into(),
            query: "SELECT count(*) FROM users".into(),
            ..Default::default()
        }])
        .unwrap();

    let server = gateway.server();
    assert!(server.has_tool("count_users"));
    assert!(!server.has_tool("list_users"));
    assert!(!server.has_tool("broken_tool"));
    assert!(server.has_tool("query"));
}

#[tokio::test]
async fn test_raw_tools() {
    let (gateway, _) = build(CONFIG);

    let tables = texts(&call(&gateway, "list_tables", json!({})).await);
    assert_eq!(tables[0], "Found 1 records-(s).");
    assert_eq!(tables.len(), 2);
    assert!(tables[1].contains("name: public.users"), "{}", tables[1]);
    assert!(tables[1].contains("row_count: 2"));
    assert!(tables[1].contains("- name: email"));

    let discovered = texts(&call(&gateway, "discover_data", json!({ "tables_list": "users" })).await);
    assert_eq!(discovered[0], "Found a 1 tables-(s).");
    assert!(discovered[1].contains("<public.users number_columns=3 number_rows=2>"));

    let prepared = texts(&call(&gateway, "prepare_query", json!({ "query": "SELECT 1" })).await);
    assert_eq!(prepared[0], "Query has a 3 column-(s).");

    let rows = texts(&call(&gateway, "query", json!({ "query": "SELECT * FROM users" })).await);
    assert_eq!(rows[0], "Found 2 records-(s).");
    assert_eq!(rows.len(), 3);
    assert!(rows[1].contains("name: Ada") && rows[1].contains("[REDACTED]"));
    assert!(rows[2].contains("name: Linus") && !rows[2].contains("Ada"));

    let missing = call(&gateway, "query", json!({})).await;
    assert_eq!(missing["error"]["code"], INTERNAL_ERROR);
}

#[test]
fn test_unknown_connector_fails_fast() {
    let config = GatewayConfig::from_yaml("database:\n  type: nope\n").unwrap();
    let err = GatewayMcp::new(
        &config,
        &ConnectorRegistry::with_builtins(),
        &PluginRegistry::with_builtins(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, McpError::Registry(_)));
    assert_eq!(err.to_string(), "connector: nope not found");
}
