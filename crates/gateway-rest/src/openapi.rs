//! OpenAPI 3.1 document for the configured endpoints.

use gateway_connectors::Connector;
use gateway_core::{ApiConfig, ColumnSchema, ColumnType, Endpoint, EndpointParam, RequestContext};
use serde_json::{json, Map, Value};

/// Everything the document is generated from.
pub struct DocumentSource<'a> {
    pub api: &'a ApiConfig,
    pub endpoints: &'a [Endpoint],
    pub prefix: &'a str,
    pub servers: &'a [String],
    pub raw_api: bool,
}

/// Build the document. Response schemas come from the connector's query
/// inference; endpoints it cannot describe get an empty object schema.
pub async fn document(source: &DocumentSource<'_>, connector: &dyn Connector) -> Value {
    let ctx = RequestContext::new();
    let mut paths = Map::new();

    for endpoint in source.endpoints {
        if endpoint.http_path.is_empty() {
            continue;
        }
        let columns = match connector.infer_query(&ctx, &endpoint.query).await {
            Ok(columns) => columns,
            Err(e) => {
                tracing::warn!(path = %endpoint.http_path, error = %e, "Unable to infer query");
                Vec::new()
            }
        };
        let item = paths
            .entry(format!("{}{}", source.prefix, endpoint.http_path))
            .or_insert_with(|| json!({}));
        if let Value::Object(item) = item {
            item.insert(
                endpoint.http_method.to_ascii_lowercase(),
                operation(endpoint, &columns),
            );
        }
    }

    if source.raw_api {
        add_raw_paths(&mut paths, source.prefix);
    }

    let servers: Vec<Value> = if source.servers.is_empty() {
        vec![json!({ "url": "http://localhost:9090", "description": "localhost" })]
    } else {
        source
            .servers
            .iter()
            .map(|url| json!({ "url": url, "description": server_description(url) }))
            .collect()
    };

    let description = if source.api.description.is_empty() {
        "Config that dynamically generates accessor for data"
    } else {
        source.api.description.as_str()
    };

    json!({
        "openapi": "3.1.0",
        "info": {
            "title": source.api.name,
            "description": description,
            "version": source.api.version,
        },
        "servers": servers,
        "paths": paths,
    })
}

fn server_description(url: &str) -> String {
    if url.starts_with("http://localhost") {
        "Local development server".to_string()
    } else if url.contains("dev") {
        "Development server".to_string()
    } else if url.contains("stage") {
        "Staging server".to_string()
    } else if url.contains("prod") {
        "Production server".to_string()
    } else {
        format!("Server {url}")
    }
}

fn operation(endpoint: &Endpoint, columns: &[ColumnSchema]) -> Value {
    let properties: Map<String, Value> = columns
        .iter()
        .map(|c| (c.name.clone(), column_schema(c.column_type)))
        .collect();
    let mut response = json!({ "type": "object", "properties": properties });
    if endpoint.is_array_result {
        response = json!({ "type": "array", "items": response });
    }
    let tag = if endpoint.group.is_empty() {
        "default"
    } else {
        endpoint.group.as_str()
    };

    let parameters: Vec<Value> = endpoint.params.iter().map(parameter).collect();

    json!({
        "summary": endpoint.summary,
        "description": endpoint.description,
        "operationId": endpoint.mcp_method,
        "tags": [tag],
        "parameters": parameters,
        "responses": {
            "200": {
                "description": "Success",
                "content": { "application/json": { "schema": response } }
            },
            "404": error_response("Not Found"),
            "500": error_response("Error"),
        }
    })
}

fn column_schema(column_type: ColumnType) -> Value {
    match column_type {
        ColumnType::Datetime => json!({ "type": "string", "format": "date-time" }),
        other => json!({ "type": other.json_schema_type() }),
    }
}

fn parameter(param: &EndpointParam) -> Value {
    let location = if param.location.is_empty() {
        "query"
    } else {
        param.location.as_str()
    };
    let mut schema = json!({ "type": param_schema_type(&param.param_type) });
    if let Some(format) = &param.format {
        schema["format"] = json!(format);
    }
    if let Some(default) = &param.default {
        schema["default"] = default.clone();
    }
    json!({
        "name": param.name,
        "in": location,
        "required": param.required || location == "path",
        "schema": schema,
    })
}

fn param_schema_type(declared: &str) -> &'static str {
    match declared.to_ascii_lowercase().as_str() {
        "integer" | "int" => "integer",
        "number" | "double" | "float" => "number",
        "bool" | "boolean" => "boolean",
        _ => "string",
    }
}

fn error_response(description: &str) -> Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "type": "object", "properties": { "error": { "type": "string" } } }
            }
        }
    })
}

fn add_raw_paths(paths: &mut Map<String, Value>, prefix: &str) {
    let raw = |summary: &str, params: Value| {
        json!({
            "get": {
                "summary": summary,
                "tags": ["raw"],
                "parameters": params,
                "responses": {
                    "200": { "description": "Success" },
                    "400": error_response("Bad Request"),
                    "500": error_response("Error"),
                }
            }
        })
    };
    let query_param = |description: &str| {
        json!([{ "name": "query", "in": "query", "required": true,
                 "description": description, "schema": { "type": "string" } }])
    };

    paths.insert(
        format!("{prefix}/raw/list_tables"),
        raw("List tables with columns and row counts", json!([])),
    );
    paths.insert(
        format!("{prefix}/raw/discover_data"),
        raw(
            "Describe tables with a data sample",
            json!([{ "name": "tables_list", "in": "query", "required": false,
                     "description": "Comma separated table names", "schema": { "type": "string" } }]),
        ),
    );
    paths.insert(
        format!("{prefix}/raw/prepare_query"),
        raw("Describe the columns of a query", query_param("Query to prepare")),
    );
    paths.insert(
        format!("{prefix}/raw/query"),
        raw("Run a raw query", query_param("Query to run")),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_defaults_to_query_location() {
        let param = EndpointParam {
            name: "limit".into(),
            param_type: "integer".into(),
            default: Some(json!(10)),
            ..Default::default()
        };
        assert_eq!(
            parameter(&param),
            json!({ "name": "limit", "in": "query", "required": false,
                    "schema": { "type": "integer", "default": 10 } })
        );
    }

    #[test]
    fn test_path_parameters_are_required() {
        let param = EndpointParam {
            name: "id".into(),
            param_type: "uuid".into(),
            location: "path".into(),
            ..Default::default()
        };
        let value = parameter(&param);
        assert_eq!(value["required"], true);
        assert_eq!(value["schema"]["type"], "string");
    }

    #[test]
    fn test_operation_wraps_array_results() {
        let endpoint = Endpoint {
            group: "users".into(),
            mcp_method: "list_users".into(),
            is_array_result: true,
            ..Default::default()
        };
        let op = operation(
            &endpoint,
            &[
                ColumnSchema::new("id", ColumnType::Integer),
                ColumnSchema::new("created_at", ColumnType::Datetime),
            ],
        );
        let schema = &op["responses"]["200"]["content"]["application/json"]["schema"];
        assert_eq!(schema["type"], "array");
        assert_eq!(schema["items"]["properties"]["created_at"]["format"], "date-time");
        assert_eq!(op["operationId"], "list_users");
        assert_eq!(op["tags"], json!(["users"]));
    }
}
