//! Data model shared by connectors, plugins and transports.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One result row: column name to JSON value.
pub type Row = serde_json::Map<String, Value>;

/// Query parameters keyed by parameter name.
pub type Params = serde_json::Map<String, Value>;

/// Logical column type reported by discovery and query inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    #[serde(rename = "date-time")]
    Datetime,
    Number,
    Integer,
    Boolean,
    Null,
    Object,
    Array,
}

impl ColumnType {
    /// The JSON Schema type name used when this column becomes a tool argument.
    pub fn json_schema_type(&self) -> &'static str {
        match self {
            ColumnType::Datetime => "string",
            ColumnType::String => "string",
            ColumnType::Number => "number",
            ColumnType::Integer => "integer",
            ColumnType::Boolean => "boolean",
            ColumnType::Null => "null",
            ColumnType::Object => "object",
            ColumnType::Array => "array",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ColumnType::String => "string",
            ColumnType::Datetime => "date-time",
            ColumnType::Number => "number",
            ColumnType::Integer => "integer",
            ColumnType::Boolean => "boolean",
            ColumnType::Null => "null",
            ColumnType::Object => "object",
            ColumnType::Array => "array",
        };
        f.write_str(s)
    }
}

/// Column description produced by discovery or query inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub primary_key: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pii: bool,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            pii: false,
        }
    }
}

/// A table found by discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub row_count: i64,
}

/// A declared, parameterized query exposed as an HTTP route and/or a tool.
///
/// Endpoints are immutable once loaded from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Logical group (usually the table the endpoint reads).
    #[serde(default)]
    pub group: String,

    /// HTTP method of the REST route ("GET", "POST", ...).
    #[serde(default)]
    pub http_method: String,

    /// REST path with `{name}` placeholders.
    #[serde(default, alias = "path")]
    pub http_path: String,

    /// Tool name exposed over MCP.
    #[serde(default)]
    pub mcp_method: String,

    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub description: String,

    /// Query text with `:name` parameter placeholders.
    #[serde(default)]
    pub query: String,

    /// Whether the REST route returns the whole row set or only the first row.
    #[serde(default)]
    pub is_array_result: bool,

    #[serde(default)]
    pub params: Vec<EndpointParam>,
}

impl Endpoint {
    /// An ad-hoc endpoint wrapping a raw query, used by the raw query tools.
    pub fn raw(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            is_array_result: true,
            ..Default::default()
        }
    }

    /// Insert `null` for every declared parameter the caller did not supply.
    pub fn fill_missing_params(&self, params: &mut Params) {
        for param in &self.params {
            params.entry(param.name.clone()).or_insert(Value::Null);
        }
    }
}

/// A declared endpoint parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointParam {
    pub name: String,

    /// Declared type: "string", "integer", "number", "boolean", ...
    #[serde(default, rename = "type")]
    pub param_type: String,

    /// Where the REST adapter reads it from: "path", "query" or "body".
    #[serde(default)]
    pub location: String,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_column_type_serialization() {
        assert_eq!(
            serde_json::to_value(ColumnType::Datetime).unwrap(),
            json!("date-time")
        );
        let parsed: ColumnType = serde_json::from_value(json!("integer")).unwrap();
        assert_eq!(parsed, ColumnType::Integer);
        assert!(serde_json::from_value::<ColumnType>(json!("varchar")).is_err());
    }

    #[test]
    fn test_fill_missing_params() {
        let endpoint = Endpoint {
            params: vec![
                EndpointParam {
                    name: "id".to_string(),
                    ..Default::default()
                },
                EndpointParam {
                    name: "limit".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let mut params = Params::new();
        params.insert("id".to_string(), json!(7));
        endpoint.fill_missing_params(&mut params);

        assert_eq!(params.get("id"), Some(&json!(7)));
        assert_eq!(params.get("limit"), Some(&Value::Null));
    }

    #[test]
    fn test_endpoint_path_alias() {
        let endpoint: Endpoint = serde_json::from_value(json!({
            "path": "/users/{id}",
            "mcp_method": "get_user"
        }))
        .unwrap();
        assert_eq!(endpoint.http_path, "/users/{id}");
    }
}
