//! API key authorization.

use crate::capability::{PluginCapabilities, Swaggerer, Wrapper};
use async_trait::async_trait;
use gateway_connectors::{Connector, ConnectorConfig, ConnectorError};
use gateway_core::{ColumnSchema, Endpoint, Params, RequestContext, Row, Table};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

pub const DOC: &str = r#"
Rejects queries whose request does not carry a known API key.

api_keys:
  name: X-API-Key          # header carrying the key
  keys:
    - key: "${READER_KEY}"
      allowed_methods: [list_orders, get_order]   # empty means every tool
  keys_file: ./keys.yaml   # optional, a YAML/JSON list of keys

Queries are checked against the tool name. Table samples return rows, so
they need a key allowed to call `discover_data`. Table listing and query
inference only describe the schema and are not checked.
"#;

/// Tool name a key must allow to read table samples.
const SAMPLE_METHOD: &str = "discover_data";

const SECURITY_SCHEME: &str = "ApiKeyAuth";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeysConfig {
    /// Header carrying the key.
    #[serde(default = "default_header")]
    pub name: String,

    /// Where clients send the key. Reported in the OpenAPI document.
    #[serde(default = "default_location")]
    pub location: String,

    #[serde(default)]
    pub keys: Vec<ApiKey>,

    #[serde(default)]
    pub keys_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub key: String,

    /// Tool names this key may call. Empty means every tool.
    #[serde(default)]
    pub allowed_methods: Vec<String>,
}

impl ApiKey {
    pub fn allows(&self, method: &str) -> bool {
        self.allowed_methods.is_empty() || self.allowed_methods.iter().any(|m| m == method)
    }
}

fn default_header() -> String {
    "X-API-Key".to_string()
}

fn default_location() -> String {
    "header".to_string()
}

pub struct ApiKeysPlugin {
    header: String,
    location: String,
    keys: Arc<Vec<ApiKey>>,
}

impl ApiKeysPlugin {
    pub fn new(config: ApiKeysConfig) -> anyhow::Result<Self> {
        let mut keys = config.keys;
        if let Some(path) = &config.keys_file {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("unable to read keys file {}: {e}", path.display()))?;
            let extra: Vec<ApiKey> = serde_yaml::from_str(&raw)?;
            keys.extend(extra);
        }
        if keys.is_empty() {
            tracing::warn!("api_keys configured without any key; every query will be rejected");
        }
        Ok(Self {
            header: config.name,
            location: config.location,
            keys: Arc::new(keys),
        })
    }
}

pub fn build(config: ApiKeysConfig) -> anyhow::Result<PluginCapabilities> {
    let plugin = Arc::new(ApiKeysPlugin::new(config)?);
    Ok(PluginCapabilities::new(DOC)
        .with_wrapper(plugin.clone())
        .with_swaggerer(plugin))
}

impl Wrapper for ApiKeysPlugin {
    fn wrap(&self, inner: Arc<dyn Connector>) -> anyhow::Result<Arc<dyn Connector>> {
        Ok(Arc::new(ApiKeysConnector {
            inner,
            header: self.header.clone(),
            keys: self.keys.clone(),
        }))
    }
}

impl Swaggerer for ApiKeysPlugin {
    fn enrich(&self, mut doc: Value) -> Value {
        let Some(root) = doc.as_object_mut() else {
            return doc;
        };

        let schemes = root
            .entry("components")
            .or_insert_with(|| json!({}))
            .as_object_mut()
            .map(|components| {
                components
                    .entry("securitySchemes")
                    .or_insert_with(|| json!({}))
            });
        if let Some(Value::Object(schemes)) = schemes {
            schemes.insert(
                SECURITY_SCHEME.to_string(),
                json!({ "type": "apiKey", "in": self.location, "name": self.header }),
            );
        }

        if let Some(Value::Object(paths)) = root.get_mut("paths") {
            for item in paths.values_mut() {
                let Some(item) = item.as_object_mut() else {
                    continue;
                };
                for method in ["get", "post", "put", "patch", "delete"] {
                    if let Some(Value::Object(op)) = item.get_mut(method) {
                        op.insert("security".to_string(), json!([{ SECURITY_SCHEME: [] }]));
                    }
                }
            }
        }

        doc
    }
}

struct ApiKeysConnector {
    inner: Arc<dyn Connector>,
    header: String,
    keys: Arc<Vec<ApiKey>>,
}

impl ApiKeysConnector {
    fn authorize(&self, ctx: &RequestContext, method: &str) -> Result<(), ConnectorError> {
        let token = ctx
            .header(&self.header)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConnectorError::not_authorized("empty token"))?;

        let key = self
            .keys
            .iter()
            .find(|k| k.key == token)
            .ok_or_else(|| ConnectorError::not_authorized("unknown token"))?;

        if !key.allows(method) {
            return Err(ConnectorError::not_authorized(format!(
                "method: {method} is not authorized for this token"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for ApiKeysConnector {
    async fn ping(&self) -> Result<(), ConnectorError> {
        self.inner.ping().await
    }

    async fn query(
        &self,
        ctx: &RequestContext,
        endpoint: &Endpoint,
        params: &Params,
    ) -> Result<Vec<Row>, ConnectorError> {
        self.authorize(ctx, &endpoint.mcp_method)?;
        self.inner.query(ctx, endpoint, params).await
    }

    async fn discovery(
        &self,
        ctx: &RequestContext,
        table_filter: &[String],
    ) -> Result<Vec<Table>, ConnectorError> {
        self.inner.discovery(ctx, table_filter).await
    }

    async fn sample(&self, ctx: &RequestContext, table: &Table) -> Result<Vec<Row>, ConnectorError> {
        self.authorize(ctx, SAMPLE_METHOD)?;
        self.inner.sample(ctx, table).await
    }

    async fn infer_query(
        &self,
        ctx: &RequestContext,
        query: &str,
    ) -> Result<Vec<ColumnSchema>, ConnectorError> {
        self.inner.infer_query(ctx, query).await
    }

    fn config(&self) -> ConnectorConfig {
        self.inner.config()
    }
}
