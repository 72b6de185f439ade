//! Request handlers.

use crate::error::RestError;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use gateway_connectors::{Connector, ConnectorError};
use gateway_core::{Endpoint, Params, RequestContext, Table};
use gateway_plugins::InterceptorChain;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// State shared by every route.
pub struct RestState {
    pub connector: Arc<dyn Connector>,
    pub interceptors: InterceptorChain,
    pub query_timeout: Duration,
}

impl RestState {
    /// Run a connector call under the query timeout.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ConnectorError>>,
    ) -> Result<T, RestError> {
        match tokio::time::timeout(self.query_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(RestError::Timeout(self.query_timeout)),
        }
    }

    /// Schema name used to qualify table names, if the connector has one.
    fn schema_name(&self) -> Option<String> {
        self.connector
            .config()
            .schema
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

pub(crate) fn request_context(headers: &HeaderMap) -> RequestContext {
    RequestContext::new().with_headers(
        headers
            .iter()
            .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?))),
    )
}

/// Path params first, then query params. A query key given more than once
/// becomes an array.
pub(crate) fn collect_params(
    path: HashMap<String, String>,
    query: Vec<(String, String)>,
) -> Params {
    let mut params: Params = path
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();

    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in query {
        grouped.entry(key).or_default().push(value);
    }
    for (key, mut values) in grouped {
        let value = if values.len() == 1 {
            Value::String(values.remove(0))
        } else {
            Value::Array(values.into_iter().map(Value::String).collect())
        };
        params.insert(key, value);
    }
    params
}

/// Answer one endpoint call.
pub(crate) async fn serve_endpoint(
    state: Arc<RestState>,
    endpoint: Arc<Endpoint>,
    path: HashMap<String, String>,
    query: Vec<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, RestError> {
    let ctx = request_context(&headers);
    let mut params = collect_params(path, query);
    endpoint.fill_missing_params(&mut params);

    let rows = state
        .bounded(state.connector.query(&ctx, &endpoint, &params))
        .await?;
    let mut rows = state.interceptors.apply(rows, &ctx);

    if !endpoint.is_array_result {
        if rows.is_empty() {
            return Err(RestError::NotFound);
        }
        return Ok(Json(Value::Object(rows.swap_remove(0))));
    }
    Ok(Json(Value::Array(rows.into_iter().map(Value::Object).collect())))
}

/// Query string of the raw routes.
#[derive(Debug, Default, Deserialize)]
pub struct RawQuery {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub tables_list: Option<String>,
}

impl RawQuery {
    fn required_query(&self) -> Result<&str, RestError> {
        self.query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| RestError::BadRequest("query parameter is required".to_string()))
    }
}

fn columns_json(table: &Table) -> Vec<Value> {
    table
        .columns
        .iter()
        .map(|c| json!({ "name": c.name, "type": c.column_type }))
        .collect()
}

/// GET {prefix}/raw/list_tables
pub(crate) async fn list_tables(
    State(state): State<Arc<RestState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, RestError> {
    let ctx = request_context(&headers);
    let tables = state.bounded(state.connector.discovery(&ctx, &[])).await?;
    let schema = state.schema_name();

    let result: Vec<Value> = tables
        .iter()
        .map(|table| {
            let name = match &schema {
                Some(schema) if !table.name.contains('.') => format!("{schema}.{}", table.name),
                _ => table.name.clone(),
            };
            json!({ "name": name, "columns": columns_json(table), "row_count": table.row_count })
        })
        .collect();
    Ok(Json(Value::Array(result)))
}

/// GET {prefix}/raw/discover_data?tables_list=a,b
pub(crate) async fn discover_data(
    State(state): State<Arc<RestState>>,
    Query(raw): Query<RawQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, RestError> {
    let ctx = request_context(&headers);
    let filter: Vec<String> = raw
        .tables_list
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    let tables = state.bounded(state.connector.discovery(&ctx, &filter)).await?;
    let mut result = Vec::with_capacity(tables.len());
    for table in &tables {
        let sample = state.bounded(state.connector.sample(&ctx, table)).await?;
        let sample = state.interceptors.apply(sample, &ctx);
        result.push(json!({
            "name": table.name,
            "columns": columns_json(table),
            "sample": sample,
            "row_count": table.row_count,
        }));
    }
    Ok(Json(Value::Array(result)))
}

/// GET {prefix}/raw/prepare_query?query=...
pub(crate) async fn prepare_query(
    State(state): State<Arc<RestState>>,
    Query(raw): Query<RawQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, RestError> {
    let query = raw.required_query()?;
    let ctx = request_context(&headers);
    let columns = state.bounded(state.connector.infer_query(&ctx, query)).await?;
    Ok(Json(
        columns
            .iter()
            .map(|c| json!({ "name": c.name, "type": c.column_type }))
            .collect(),
    ))
}

/// GET {prefix}/raw/query?query=...
pub(crate) async fn raw_query(
    State(state): State<Arc<RestState>>,
    Query(raw): Query<RawQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, RestError> {
    let endpoint = Endpoint::raw(raw.required_query()?);
    let ctx = request_context(&headers);
    let rows = state
        .bounded(state.connector.query(&ctx, &endpoint, &Params::new()))
        .await?;
    let rows = state.interceptors.apply(rows, &ctx);
    Ok(Json(Value::Array(rows.into_iter().map(Value::Object).collect())))
}

/// Handle health check requests.
pub(crate) async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "gateway-rest",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
