//! Query result cache.

use crate::capability::{PluginCapabilities, Wrapper};
use async_trait::async_trait;
use gateway_connectors::{Connector, ConnectorConfig, ConnectorError};
use gateway_core::{ColumnSchema, Endpoint, Params, RequestContext, Row, Table};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const DOC: &str = r#"
LRU-based query cache.

Holds a fixed number of query results and evicts the least recently used one
when full. Entries older than the ttl are never served.

Results are cached per caller: the key covers the request claims and the
request headers. By default every header except transport noise (accept,
content-length, user-agent, ...) is part of the key. List `vary_headers` to
key on those headers only; the header carrying credentials must be among them.

lru_cache:
  max_size: 1000
  ttl: "5m"
  vary_headers: [authorization, x-api-key]   # optional
"#;

/// Headers that never identify a caller.
const TRANSPORT_HEADERS: &[&str] = &[
    "accept",
    "accept-encoding",
    "accept-language",
    "cache-control",
    "connection",
    "content-length",
    "content-type",
    "host",
    "mcp-session-id",
    "origin",
    "pragma",
    "referer",
    "user-agent",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LruCacheConfig {
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Entry lifetime, e.g. "30s", "5m", "1h".
    #[serde(default = "default_ttl")]
    pub ttl: String,

    /// Headers that identify the caller. Unset means every non-transport header.
    #[serde(default)]
    pub vary_headers: Option<Vec<String>>,
}

fn default_max_size() -> usize {
    1000
}

fn default_ttl() -> String {
    "5m".to_string()
}

pub fn build(config: LruCacheConfig) -> anyhow::Result<PluginCapabilities> {
    let ttl = humantime::parse_duration(&config.ttl)
        .map_err(|e| anyhow::anyhow!("invalid ttl {:?}: {e}", config.ttl))?;
    let max_size = NonZeroUsize::new(config.max_size)
        .ok_or_else(|| anyhow::anyhow!("max_size must be greater than zero"))?;
    let vary = config.vary_headers.map(|headers| {
        headers
            .into_iter()
            .map(|h| h.to_ascii_lowercase())
            .collect()
    });
    Ok(PluginCapabilities::new(DOC).with_wrapper(Arc::new(LruCachePlugin {
        max_size,
        ttl,
        vary,
    })))
}

pub struct LruCachePlugin {
    max_size: NonZeroUsize,
    ttl: Duration,
    vary: Option<Vec<String>>,
}

impl Wrapper for LruCachePlugin {
    fn wrap(&self, inner: Arc<dyn Connector>) -> anyhow::Result<Arc<dyn Connector>> {
        Ok(Arc::new(CachingConnector {
            inner,
            cache: ResultCache::new(self.max_size, self.ttl),
            vary: self.vary.clone(),
        }))
    }
}

/// Bounded, expiring, least-recently-used map of query results.
pub struct ResultCache {
    ttl: Duration,
    entries: Mutex<LruCache<String, CacheEntry>>,
}

struct CacheEntry {
    rows: Vec<Row>,
    inserted: Instant,
}

impl ResultCache {
    pub fn new(max_size: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(LruCache::new(max_size)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<Vec<Row>> {
        let mut entries = self.lock();
        let fresh = match entries.get(key) {
            None => return None,
            Some(entry) if entry.inserted.elapsed() < self.ttl => Some(entry.rows.clone()),
            Some(_) => None,
        };
        if fresh.is_none() {
            entries.pop(key);
        }
        fresh
    }

    pub fn insert(&self, key: String, rows: Vec<Row>) {
        self.lock().put(
            key,
            CacheEntry {
                rows,
                inserted: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache key: the tool name (or the query text for raw queries), the
/// parameters sorted by name, then the caller's identity.
pub fn cache_key(
    endpoint: &Endpoint,
    params: &Params,
    ctx: &RequestContext,
    vary: Option<&[String]>,
) -> String {
    let mut names: Vec<&String> = params.keys().collect();
    names.sort();
    let rendered: Vec<String> = names
        .into_iter()
        .map(|name| format!("{name}={}", params[name]))
        .collect();
    let scope = if endpoint.mcp_method.is_empty() {
        endpoint.query.as_str()
    } else {
        endpoint.mcp_method.as_str()
    };
    format!("{scope}/{}#{}", rendered.join("&"), caller_identity(ctx, vary))
}

fn caller_identity(ctx: &RequestContext, vary: Option<&[String]>) -> String {
    let mut headers: Vec<(&String, &Vec<String>)> = ctx
        .headers()
        .iter()
        .filter(|(name, _)| match vary {
            Some(vary) => vary.contains(name),
            None => !TRANSPORT_HEADERS.contains(&name.as_str()),
        })
        .collect();
    headers.sort();

    let mut identity: Vec<String> = headers
        .into_iter()
        .map(|(name, values)| format!("{name}:{}", values.join(",")))
        .collect();
    let mut claims: Vec<(&String, &Value)> = ctx.claims().iter().collect();
    claims.sort_by(|a, b| a.0.cmp(b.0));
    identity.extend(claims.into_iter().map(|(name, value)| format!("{name}={value}")));
    identity.join(";")
}

struct CachingConnector {
    inner: Arc<dyn Connector>,
    cache: ResultCache,
    vary: Option<Vec<String>>,
}

#[async_trait]
impl Connector for CachingConnector {
    async fn ping(&self) -> Result<(), ConnectorError> {
        self.inner.ping().await
    }

    async fn query(
        &self,
        ctx: &RequestContext,
        endpoint: &Endpoint,
        params: &Params,
    ) -> Result<Vec<Row>, ConnectorError> {
        let key = cache_key(endpoint, params, ctx, self.vary.as_deref());
        if let Some(rows) = self.cache.get(&key) {
            tracing::debug!(key = %key, "Cache hit");
            return Ok(rows);
        }

        let rows = self.inner.query(ctx, endpoint, params).await?;
        self.cache.insert(key, rows.clone());
        Ok(rows)
    }

    async fn discovery(
        &self,
        ctx: &RequestContext,
        table_filter: &[String],
    ) -> Result<Vec<Table>, ConnectorError> {
        self.inner.discovery(ctx, table_filter).await
    }

    async fn sample(&self, ctx: &RequestContext, table: &Table) -> Result<Vec<Row>, ConnectorError> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(n: i64) -> Vec<Row> {
        vec![json!({ "n": n }).as_object().cloned().unwrap()]
    }

    #[test]
    fn test_cache_key_is_order_independent() {
        let endpoint = Endpoint {
            mcp_method: "list".to_string(),
            ..Default::default()
        };
        let a = json!({ "b": 2, "a": "x" }).as_object().cloned().unwrap();
        let b = json!({ "a": "x", "b": 2 }).as_object().cloned().unwrap();
        let ctx = RequestContext::new();
        assert_eq!(cache_key(&endpoint, &a, &ctx, None), cache_key(&endpoint, &b, &ctx, None));
        assert_eq!(cache_key(&endpoint, &a, &ctx, None), r#"list/a="x"&b=2#"#);
    }

    #[test]
    fn test_raw_queries_are_keyed_by_text() {
        let params = Params::new();
        let ctx = RequestContext::new();
        assert_ne!(
            cache_key(&Endpoint::raw("select 1"), &params, &ctx, None),
            cache_key(&Endpoint::raw("select 2"), &params, &ctx, None)
        );
    }

    #[test]
    fn test_key_depends_on_caller() {
        let endpoint = Endpoint::raw("select 1");
        let params = Params::new();
        let anonymous = RequestContext::new().with_header("User-Agent", "curl");
        let keyed = RequestContext::new()
            .with_header("User-Agent", "curl")
            .with_header("X-API-Key", "secret");
        let other = RequestContext::new().with_header("X-API-Key", "other");
        let tenant = RequestContext::new().with_claim("tenant", json!("acme"));

        let key = |ctx: &RequestContext| cache_key(&endpoint, &params, ctx, None);
        assert_eq!(key(&anonymous), key(&RequestContext::new()));
        assert_ne!(key(&anonymous), key(&keyed));
        assert_ne!(key(&keyed), key(&other));
        assert_ne!(key(&anonymous), key(&tenant));
    }

    #[test]
    fn test_vary_headers_restrict_the_identity() {
        let endpoint = Endpoint::raw("select 1");
        let params = Params::new();
        let vary = vec!["authorization".to_string()];
        let a = RequestContext::new()
            .with_header("Authorization", "Bearer a")
            .with_header("X-Trace", "1");
        let b = RequestContext::new()
            .with_header("Authorization", "Bearer a")
            .with_header("X-Trace", "2");
        let c = RequestContext::new().with_header("Authorization", "Bearer c");

        let key = |ctx: &RequestContext| cache_key(&endpoint, &params, ctx, Some(&vary));
        assert_eq!(key(&a), key(&b));
        assert_ne!(key(&a), key(&c));
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = ResultCache::new(NonZeroUsize::new(2).unwrap(), Duration::from_secs(60));
        cache.insert("a".to_string(), row(1));
        cache.insert("b".to_string(), row(2));
        assert!(cache.get("a").is_some());

        cache.insert("c".to_string(), row(3));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_expired_entries_are_not_served() {
        let cache = ResultCache::new(NonZeroUsize::new(10).unwrap(), Duration::ZERO);
        cache.insert("a".to_string(), row(1));
        assert!(cache.get("a").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_build_rejects_bad_ttl() {
        let config = LruCacheConfig {
            max_size: 10,
            ttl: "soon".to_string(),
            vary_headers: None,
        };
        assert!(build(config).is_err());
    }
}
