//! Row-level filtering against the caller's identity.

use crate::capability::{Interceptor, PluginCapabilities, RowDecision};
use gateway_core::{RequestContext, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub const DOC: &str = r#"
Keeps a row only when one of its columns equals a value taken from the
request: a header or a claim. Rows are dropped when the request carries no
such value.

row_filter:
  column: tenant_id
  header: X-Tenant-Id      # or: claim: tenant
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowFilterConfig {
    pub column: String,

    #[serde(default)]
    pub header: Option<String>,

    #[serde(default)]
    pub claim: Option<String>,
}

#[derive(Debug, Clone)]
enum Source {
    Header(String),
    Claim(String),
}

pub fn build(config: RowFilterConfig) -> anyhow::Result<PluginCapabilities> {
    let source = match (config.header, config.claim) {
        (Some(header), None) => Source::Header(header),
        (None, Some(claim)) => Source::Claim(claim),
        _ => anyhow::bail!("row_filter needs exactly one of header or claim"),
    };
    Ok(PluginCapabilities::new(DOC).with_interceptor(Arc::new(RowFilter {
        column: config.column,
        source,
    })))
}

pub struct RowFilter {
    column: String,
    source: Source,
}

impl RowFilter {
    fn expected(&self, ctx: &RequestContext) -> Option<String> {
        match &self.source {
            Source::Header(name) => ctx.header(name).map(str::to_string),
            Source::Claim(name) => ctx.claim(name).map(render),
        }
    }
}

impl Interceptor for RowFilter {
    fn process(&self, row: Row, ctx: &RequestContext) -> RowDecision {
        let Some(expected) = self.expected(ctx) else {
            return RowDecision::Skip;
        };
        match row.get(&self.column) {
            Some(actual) if render(actual) == expected => RowDecision::Keep(row),
            _ => RowDecision::Skip,
        }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(tenant: Value) -> Row {
        json!({ "id": 1, "tenant_id": tenant }).as_object().cloned().unwrap()
    }

    fn filter(config: Value) -> Arc<dyn Interceptor> {
        build(serde_json::from_value(config).unwrap())
            .unwrap()
            .interceptor
            .unwrap()
    }

    #[test]
    fn test_header_match() {
        let f = filter(json!({ "column": "tenant_id", "header": "X-Tenant-Id" }));
        let ctx = RequestContext::new().with_header("x-tenant-id", "7");

        assert!(matches!(f.process(row(json!(7)), &ctx), RowDecision::Keep(_)));
        assert!(matches!(f.process(row(json!("7")), &ctx), RowDecision::Keep(_)));
        assert_eq!(f.process(row(json!(8)), &ctx), RowDecision::Skip);
    }

    #[test]
    fn test_claim_match() {
        let f = filter(json!({ "column": "tenant_id", "claim": "tenant" }));
        let ctx = RequestContext::new().with_claim("tenant", json!("acme"));
        assert!(matches!(f.process(row(json!("acme")), &ctx), RowDecision::Keep(_)));
    }

    #[test]
    fn test_missing_identity_drops_rows() {
        let f = filter(json!({ "column": "tenant_id", "header": "X-Tenant-Id" }));
        assert_eq!(f.process(row(json!(7)), &RequestContext::new()), RowDecision::Skip);
    }

    #[test]
    fn test_requires_one_source() {
        let config = RowFilterConfig {
            column: "tenant_id".to_string(),
            header: Some("a".to_string()),
            claim: Some("b".to_string()),
        };
        assert!(build(config).is_err());
    }
}
