//! Column redaction.

use crate::capability::{Interceptor, PluginCapabilities, RowDecision};
use gateway_core::{RequestContext, Row};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DOC: &str = r#"
Replaces the value of sensitive columns. Column patterns accept `*`
wildcards. Detection rules redact a column only when its value matches.

column_mask:
  columns:
    - email
    - "*_phone"
  replacement: "[REDACTED]"
  detection_rules:
    card_number: "\\d{4}-\\d{4}-\\d{4}-\\d{4}"
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMaskConfig {
    #[serde(default, alias = "fields")]
    pub columns: Vec<String>,

    #[serde(default = "default_replacement")]
    pub replacement: Value,

    /// Column name to a pattern its value must match to be redacted.
    #[serde(default)]
    pub detection_rules: BTreeMap<String, String>,
}

fn default_replacement() -> Value {
    Value::String("[REDACTED]".to_string())
}

pub fn build(config: ColumnMaskConfig) -> anyhow::Result<PluginCapabilities> {
    let columns = config
        .columns
        .iter()
        .map(|pattern| glob_to_regex(pattern))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rules = Vec::with_capacity(config.detection_rules.len());
    for (column, pattern) in &config.detection_rules {
        let regex = Regex::new(pattern)
            .map_err(|e| anyhow::anyhow!("invalid detection rule for {column}: {e}"))?;
        rules.push((column.clone(), regex));
    }

    Ok(PluginCapabilities::new(DOC).with_interceptor(Arc::new(ColumnMask {
        columns,
        rules,
        replacement: config.replacement,
    })))
}

fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    Regex::new(&format!("^{escaped}$"))
}

pub struct ColumnMask {
    columns: Vec<Regex>,
    rules: Vec<(String, Regex)>,
    replacement: Value,
}

impl ColumnMask {
    fn masks(&self, column: &str, value: &Value) -> bool {
        if self.columns.iter().any(|re| re.is_match(column)) {
            return true;
        }
        let Value::String(text) = value else {
            return false;
        };
        self.rules
            .iter()
            .any(|(name, re)| name == column && re.is_match(text))
    }
}

impl Interceptor for ColumnMask {
    fn process(&self, mut row: Row, _ctx: &RequestContext) -> RowDecision {
        for (column, value) in row.iter_mut() {
            if self.masks(column, value) {
                *value = self.replacement.clone();
            }
        }
        RowDecision::Keep(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mask(config: Value) -> Arc<dyn Interceptor> {
        build(serde_json::from_value(config).unwrap())
            .unwrap()
            .interceptor
            .unwrap()
    }

    fn kept(decision: RowDecision) -> Row {
        match decision {
            RowDecision::Keep(row) => row,
            RowDecision::Skip => panic!("row was skipped"),
        }
    }

    #[test]
    fn test_masks_named_and_wildcard_columns() {
        let m = mask(json!({ "columns": ["email", "*_phone"] }));
        let row = json!({ "id": 1, "email": "a@b.c", "home_phone": "123", "phone_type": "x" })
            .as_object()
            .cloned()
            .unwrap();

        let out = kept(m.process(row, &RequestContext::new()));
        assert_eq!(out["id"], json!(1));
        assert_eq!(out["email"], json!("[REDACTED]"));
        assert_eq!(out["home_phone"], json!("[REDACTED]"));
        assert_eq!(out["phone_type"], json!("x"));
    }

    #[test]
    fn test_detection_rules_match_values() {
        let m = mask(json!({
            "detection_rules": { "card": "\\d{4}-\\d{4}" },
            "replacement": null
        }));
        let hit = json!({ "card": "1234-5678" }).as_object().cloned().unwrap();
        let miss = json!({ "card": "n/a" }).as_object().cloned().unwrap();

        assert_eq!(kept(m.process(hit, &RequestContext::new()))["card"], Value::Null);
        assert_eq!(kept(m.process(miss, &RequestContext::new()))["card"], json!("n/a"));
    }

    #[test]
    fn test_invalid_rule_fails_construction() {
        let config: ColumnMaskConfig =
            serde_json::from_value(json!({ "detection_rules": { "x": "(" } })).unwrap();
        assert!(build(config).is_err());
    }
}
