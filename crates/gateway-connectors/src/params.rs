//! Parameter handling shared by SQL connectors.

use crate::error::ConnectorError;
use gateway_core::{ColumnType, Endpoint, Params};
use serde_json::{Number, Value};

/// Coerce caller-supplied values to the types declared on the endpoint.
///
/// Only declared parameters are kept. Endpoints without declarations (raw
/// queries) pass their parameters through untouched. `null` stays `null`.
pub fn cast_params(endpoint: &Endpoint, params: &Params) -> Result<Params, ConnectorError> {
    if endpoint.params.is_empty() {
        return Ok(params.clone());
    }

    let mut processed = Params::new();
    for param in &endpoint.params {
        let Some(value) = params.get(&param.name) else {
            continue;
        };
        let cast = match value {
            Value::Null => Value::Null,
            _ => cast_value(&param.name, &param.param_type, value)?,
        };
        processed.insert(param.name.clone(), cast);
    }
    Ok(processed)
}

fn cast_value(name: &str, declared: &str, value: &Value) -> Result<Value, ConnectorError> {
    let invalid = |reason: &str| ConnectorError::InvalidParam {
        name: name.to_string(),
        reason: format!("{reason}, got {value}"),
    };

    match declared {
        "integer" => to_i64(value)
            .map(Value::from)
            .ok_or_else(|| invalid("expected integer")),
        "number" | "double" | "float" => to_i64(value)
            .map(Value::from)
            .or_else(|| to_f64(value).and_then(Number::from_f64).map(Value::Number))
            .ok_or_else(|| invalid("expected number")),
        "bool" | "boolean" => to_bool(value)
            .map(Value::Bool)
            .ok_or_else(|| invalid("expected boolean")),
        _ => Ok(Value::String(to_string(value))),
    }
}

fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" => Some(true),
            "false" | "f" | "0" | "no" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A query with `:name` placeholders rewritten to positional `$n` binds.
///
/// Repeated names reuse the same position. Placeholders inside quoted
/// literals, quoted identifiers and `--` comments are left alone, as are
/// `::type` casts.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedQuery {
    pub sql: String,
    pub names: Vec<String>,
}

impl NamedQuery {
    pub fn parse(query: &str) -> Self {
        let chars: Vec<char> = query.chars().collect();
        let mut sql = String::with_capacity(query.len());
        let mut names: Vec<String> = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '\'' | '"' => {
                    let end = find_closing(&chars, i + 1, c);
                    sql.extend(&chars[i..end]);
                    i = end;
                }
                '-' if chars.get(i + 1) == Some(&'-') => {
                    let end = chars[i..]
                        .iter()
                        .position(|&ch| ch == '\n')
                        .map_or(chars.len(), |p| i + p);
                    sql.extend(&chars[i..end]);
                    i = end;
                }
                ':' if chars.get(i + 1) == Some(&':') => {
                    sql.push_str("::");
                    i += 2;
                }
                ':' if chars.get(i + 1).is_some_and(|&ch| ch.is_ascii_alphabetic() || ch == '_') => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                        end += 1;
                    }
                    let name: String = chars[start..end].iter().collect();
                    let position = match names.iter().position(|n| *n == name) {
                        Some(p) => p + 1,
                        None => {
                            names.push(name);
                            names.len()
                        }
                    };
                    sql.push('$');
                    sql.push_str(&position.to_string());
                    i = end;
                }
                _ => {
                    sql.push(c);
                    i += 1;
                }
            }
        }

        Self { sql, names }
    }

    /// Values in bind order. A placeholder without a value is an error.
    pub fn values<'a>(&self, params: &'a Params) -> Result<Vec<&'a Value>, ConnectorError> {
        self.names
            .iter()
            .map(|name| {
                params.get(name).ok_or_else(|| ConnectorError::InvalidParam {
                    name: name.clone(),
                    reason: "missing value".to_string(),
                })
            })
            .collect()
    }
}

fn find_closing(chars: &[char], from: usize, quote: char) -> usize {
    let mut i = from;
    while i < chars.len() {
        if chars[i] == quote {
            // Doubled quote is an escaped quote.
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

/// Map a database type name to a logical column type.
pub fn guess_column_type(sql_type: &str) -> ColumnType {
    let normalized = sql_type.trim().to_ascii_lowercase();
    if normalized.ends_with("[]") || normalized.starts_with('_') || normalized == "array" {
        return ColumnType::Array;
    }

    match normalized.as_str() {
        "int2" | "int4" | "int8" | "smallint" | "integer" | "int" | "bigint" | "serial"
        | "bigserial" | "smallserial" => ColumnType::Integer,
        "float4" | "float8" | "real" | "double precision" | "numeric" | "decimal" | "money" => {
            ColumnType::Number
        }
        "bool" | "boolean" => ColumnType::Boolean,
        "date" | "time" | "timetz" | "timestamp" | "timestamptz" | "interval" => {
            ColumnType::Datetime
        }
        "json" | "jsonb" => ColumnType::Object,
        t if t.starts_with("timestamp") || t.starts_with("time ") => ColumnType::Datetime,
        t if t.starts_with("numeric") || t.starts_with("decimal") => ColumnType::Number,
        _ => ColumnType::String,
    }
}
