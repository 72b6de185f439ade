//! Environment variable expansion for configuration values.

use regex::{Captures, Regex};
use serde_yaml::Value;
use std::sync::LazyLock;

static ENV_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("env pattern is a valid regex")
});

/// Expand `${VAR}` and `$VAR` references using `lookup`. Unset variables
/// expand to the empty string.
pub fn expand_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ENV_PATTERN
        .replace_all(input, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            lookup(name).unwrap_or_default()
        })
        .into_owned()
}

/// Expand environment references in a single string.
pub fn expand(input: &str) -> String {
    expand_with(input, |name| std::env::var(name).ok())
}

/// Recursively expand every string scalar in a YAML value. Keys are left alone.
pub fn expand_value(value: &mut Value) {
    match value {
        Value::String(s) => {
            if s.contains('$') {
                *s = expand(s);
            }
        }
        Value::Sequence(items) => items.iter_mut().for_each(expand_value),
        Value::Mapping(map) => map.iter_mut().for_each(|(_, v)| expand_value(v)),
        Value::Tagged(tagged) => expand_value(&mut tagged.value),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}
