//! Ordered plugin configuration.
//!
//! Plugins are applied in the order they appear in the configuration
//! document. Both of these forms are accepted and keep document order:
//!
//! ```yaml
//! plugins:
//!   api_keys: { name: X-API-Key, keys: [...] }
//!   lru_cache: { max_size: 100, ttl: 60s }
//! ```
//!
//! ```yaml
//! plugins:
//!   - api_keys: { name: X-API-Key, keys: [...] }
//!   - lru_cache: { max_size: 100, ttl: 60s }
//! ```

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One configured plugin: its registry tag and untyped config block.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginEntry {
    pub tag: String,
    pub config: Value,
}

impl PluginEntry {
    pub fn new(tag: impl Into<String>, config: Value) -> Self {
        Self {
            tag: tag.into(),
            config,
        }
    }
}

/// Plugins in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginList(Vec<PluginEntry>);

impl PluginList {
    pub fn new(entries: Vec<PluginEntry>) -> Self {
        Self(entries)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PluginEntry> {
        self.0.iter()
    }

    pub fn entries(&self) -> &[PluginEntry] {
        &self.0
    }

    pub fn entries_mut(&mut self) -> &mut Vec<PluginEntry> {
        &mut self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tags(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.tag.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a PluginList {
    type Item = &'a PluginEntry;
    type IntoIter = std::slice::Iter<'a, PluginEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for PluginList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for entry in &self.0 {
            seq.serialize_element(&SingleEntry(entry))?;
        }
        seq.end()
    }
}

struct SingleEntry<'a>(&'a PluginEntry);

impl Serialize for SingleEntry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.0.tag, &self.0.config)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for PluginList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(PluginListVisitor)
    }
}

struct PluginListVisitor;

impl<'de> Visitor<'de> for PluginListVisitor {
    type Value = PluginList;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a mapping of plugin tags or a list of single-key mappings")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(PluginList::default())
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(PluginList::default())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::new();
        while let Some((tag, config)) = map.next_entry::<String, Value>()? {
            if entries.iter().any(|e: &PluginEntry| e.tag == tag) {
                return Err(de::Error::custom(format!("duplicate plugin: {tag}")));
            }
            entries.push(PluginEntry::new(tag, config));
        }
        Ok(PluginList(entries))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::new();
        while let Some(item) = seq.next_element::<serde_json::Map<String, Value>>()? {
            if item.len() != 1 {
                return Err(de::Error::custom(
                    "each plugin list item must have exactly one key",
                ));
            }
            if let Some((tag, config)) = item.into_iter().next() {
                entries.push(PluginEntry::new(tag, config));
            }
        }
        Ok(PluginList(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mapping_keeps_document_order() {
        let yaml = r#"
zeta: { a: 1 }
alpha: { b: 2 }
mid: null
"#;
        let list: PluginList = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(list.tags(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(list.entries()[0].config, json!({"a": 1}));
        assert_eq!(list.entries()[2].config, Value::Null);
    }

    #[test]
    fn test_sequence_form() {
        let yaml = r#"
- lru_cache: { max_size: 5 }
- api_keys: { name: X-API-Key }
"#;
        let list: PluginList = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(list.tags(), vec!["lru_cache", "api_keys"]);
    }

    #[test]
    fn test_sequence_item_with_two_keys_rejected() {
        let yaml = "- { a: 1, b: 2 }\n";
        assert!(serde_yaml::from_str::<PluginList>(yaml).is_err());
    }

    #[test]
    fn test_duplicate_mapping_key_rejected() {
        let json = r#"{"a": {}, "a": {}}"#;
        assert!(serde_json::from_str::<PluginList>(json).is_err());
    }

    #[test]
    fn test_serialize_as_ordered_sequence() {
        let list = PluginList::new(vec![
            PluginEntry::new("b", json!({"x": 1})),
            PluginEntry::new("a", json!(null)),
        ]);
        let value = serde_json::to_value(&list).unwrap();
        assert_eq!(value, json!([{"b": {"x": 1}}, {"a": null}]));

        let back: PluginList = serde_json::from_value(value).unwrap();
        assert_eq!(back, list);
    }
}
