//! Tag-keyed factory registries.
//!
//! A [`Registry`] maps a string tag to a constructor that accepts an untyped
//! configuration value and produces a typed instance. Typed constructors are
//! registered with [`Registry::register_typed`]: the untyped block is remapped
//! into the constructor's own config struct first, so configuration can be
//! authored generically while each implementation validates its own shape.
//!
//! Registries are plain values built during startup and passed by reference.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while resolving a tag through a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No constructor is registered under this tag.
    #[error("{kind}: {tag} not found")]
    UnknownTag { kind: &'static str, tag: String },

    /// The untyped config block does not fit the constructor's config type.
    #[error("unable to remap config for {tag}: {source}")]
    Remap {
        tag: String,
        #[source]
        source: serde_json::Error,
    },

    /// The constructor rejected the config.
    #[error("unable to construct {tag}: {source}")]
    Construct {
        tag: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Re-serialize any value and decode it as `T`.
pub fn remap<S, T>(value: &S) -> Result<T, serde_json::Error>
where
    S: Serialize + ?Sized,
    T: DeserializeOwned,
{
    serde_json::from_value(serde_json::to_value(value)?)
}

type Constructor<T> = Box<dyn Fn(Value) -> Result<T, RegistryError> + Send + Sync>;

struct Entry<T> {
    constructor: Constructor<T>,
    doc: String,
}

/// A tag → constructor registry producing `T`.
pub struct Registry<T> {
    kind: &'static str,
    entries: BTreeMap<String, Entry<T>>,
}

impl<T> Registry<T> {
    /// Create an empty registry. `kind` names the registry in error messages.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    /// Register an untyped constructor. A later registration under the same
    /// tag replaces the earlier one.
    pub fn register<F>(&mut self, tag: impl Into<String>, doc: impl Into<String>, constructor: F)
    where
        F: Fn(Value) -> Result<T, RegistryError> + Send + Sync + 'static,
    {
        self.entries.insert(
            tag.into(),
            Entry {
                constructor: Box::new(constructor),
                doc: doc.into(),
            },
        );
    }

    /// Register a constructor taking a strongly-typed config.
    pub fn register_typed<C, F>(
        &mut self,
        tag: impl Into<String>,
        doc: impl Into<String>,
        constructor: F,
    ) where
        C: DeserializeOwned,
        F: Fn(C) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let tag = tag.into();
        let owned_tag = tag.clone();
        self.register(tag, doc, move |value| {
            let config: C = remap(&value).map_err(|source| RegistryError::Remap {
                tag: owned_tag.clone(),
                source,
            })?;
            constructor(config).map_err(|source| RegistryError::Construct {
                tag: owned_tag.clone(),
                source,
            })
        });
    }

    /// Resolve a tag and construct an instance from its config block.
    pub fn build(&self, tag: &str, config: Value) -> Result<T, RegistryError> {
        let entry = self
            .entries
            .get(tag)
            .ok_or_else(|| RegistryError::UnknownTag {
                kind: self.kind,
                tag: tag.to_string(),
            })?;
        (entry.constructor)(config)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Documentation registered alongside a tag.
    pub fn doc(&self, tag: &str) -> Option<&str> {
        self.entries.get(tag).map(|e| e.doc.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
