//! # Error Details
//!
//! Caller-supplied metadata attached to a wrapped error. Values are stored as
//! `serde_json::Value`, so any `Serialize` type can be recorded while the map
//! itself stays typed and ordered.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered, string-keyed structured metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Details {
    data: Map<String, Value>,
}

impl Details {
    /// Creates an empty details map
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key-value pair, builder style.
    ///
    /// A value that fails to serialize is recorded as a string describing
    /// the failure, so the key still shows up in logs.
    pub fn add<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Serialize,
    {
        self.insert(key, value);
        self
    }

    /// Inserts a key-value pair in place
    pub fn insert<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Serialize,
    {
        let value = serde_json::to_value(value)
            .unwrap_or_else(|e| Value::String(format!("<unserializable: {}>", e)));
        self.data.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    /// Borrows the underlying JSON object
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }
}

impl From<Map<String, Value>> for Details {
    fn from(data: Map<String, Value>) -> Self {
        Self { data }
    }
}

impl From<Details> for Value {
    fn from(details: Details) -> Self {
        Value::Object(details.data)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Details {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl fmt::Display for Details {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for (k, v) in &self.data {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", k, v)?;
            first = false;
        }
        write!(f, "}}")
    }
}
