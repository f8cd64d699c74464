//! Middleware-writable metadata bag.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

const CORRELATION_ID: &str = "correlation_id";
const SOURCE: &str = "source";

/// Application-defined key/value data attached to one execution context.
///
/// This is the only place middleware may put derived data. It lives beside the
/// event, never inside its payload, so one stage can't rewrite what the
/// handlers see.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    entries: BTreeMap<String, Value>,
}

impl Metadata {
    /// Create an empty metadata bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous one for that key
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Get a string value by key
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    /// Remove a value by key
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Check whether a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the bag is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Set the correlation ID
    pub fn set_correlation_id(&mut self, id: Uuid) {
        self.entries
            .insert(CORRELATION_ID.to_string(), Value::String(id.to_string()));
    }

    /// Get the correlation ID, if one was set and is a valid UUID
    pub fn correlation_id(&self) -> Option<Uuid> {
        self.get_str(CORRELATION_ID)
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    /// Set the source that produced the event
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.entries
            .insert(SOURCE.to_string(), Value::String(source.into()));
    }

    /// Get the source that produced the event
    pub fn source(&self) -> Option<&str> {
        self.get_str(SOURCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_creation() {
        let metadata = Metadata::new();
        assert!(metadata.is_empty());
        assert!(metadata.correlation_id().is_none());
    }

    #[test]
    fn test_insert_get_remove() {
        let mut metadata = Metadata::new();
        assert_eq!(metadata.insert("tenant", "acme"), None);
        assert_eq!(metadata.insert("tenant", "globex"), Some(json!("acme")));
        metadata.insert("attempt", 3);

        assert_eq!(metadata.get_str("tenant"), Some("globex"));
        assert_eq!(metadata.get("attempt"), Some(&json!(3)));
        assert_eq!(metadata.len(), 2);

        assert_eq!(metadata.remove("attempt"), Some(json!(3)));
        assert!(!metadata.contains_key("attempt"));
    }

    #[test]
    fn test_typed_helpers() {
        let correlation_id = Uuid::new_v4();
        let mut metadata = Metadata::new();
        metadata.set_correlation_id(correlation_id);
        metadata.set_source("checkout-service");

        assert_eq!(metadata.correlation_id(), Some(correlation_id));
        assert_eq!(metadata.source(), Some("checkout-service"));
    }

    #[test]
    fn test_iteration_is_key_ordered() {
        let mut metadata = Metadata::new();
        metadata.insert("b", 2);
        metadata.insert("a", 1);
        let keys: Vec<&str> = metadata.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
