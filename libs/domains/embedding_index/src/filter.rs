//! Equality filters over document metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{IndexError, IndexResult};
use crate::models::{Metadata, WORKSPACE_KEY};

/// A conjunction of `key == value` conditions.
///
/// An empty filter matches everything and is treated as "no filter".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter {
    conditions: BTreeMap<String, Value>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().and_eq(key, value)
    }

    /// Filter on the `workspace_name` metadata key.
    pub fn workspace(name: impl Into<String>) -> Self {
        Self::eq(WORKSPACE_KEY, name.into())
    }

    pub fn and_eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.conditions.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Reject keys or values that backends cannot match on.
    pub fn validate(&self) -> IndexResult<()> {
        for (key, value) in &self.conditions {
            if key.trim().is_empty() {
                return Err(IndexError::Validation(
                    "filter keys must not be empty".to_string(),
                ));
            }
            if !matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_)) {
                return Err(IndexError::Validation(format!(
                    "filter value for '{}' must be a string, number or boolean",
                    key
                )));
            }
        }
        Ok(())
    }

    /// Evaluate the filter against stored metadata.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions.iter().all(|(key, expected)| {
            metadata
                .get(key)
                .is_some_and(|actual| values_equal(actual, expected))
        })
    }

    /// Render in Pinecone's `{"key": {"$eq": value}}` filter syntax.
    pub fn to_pinecone(&self) -> Value {
        let clauses: serde_json::Map<String, Value> = self
            .conditions
            .iter()
            .map(|(k, v)| (k.clone(), json!({ "$eq": v })))
            .collect();
        Value::Object(clauses)
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(pairs: &[(&str, Value)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = MetadataFilter::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&Metadata::new()));
    }

    #[test]
    fn test_conjunction_requires_all_conditions() {
        let filter = MetadataFilter::workspace("ws1").and_eq("lang", "en");

        assert!(filter.matches(&metadata(&[
            ("workspace_name", json!("ws1")),
            ("lang", json!("en")),
            ("extra", json!(1)),
        ])));
        assert!(!filter.matches(&metadata(&[("workspace_name", json!("ws1"))])));
        assert!(!filter.matches(&metadata(&[
            ("workspace_name", json!("ws2")),
            ("lang", json!("en")),
        ])));
    }

    #[test]
    fn test_numeric_equality_ignores_representation() {
        let filter = MetadataFilter::eq("page", 3);
        assert!(filter.matches(&metadata(&[("page", json!(3.0))])));
        assert!(!filter.matches(&metadata(&[("page", json!("3"))])));
    }

    #[test]
    fn test_pinecone_rendering() {
        let filter = MetadataFilter::workspace("ws1").and_eq("type", "text");
        assert_eq!(
            filter.to_pinecone(),
            json!({
                "type": { "$eq": "text" },
                "workspace_name": { "$eq": "ws1" }
            })
        );
    }

    #[test]
    fn test_validate_rejects_structured_values() {
        assert!(MetadataFilter::eq("tags", json!(["a"])).validate().is_err());
        assert!(MetadataFilter::eq("x", Value::Null).validate().is_err());
        assert!(MetadataFilter::eq(" ", "v").validate().is_err());
        assert!(MetadataFilter::workspace("ws1").and_eq("n", 2).validate().is_ok());
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let filter = MetadataFilter::workspace("ws1");
        assert_eq!(serde_json::to_value(&filter).unwrap(), json!({"workspace_name": "ws1"}));
    }
}
