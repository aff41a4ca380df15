//! Field values stored in records

use serde_json::{Map, Number, Value};
use std::fmt;

const SIZE_OF_NULL: usize = 4;
const SIZE_OF_BOOLEAN: usize = 16;
const SIZE_OF_NUMBER: usize = 32;
const SIZE_OF_ARRAY_OVERHEAD: usize = 16;
const SIZE_OF_REFERENCE_OVERHEAD: usize = 16;

/// Weak pointer to another record
///
/// Holds only the target key. The target may be missing from storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheReference {
    key: String,
}

impl CacheReference {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for CacheReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheReference({})", self.key)
    }
}

/// Value of one record field
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    Null,
    Boolean(bool),
    Number(Number),
    String(String),
    Reference(CacheReference),
    List(Vec<RecordValue>),
    /// Object-shaped custom scalar, kept in source form
    Json(Map<String, Value>),
}

impl RecordValue {
    pub fn reference(key: impl Into<String>) -> Self {
        RecordValue::Reference(CacheReference::new(key))
    }

    /// Store a scalar response value as-is
    ///
    /// Arrays become lists, objects stay opaque.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => RecordValue::Null,
            Value::Bool(b) => RecordValue::Boolean(*b),
            Value::Number(n) => RecordValue::Number(n.clone()),
            Value::String(s) => RecordValue::String(s.clone()),
            Value::Array(items) => RecordValue::List(items.iter().map(RecordValue::from_json).collect()),
            Value::Object(map) => RecordValue::Json(map.clone()),
        }
    }

    /// Scalar view as JSON; references are not representable
    pub fn to_scalar_json(&self) -> Option<Value> {
        match self {
            RecordValue::Null => Some(Value::Null),
            RecordValue::Boolean(b) => Some(Value::Bool(*b)),
            RecordValue::Number(n) => Some(Value::Number(n.clone())),
            RecordValue::String(s) => Some(Value::String(s.clone())),
            RecordValue::Json(map) => Some(Value::Object(map.clone())),
            RecordValue::List(items) => items
                .iter()
                .map(RecordValue::to_scalar_json)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            RecordValue::Reference(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RecordValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RecordValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&CacheReference> {
        match self {
            RecordValue::Reference(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[RecordValue]> {
        match self {
            RecordValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short shape name used in corruption errors
    pub fn kind(&self) -> &'static str {
        match self {
            RecordValue::Null => "null",
            RecordValue::Boolean(_) => "boolean",
            RecordValue::Number(_) => "number",
            RecordValue::String(_) => "string",
            RecordValue::Reference(_) => "reference",
            RecordValue::List(_) => "list",
            RecordValue::Json(_) => "object",
        }
    }

    /// Rough in-memory footprint
    pub fn size_estimate(&self) -> usize {
        match self {
            RecordValue::Null => SIZE_OF_NULL,
            RecordValue::Boolean(_) => SIZE_OF_BOOLEAN,
            RecordValue::Number(_) => SIZE_OF_NUMBER,
            RecordValue::String(s) => s.len(),
            RecordValue::Reference(r) => SIZE_OF_REFERENCE_OVERHEAD + r.key.len(),
            RecordValue::List(items) => {
                SIZE_OF_ARRAY_OVERHEAD + items.iter().map(RecordValue::size_estimate).sum::<usize>()
            }
            RecordValue::Json(map) => map.iter().map(|(k, v)| k.len() + v.to_string().len()).sum(),
        }
    }

    /// Append every reference held by this value, including inside lists
    pub fn collect_references<'a>(&'a self, out: &mut Vec<&'a CacheReference>) {
        match self {
            RecordValue::Reference(r) => out.push(r),
            RecordValue::List(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            _ => {}
        }
    }
}

impl From<&str> for RecordValue {
    fn from(s: &str) -> Self {
        RecordValue::String(s.to_string())
    }
}

impl From<String> for RecordValue {
    fn from(s: String) -> Self {
        RecordValue::String(s)
    }
}

impl From<bool> for RecordValue {
    fn from(b: bool) -> Self {
        RecordValue::Boolean(b)
    }
}

impl From<i64> for RecordValue {
    fn from(n: i64) -> Self {
        RecordValue::Number(n.into())
    }
}

impl From<CacheReference> for RecordValue {
    fn from(r: CacheReference) -> Self {
        RecordValue::Reference(r)
    }
}

impl From<Vec<RecordValue>> for RecordValue {
    fn from(items: Vec<RecordValue>) -> Self {
        RecordValue::List(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_keeps_shape() {
        let value = RecordValue::from_json(&json!([1, "a", null, {"lat": 1.5}]));
        let items = value.as_list().unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[1], RecordValue::from("a"));
        assert!(items[2].is_null());
        assert_eq!(items[3].kind(), "object");
    }

    #[test]
    fn test_nested_list_equality() {
        let a = RecordValue::List(vec![
            RecordValue::List(vec![RecordValue::reference("Droid.1")]),
            RecordValue::from(3i64),
        ]);
        let b = RecordValue::List(vec![
            RecordValue::List(vec![RecordValue::reference("Droid.1")]),
            RecordValue::from(3i64),
        ]);
        let c = RecordValue::List(vec![
            RecordValue::List(vec![RecordValue::reference("Droid.2")]),
            RecordValue::from(3i64),
        ]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_size_grows_with_payload() {
        let small = RecordValue::from("a");
        let large = RecordValue::from("a".repeat(100));
        assert!(large.size_estimate() > small.size_estimate());

        let list = RecordValue::List(vec![small.clone(), small.clone()]);
        assert!(list.size_estimate() > small.size_estimate() * 2);
    }

    #[test]
    fn test_collect_references_in_nested_lists() {
        let value = RecordValue::List(vec![
            RecordValue::reference("A"),
            RecordValue::List(vec![RecordValue::reference("B"), RecordValue::Null]),
        ]);
        let mut refs = Vec::new();
        value.collect_references(&mut refs);
        let keys: Vec<&str> = refs.iter().map(|r| r.key()).collect();
        assert_eq!(keys, vec!["A", "B"]);
    }

    #[test]
    fn test_references_have_no_scalar_form() {
        assert!(RecordValue::reference("A").to_scalar_json().is_none());
        assert_eq!(RecordValue::from(true).to_scalar_json(), Some(json!(true)));
    }
}
