//! Persisted record format
//!
//! A record is stored as the canonical JSON of its field map. References are
//! strings tagged `CacheReference{<key>}`; plain strings that could be read
//! as a tag (or that start with the escape character) get a leading `\`.

use crate::record::{Record, RecordValue};
use crate::{NormCacheError, Result};
use gql_operation::writer::to_canonical_string;
use serde_json::{Map, Value};

pub const REFERENCE_PREFIX: &str = "CacheReference{";
const REFERENCE_SUFFIX: char = '}';
const ESCAPE: char = '\\';

/// Canonical JSON text for a record's fields
pub fn encode_record(record: &Record) -> String {
    let fields: Map<String, Value> = record
        .fields()
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect();
    to_canonical_string(&Value::Object(fields))
}

/// Rebuild a record from its stored text
pub fn decode_record(key: &str, text: &str) -> Result<Record> {
    let value: Value = serde_json::from_str(text).map_err(|e| corrupt(key, "*", "json object", &e.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(corrupt(key, "*", "json object", json_kind(&value)));
    };
    let mut record = Record::new(key);
    for (field_key, value) in fields {
        record.set_field(field_key, decode_value(&value));
    }
    Ok(record)
}

fn encode_value(value: &RecordValue) -> Value {
    match value {
        RecordValue::Null => Value::Null,
        RecordValue::Boolean(b) => Value::Bool(*b),
        RecordValue::Number(n) => Value::Number(n.clone()),
        RecordValue::String(s) => {
            if s.starts_with(REFERENCE_PREFIX) || s.starts_with(ESCAPE) {
                Value::String(format!("{}{}", ESCAPE, s))
            } else {
                Value::String(s.clone())
            }
        }
        RecordValue::Reference(r) => Value::String(format!("{}{}{}", REFERENCE_PREFIX, r.key(), REFERENCE_SUFFIX)),
        RecordValue::List(items) => Value::Array(items.iter().map(encode_value).collect()),
        RecordValue::Json(map) => Value::Object(map.clone()),
    }
}

fn decode_value(value: &Value) -> RecordValue {
    match value {
        Value::String(s) => decode_string(s),
        Value::Array(items) => RecordValue::List(items.iter().map(decode_value).collect()),
        other => RecordValue::from_json(other),
    }
}

fn decode_string(s: &str) -> RecordValue {
    if let Some(unescaped) = s.strip_prefix(ESCAPE) {
        return RecordValue::String(unescaped.to_string());
    }
    match s
        .strip_prefix(REFERENCE_PREFIX)
        .and_then(|rest| rest.strip_suffix(REFERENCE_SUFFIX))
    {
        Some(key) => RecordValue::reference(key),
        None => RecordValue::String(s.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn corrupt(key: &str, field_key: &str, expected: &str, found: &str) -> NormCacheError {
    NormCacheError::CorruptRecord {
        record_key: key.to_string(),
        field_key: field_key.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
}
