//! Response normalization
//!
//! Walks an operation's field tree alongside the response data and flattens
//! every object into a [`crate::record::Record`]. Objects with an identity go under their
//! resolved key; the rest are keyed by path (`parentKey.fieldKey`, plus
//! `.index` per list level). Parents hold [`crate::record::CacheReference`]s.

use crate::cache_key::{field_key, CacheKey, CacheKeyResolver};
use crate::record::{RecordSet, RecordValue};
use crate::{NormCacheError, Result};
use gql_operation::{Field, FieldType, Operation, Selection, Variables};
use serde_json::{Map, Value};

/// Normalize an operation's response data into records
///
/// The root record is the operation type's root key (`QUERY_ROOT` etc).
pub fn normalize(operation: &Operation, data: &Value, resolver: &dyn CacheKeyResolver) -> Result<RecordSet> {
    let records = normalize_at(
        operation.root_key(),
        &operation.selections,
        data,
        &operation.variables,
        resolver,
    )?;
    tracing::debug!(
        operation = %operation.name,
        records = records.len(),
        "Normalized response"
    );
    Ok(records)
}

/// Normalize `data` as the record `root_key`, e.g. to write a fragment
pub fn normalize_at(
    root_key: &str,
    selections: &[Selection],
    data: &Value,
    variables: &Variables,
    resolver: &dyn CacheKeyResolver,
) -> Result<RecordSet> {
    let Value::Object(object) = data else {
        return Err(invalid(root_key, format!("expected object, found {}", kind(data))));
    };
    let mut normalizer = Normalizer {
        resolver,
        variables,
        records: RecordSet::new(),
    };
    normalizer.object(root_key, selections, object, root_key)?;
    Ok(normalizer.records)
}

struct Normalizer<'a> {
    resolver: &'a dyn CacheKeyResolver,
    variables: &'a Variables,
    records: RecordSet,
}

impl Normalizer<'_> {
    fn object(&mut self, key: &str, selections: &[Selection], object: &Map<String, Value>, path: &str) -> Result<()> {
        self.records.entry(key);
        let typename = object.get("__typename").and_then(Value::as_str);

        for selection in selections {
            match selection {
                Selection::Field(field) => self.field(key, field, object, path)?,
                Selection::Conditional(conditional) => {
                    if conditional.matches(typename) {
                        self.object(key, &conditional.selections, object, path)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn field(&mut self, parent_key: &str, field: &Field, object: &Map<String, Value>, path: &str) -> Result<()> {
        let path = format!("{}.{}", path, field.response_name);
        let Some(value) = object.get(&field.response_name) else {
            if field.optional {
                return Ok(());
            }
            return Err(invalid(&path, "missing required field"));
        };

        let key = field_key(field, self.variables);
        let synthetic = format!("{}.{}", parent_key, key);
        let stored = self.value(field, &field.field_type, value, synthetic, &path)?;
        self.records.entry(parent_key).set_field(key, stored);
        Ok(())
    }

    fn value(
        &mut self,
        field: &Field,
        field_type: &FieldType,
        value: &Value,
        synthetic_key: String,
        path: &str,
    ) -> Result<RecordValue> {
        if value.is_null() {
            return Ok(RecordValue::Null);
        }
        match field_type {
            FieldType::Scalar { .. } | FieldType::Custom { .. } => Ok(RecordValue::from_json(value)),
            FieldType::Object { selections } => {
                let Value::Object(object) = value else {
                    return Err(invalid(path, format!("expected object, found {}", kind(value))));
                };
                let key = match self.resolver.resolve(field, object) {
                    CacheKey::Key(key) => key,
                    CacheKey::NoKey => synthetic_key,
                };
                self.object(&key, selections, object, path)?;
                Ok(RecordValue::reference(key))
            }
            FieldType::List { item } => {
                let Value::Array(items) = value else {
                    return Err(invalid(path, format!("expected list, found {}", kind(value))));
                };
                let mut out = Vec::with_capacity(items.len());
                for (index, element) in items.iter().enumerate() {
                    out.push(self.value(
                        field,
                        item,
                        element,
                        format!("{}.{}", synthetic_key, index),
                        &format!("{}[{}]", path, index),
                    )?);
                }
                Ok(RecordValue::List(out))
            }
        }
    }
}

fn invalid(path: &str, message: impl Into<String>) -> NormCacheError {
    NormCacheError::InvalidResponse {
        path: path.to_string(),
        message: message.into(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
