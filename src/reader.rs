//! Reading operation data back out of the store
//!
//! The reader mirrors the normalizer: it walks the same field tree, computes
//! the same field keys and follows references through the store. Every
//! record field it touches goes into a [`DependencySet`] so callers can tell
//! whether a later merge affects the result.

use crate::cache_key::{field_key, CacheKey, CacheKeyResolver, NoKeyResolver};
use crate::record::{ChangedKeys, FieldRef, Record, RecordValue};
use crate::storage::NormalizedStore;
use crate::{NormCacheError, Result};
use gql_operation::{Field, FieldType, Operation, ScalarAdapters, Selection, Variables};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Record fields a read depended on
///
/// Records that were missing are kept separately: any field later written
/// under such a key counts as a change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySet {
    fields: HashSet<FieldRef>,
    missing_records: HashSet<String>,
}

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: FieldRef) {
        self.fields.insert(field);
    }

    pub fn insert_missing_record(&mut self, record_key: impl Into<String>) {
        self.missing_records.insert(record_key.into());
    }

    pub fn contains(&self, field: &FieldRef) -> bool {
        self.fields.contains(field)
    }

    /// Whether any changed key could alter the read's result
    pub fn intersects(&self, changed: &ChangedKeys) -> bool {
        changed
            .iter()
            .any(|f| self.fields.contains(f) || self.missing_records.contains(&f.record_key))
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldRef> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len() + self.missing_records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.missing_records.is_empty()
    }
}

/// Data reconstructed from the store plus what it was built from
#[derive(Debug, Clone)]
pub struct ReadResult {
    pub data: Value,
    pub dependencies: DependencySet,
}

/// One read over a store
///
/// Absent optional fields are omitted from the output object, stored nulls
/// come back as `null`.
pub struct Reader<'a> {
    store: &'a dyn NormalizedStore,
    variables: &'a Variables,
    adapters: Option<&'a ScalarAdapters>,
    resolver: &'a dyn CacheKeyResolver,
    dependencies: DependencySet,
}

impl<'a> Reader<'a> {
    pub fn new(store: &'a dyn NormalizedStore, variables: &'a Variables) -> Self {
        Self {
            store,
            variables,
            adapters: None,
            resolver: &NoKeyResolver,
            dependencies: DependencySet::new(),
        }
    }

    /// Decode custom scalars through these adapters
    pub fn with_adapters(mut self, adapters: &'a ScalarAdapters) -> Self {
        self.adapters = Some(adapters);
        self
    }

    /// Follow argument redirects with this resolver
    pub fn with_resolver(mut self, resolver: &'a dyn CacheKeyResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Read `selections` starting at the record `root_key`
    pub fn read(&mut self, root_key: &str, selections: &[Selection]) -> Result<Value> {
        let Some(root) = self.load(root_key)? else {
            return Err(NormCacheError::record_miss(root_key));
        };
        let mut out = Map::new();
        self.selections(&root, selections, &mut out)?;
        Ok(Value::Object(out))
    }

    /// Dependencies gathered so far, including by a failed read
    pub fn dependencies(&self) -> &DependencySet {
        &self.dependencies
    }

    pub fn into_dependencies(self) -> DependencySet {
        self.dependencies
    }

    fn load(&mut self, key: &str) -> Result<Option<Arc<Record>>> {
        let record = self.store.load(key)?;
        if record.is_none() {
            self.dependencies.insert_missing_record(key);
        }
        Ok(record)
    }

    fn selections(&mut self, record: &Record, selections: &[Selection], out: &mut Map<String, Value>) -> Result<()> {
        for selection in selections {
            match selection {
                Selection::Field(field) => self.field(record, field, out)?,
                Selection::Conditional(conditional) => {
                    self.dependencies.insert(FieldRef::new(record.key(), "__typename"));
                    if conditional.matches(record.typename()) {
                        self.selections(record, &conditional.selections, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn field(&mut self, record: &Record, field: &Field, out: &mut Map<String, Value>) -> Result<()> {
        let key = field_key(field, self.variables);
        self.dependencies.insert(FieldRef::new(record.key(), key.clone()));

        let resolved = match record.field(&key) {
            Some(value) => self.value(record.key(), &key, &field.field_type, value)?,
            None => match self.redirect(field) {
                Some(target) => self.value(record.key(), &key, &field.field_type, &target)?,
                None if field.optional => return Ok(()),
                None => return Err(NormCacheError::field_miss(record.key(), key)),
            },
        };

        match resolved {
            Some(value) => {
                out.insert(field.response_name.clone(), value);
                Ok(())
            }
            None if field.optional => Ok(()),
            None => Err(self.dangling_miss(record, &key)),
        }
    }

    /// Reference implied by the field's arguments, for object fields only
    fn redirect(&self, field: &Field) -> Option<RecordValue> {
        if !matches!(field.field_type, FieldType::Object { .. }) {
            return None;
        }
        match self.resolver.from_field_arguments(field, self.variables) {
            CacheKey::Key(target) => Some(RecordValue::reference(target)),
            CacheKey::NoKey => None,
        }
    }

    /// Resolve a stored value; `None` when it leads to a missing record
    fn value(
        &mut self,
        record_key: &str,
        field_key: &str,
        field_type: &FieldType,
        value: &RecordValue,
    ) -> Result<Option<Value>> {
        if value.is_null() {
            return Ok(Some(Value::Null));
        }
        match field_type {
            FieldType::Scalar { .. } => value
                .to_scalar_json()
                .map(Some)
                .ok_or_else(|| corrupt(record_key, field_key, "scalar", value)),
            FieldType::Custom { type_name } => {
                let source = value
                    .to_scalar_json()
                    .ok_or_else(|| corrupt(record_key, field_key, type_name, value))?;
                let decoded = match self.adapters {
                    Some(adapters) => adapters.decode(type_name, &source)?,
                    None => source,
                };
                Ok(Some(decoded))
            }
            FieldType::Object { selections } => {
                let RecordValue::Reference(reference) = value else {
                    return Err(corrupt(record_key, field_key, "reference", value));
                };
                let Some(target) = self.load(reference.key())? else {
                    return Ok(None);
                };
                let mut out = Map::new();
                self.selections(&target, selections, &mut out)?;
                Ok(Some(Value::Object(out)))
            }
            FieldType::List { item } => {
                let RecordValue::List(items) = value else {
                    return Err(corrupt(record_key, field_key, "list", value));
                };
                let mut out = Vec::with_capacity(items.len());
                for element in items {
                    match self.value(record_key, field_key, item, element)? {
                        Some(v) => out.push(v),
                        None => return Ok(None),
                    }
                }
                Ok(Some(Value::Array(out)))
            }
        }
    }

    fn dangling_miss(&self, record: &Record, field_key: &str) -> NormCacheError {
        let mut targets = Vec::new();
        if let Some(value) = record.field(field_key) {
            value.collect_references(&mut targets);
        }
        match targets
            .into_iter()
            .find(|r| self.dependencies.missing_records.contains(r.key()))
        {
            Some(target) => NormCacheError::record_miss(target.key()),
            None => NormCacheError::field_miss(record.key(), field_key),
        }
    }
}

fn corrupt(record_key: &str, field_key: &str, expected: &str, found: &RecordValue) -> NormCacheError {
    NormCacheError::CorruptRecord {
        record_key: record_key.to_string(),
        field_key: field_key.to_string(),
        expected: expected.to_string(),
        found: found.kind().to_string(),
    }
}

/// Read a whole operation from its root record
pub fn read_operation(
    store: &dyn NormalizedStore,
    operation: &Operation,
    adapters: &ScalarAdapters,
    resolver: &dyn CacheKeyResolver,
) -> Result<ReadResult> {
    let mut reader = Reader::new(store, &operation.variables)
        .with_adapters(adapters)
        .with_resolver(resolver);
    let data = reader.read(operation.root_key(), &operation.selections)?;
    Ok(ReadResult {
        data,
        dependencies: reader.into_dependencies(),
    })
}
