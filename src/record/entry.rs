//! Record data structure

use super::{CacheReference, ChangedKeys, FieldRef, RecordValue};
use std::collections::{BTreeMap, BTreeSet};

const SIZE_OF_RECORD_OVERHEAD: usize = 16;

/// Flat, identity-keyed bag of field values for one normalized object
///
/// Field keys are the schema field name plus canonical arguments, e.g.
/// `hero({"episode":"JEDI"})`. Fields iterate in key order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    key: String,
    fields: BTreeMap<String, RecordValue>,
}

impl Record {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn builder(key: impl Into<String>) -> RecordBuilder {
        RecordBuilder {
            record: Record::new(key),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn fields(&self) -> &BTreeMap<String, RecordValue> {
        &self.fields
    }

    pub fn field(&self, field_key: &str) -> Option<&RecordValue> {
        self.fields.get(field_key)
    }

    pub fn has_field(&self, field_key: &str) -> bool {
        self.fields.contains_key(field_key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Concrete typename, when `__typename` was selected
    pub fn typename(&self) -> Option<&str> {
        self.fields.get("__typename").and_then(RecordValue::as_str)
    }

    pub(crate) fn set_field(&mut self, field_key: impl Into<String>, value: RecordValue) {
        self.fields.insert(field_key.into(), value);
    }

    /// Merge `other`'s fields into this record
    ///
    /// Returns the field keys that were added or whose value changed. Equal
    /// values (deep equality, references by key) are left alone.
    pub fn merge_with(&mut self, other: &Record) -> BTreeSet<String> {
        let mut changed = BTreeSet::new();
        for (field_key, new_value) in &other.fields {
            match self.fields.get(field_key) {
                Some(old_value) if old_value == new_value => {}
                _ => {
                    self.fields.insert(field_key.clone(), new_value.clone());
                    changed.insert(field_key.clone());
                }
            }
        }
        changed
    }

    /// Every field of this record as record-qualified keys
    pub fn field_refs(&self) -> ChangedKeys {
        self.fields
            .keys()
            .map(|field_key| FieldRef::new(self.key.clone(), field_key.clone()))
            .collect()
    }

    /// Approximate footprint used by byte-budget eviction
    pub fn size_estimate_bytes(&self) -> usize {
        SIZE_OF_RECORD_OVERHEAD
            + self.key.len()
            + self
                .fields
                .iter()
                .map(|(k, v)| k.len() + v.size_estimate())
                .sum::<usize>()
    }

    /// Every outgoing reference, in field order
    pub fn references(&self) -> Vec<&CacheReference> {
        let mut out = Vec::new();
        for value in self.fields.values() {
            value.collect_references(&mut out);
        }
        out
    }
}

/// Builder for records assembled outside the normalizer
#[derive(Debug)]
pub struct RecordBuilder {
    record: Record,
}

impl RecordBuilder {
    pub fn field(mut self, field_key: impl Into<String>, value: impl Into<RecordValue>) -> Self {
        self.record.set_field(field_key, value.into());
        self
    }

    pub fn build(self) -> Record {
        self.record
    }
}
