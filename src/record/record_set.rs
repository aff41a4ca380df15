//! Batch of records produced by one normalization

use super::Record;
use std::collections::BTreeMap;

/// Records keyed by record key
///
/// The same object may appear several times in one response; later
/// occurrences merge into the earlier record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    records: BTreeMap<String, Record>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, merging with one already present under the same key
    pub fn merge(&mut self, record: Record) {
        match self.records.get_mut(record.key()) {
            Some(existing) => {
                existing.merge_with(&record);
            }
            None => {
                self.records.insert(record.key().to_string(), record);
            }
        }
    }

    /// Get or create the record for `key`
    pub(crate) fn entry(&mut self, key: &str) -> &mut Record {
        self.records
            .entry(key.to_string())
            .or_insert_with(|| Record::new(key))
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.records.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.records.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records.into_values().collect()
    }
}

impl FromIterator<Record> for RecordSet {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut set = RecordSet::new();
        for record in iter {
            set.merge(record);
        }
        set
    }
}
