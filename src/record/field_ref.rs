//! Record-qualified field keys

use std::collections::HashSet;
use std::fmt;

/// A (record key, field key) pair
///
/// Merges report changes as sets of these, and reads record the ones they
/// touched, so invalidation is a hash-set intersection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef {
    pub record_key: String,
    pub field_key: String,
}

impl FieldRef {
    pub fn new(record_key: impl Into<String>, field_key: impl Into<String>) -> Self {
        Self {
            record_key: record_key.into(),
            field_key: field_key.into(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.record_key, self.field_key)
    }
}

/// Fields whose values changed during a merge
pub type ChangedKeys = HashSet<FieldRef>;
