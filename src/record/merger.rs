//! Record merge algorithm
//!
//! Stored records are shared as immutable snapshots. Merging clones the
//! stored version, applies the incoming fields, and hands back the new
//! version for the backend to swap in.

use super::{ChangedKeys, FieldRef, Record};

/// New version of a record plus what changed
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub record: Record,
    pub changed: ChangedKeys,
}

impl MergeOutcome {
    pub fn is_unchanged(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Merge `incoming` against the stored version, if any
///
/// A record that was not stored before reports every one of its fields as
/// changed, so watchers depending on any of them are notified.
pub fn merge_record(existing: Option<&Record>, incoming: &Record) -> MergeOutcome {
    match existing {
        None => MergeOutcome {
            record: incoming.clone(),
            changed: incoming.field_refs(),
        },
        Some(stored) => {
            let mut record = stored.clone();
            let changed = record
                .merge_with(incoming)
                .into_iter()
                .map(|field_key| FieldRef::new(record.key().to_string(), field_key))
                .collect();
            MergeOutcome { record, changed }
        }
    }
}
