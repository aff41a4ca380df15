//! Storage backends for normalized records
//!
//! Every backend implements [`NormalizedStore`]: keyed record lookup, batch
//! merge with change tracking, removal and clearing. Backends:
//! - [`MemoryStore`]: bounded LRU, optionally layered over a secondary store
//! - [`SqliteStore`]: durable, one transaction per batch

mod encoding;
mod eviction;
mod memory;
mod sqlite;

pub use encoding::{decode_record, encode_record, REFERENCE_PREFIX};
pub use eviction::{Clock, EvictionPolicy, EvictionReason, ExpireBasis, ManualClock, SystemClock};
pub use memory::MemoryStore;
pub use sqlite::{CancelToken, SqliteConfig, SqliteStore};

use crate::record::{ChangedKeys, Record};
use crate::Result;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

/// Keyed record storage with merge semantics
///
/// Stored records are immutable snapshots; a merge swaps in a new `Arc`.
pub trait NormalizedStore: Send + Sync {
    /// Short backend label for logs and metrics
    fn name(&self) -> &'static str;

    fn load(&self, key: &str) -> Result<Option<Arc<Record>>>;

    /// Load several records; absent keys are omitted
    fn load_many(&self, keys: &[String]) -> Result<Vec<Arc<Record>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = self.load(key)? {
                out.push(record);
            }
        }
        Ok(out)
    }

    fn merge(&self, record: &Record) -> Result<ChangedKeys> {
        self.merge_all(std::slice::from_ref(record))
    }

    /// Merge a batch as one logical transaction
    ///
    /// Returns the union of changed field keys. On failure the store is left
    /// as it was, except for [`crate::NormCacheError::SecondaryWrite`], which
    /// reports a batch applied to the primary tier only.
    fn merge_all(&self, records: &[Record]) -> Result<ChangedKeys>;

    /// Remove `key`; with `cascade`, also the records only it kept reachable
    ///
    /// Returns whether `key` itself was present.
    fn remove(&self, key: &str, cascade: bool) -> Result<bool>;

    fn clear_all(&self) -> Result<()>;

    /// Snapshot of every stored record
    fn dump(&self) -> Result<BTreeMap<String, Arc<Record>>>;

    fn stats(&self) -> Result<StoreStats>;
}

/// Point-in-time store statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub backend: String,
    pub entries: usize,
    pub weight_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<Box<StoreStats>>,
}

impl StoreStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Keys removed by a cascading removal of `root`
///
/// `root` plus every record reachable from it that no surviving record
/// references. References arriving at `root` from outside do not keep it.
pub(crate) fn cascade_set(records: &BTreeMap<String, Arc<Record>>, root: &str) -> BTreeSet<String> {
    let reachable = reachable_from(records, [root.to_string()], None);

    let survivors = records
        .keys()
        .filter(|key| !reachable.contains(*key))
        .cloned();
    let kept = reachable_from(records, survivors, Some(root));

    let mut removed: BTreeSet<String> = reachable.difference(&kept).cloned().collect();
    removed.insert(root.to_string());
    removed
}

/// Keys reachable by following references, never entering `barrier`
fn reachable_from(
    records: &BTreeMap<String, Arc<Record>>,
    starts: impl IntoIterator<Item = String>,
    barrier: Option<&str>,
) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<String> = starts.into_iter().collect();
    while let Some(key) = queue.pop_front() {
        if Some(key.as_str()) == barrier || !seen.insert(key.clone()) {
            continue;
        }
        if let Some(record) = records.get(&key) {
            for reference in record.references() {
                if !seen.contains(reference.key()) {
                    queue.push_back(reference.key().to_string());
                }
            }
        }
    }
    seen
}
