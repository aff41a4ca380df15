//! Normalized cache facade

use super::watch::{WatchCallback, WatchId, Watchers};
use crate::cache_key::CacheKeyResolver;
use crate::metrics;
use crate::normalizer::{normalize, normalize_at};
use crate::reader::{DependencySet, ReadResult, Reader};
use crate::record::{ChangedKeys, Record};
use crate::storage::{NormalizedStore, StoreStats};
use crate::Result;
use gql_operation::{Operation, ScalarAdapters, Selection, Variables};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Store, key resolver and watchers behind one handle
///
/// Merges take the write side of a transaction lock and reads hold the read
/// side for their whole traversal, so a batch is seen all-or-nothing.
pub struct NormalizedCache {
    store: Arc<dyn NormalizedStore>,
    resolver: Arc<dyn CacheKeyResolver>,
    adapters: ScalarAdapters,
    transaction: RwLock<()>,
    watchers: Mutex<Watchers>,
}

impl NormalizedCache {
    pub fn new(store: Arc<dyn NormalizedStore>, resolver: Arc<dyn CacheKeyResolver>) -> Self {
        Self {
            store,
            resolver,
            adapters: ScalarAdapters::new(),
            transaction: RwLock::new(()),
            watchers: Mutex::new(Watchers::default()),
        }
    }

    /// Decode custom scalars on read through these adapters
    pub fn with_adapters(mut self, adapters: ScalarAdapters) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn store(&self) -> &Arc<dyn NormalizedStore> {
        &self.store
    }

    /// Normalize a response and merge it as one batch
    ///
    /// Watchers whose dependencies intersect the changed keys are re-read.
    /// A degraded two-tier write still notifies before returning its error.
    pub fn normalize_and_merge(&self, operation: &Operation, data: &Value) -> Result<ChangedKeys> {
        let records = normalize(operation, data, self.resolver.as_ref())?;
        self.merge_records(&records.into_records())
    }

    /// Normalize `data` as the record `root_key` using a fragment's selections
    pub fn write_fragment(
        &self,
        root_key: &str,
        selections: &[Selection],
        data: &Value,
        variables: &Variables,
    ) -> Result<ChangedKeys> {
        let records = normalize_at(root_key, selections, data, variables, self.resolver.as_ref())?;
        self.merge_records(&records.into_records())
    }

    /// Merge already-normalized records as one batch
    pub fn merge_records(&self, records: &[Record]) -> Result<ChangedKeys> {
        let result = {
            let _tx = self.transaction.write();
            self.store.merge_all(records)
        };

        match result {
            Ok(changed) => {
                tracing::debug!(records = records.len(), changed = changed.len(), "Merged batch");
                self.notify(&changed);
                Ok(changed)
            }
            Err(e) => {
                if let Some(changed) = e.changed_keys() {
                    self.notify(changed);
                }
                Err(e)
            }
        }
    }

    /// Read an operation from its root record
    pub fn read(&self, operation: &Operation) -> Result<Value> {
        self.read_from(operation, operation.root_key())
    }

    /// Read an operation's selections starting at `root_key`
    pub fn read_from(&self, operation: &Operation, root_key: &str) -> Result<Value> {
        self.read_tracked(operation, root_key).0
    }

    /// Read plus the dependency set of the read
    pub fn read_with_dependencies(&self, operation: &Operation) -> Result<ReadResult> {
        let (data, dependencies) = self.read_tracked(operation, operation.root_key());
        Ok(ReadResult {
            data: data?,
            dependencies,
        })
    }

    /// Read and deserialize into a caller type
    pub fn read_typed<T: DeserializeOwned>(&self, operation: &Operation) -> Result<T> {
        let data = self.read(operation)?;
        Ok(serde_json::from_value(data)?)
    }

    /// Remove one record, or with `cascade` everything only it kept reachable
    pub fn remove(&self, key: &str, cascade: bool) -> Result<bool> {
        let _tx = self.transaction.write();
        self.store.remove(key, cascade)
    }

    pub fn clear_all(&self) -> Result<()> {
        let _tx = self.transaction.write();
        self.store.clear_all()
    }

    pub fn dump(&self) -> Result<BTreeMap<String, Arc<Record>>> {
        let _tx = self.transaction.read();
        self.store.dump()
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.store.stats()
    }

    /// Read `operation` now and again after every merge that affects it
    ///
    /// The callback gets the initial result before this returns.
    pub fn watch<F>(&self, operation: Operation, callback: F) -> WatchId
    where
        F: Fn(&Result<Value>) + Send + Sync + 'static,
    {
        let callback: WatchCallback = Arc::new(callback);
        let (initial, id) = {
            let _tx = self.transaction.read();
            let (result, dependencies) = self.read_locked(&operation, operation.root_key());
            let id = self
                .watchers
                .lock()
                .add(operation, dependencies, Arc::clone(&callback));
            (result, id)
        };
        callback(&initial);
        id
    }

    pub fn unwatch(&self, id: WatchId) -> bool {
        self.watchers.lock().remove(id)
    }

    /// Number of live watchers
    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().len()
    }

    fn notify(&self, changed: &ChangedKeys) {
        if changed.is_empty() {
            return;
        }
        let affected = self.watchers.lock().affected(changed);
        for (id, operation, callback) in affected {
            let (result, dependencies) = self.read_tracked(&operation, operation.root_key());
            self.watchers.lock().set_dependencies(id, dependencies);
            callback(&result);
        }
    }

    fn read_tracked(&self, operation: &Operation, root_key: &str) -> (Result<Value>, DependencySet) {
        let _tx = self.transaction.read();
        self.read_locked(operation, root_key)
    }

    /// Caller holds the transaction lock
    fn read_locked(&self, operation: &Operation, root_key: &str) -> (Result<Value>, DependencySet) {
        let mut reader = Reader::new(self.store.as_ref(), &operation.variables)
            .with_adapters(&self.adapters)
            .with_resolver(self.resolver.as_ref());
        let result = reader.read(root_key, &operation.selections);
        if let Err(e) = &result {
            metrics::record_read_error(e.kind());
            tracing::debug!(operation = %operation.name, error = %e, "Cache read failed");
        }
        (result, reader.into_dependencies())
    }
}
