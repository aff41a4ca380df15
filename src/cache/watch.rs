//! Watched operations

use crate::reader::DependencySet;
use crate::record::ChangedKeys;
use crate::Result;
use gql_operation::Operation;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Handle returned by [`super::NormalizedCache::watch`]
pub type WatchId = u64;

/// Receives the result of every re-read
pub type WatchCallback = Arc<dyn Fn(&Result<Value>) + Send + Sync>;

struct Watcher {
    operation: Operation,
    dependencies: DependencySet,
    callback: WatchCallback,
}

/// Registered watchers and the dependencies of their last read
#[derive(Default)]
pub(crate) struct Watchers {
    next_id: WatchId,
    entries: HashMap<WatchId, Watcher>,
}

impl Watchers {
    pub fn add(&mut self, operation: Operation, dependencies: DependencySet, callback: WatchCallback) -> WatchId {
        self.next_id += 1;
        self.entries.insert(
            self.next_id,
            Watcher {
                operation,
                dependencies,
                callback,
            },
        );
        self.next_id
    }

    pub fn remove(&mut self, id: WatchId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Watchers whose last read touched any of `changed`
    pub fn affected(&self, changed: &ChangedKeys) -> Vec<(WatchId, Operation, WatchCallback)> {
        self.entries
            .iter()
            .filter(|(_, w)| w.dependencies.intersects(changed))
            .map(|(id, w)| (*id, w.operation.clone(), Arc::clone(&w.callback)))
            .collect()
    }

    pub fn set_dependencies(&mut self, id: WatchId, dependencies: DependencySet) {
        if let Some(watcher) = self.entries.get_mut(&id) {
            watcher.dependencies = dependencies;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldRef;

    #[test]
    fn test_affected_by_intersection() {
        let mut watchers = Watchers::default();
        let mut deps = DependencySet::new();
        deps.insert(FieldRef::new("QUERY_ROOT", "hero"));
        let id = watchers.add(Operation::query("Hero", vec![]), deps, Arc::new(|_| {}));

        let mut changed = ChangedKeys::new();
        changed.insert(FieldRef::new("QUERY_ROOT", "villain"));
        assert!(watchers.affected(&changed).is_empty());

        changed.insert(FieldRef::new("QUERY_ROOT", "hero"));
        assert_eq!(watchers.affected(&changed).len(), 1);

        assert!(watchers.remove(id));
        assert!(!watchers.remove(id));
        assert_eq!(watchers.len(), 0);
    }
}
