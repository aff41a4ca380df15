//! Fetch policies over a pluggable network fetcher

use super::NormalizedCache;
use crate::{NormCacheError, Result};
use gql_operation::Operation;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where an operation's data may come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPolicy {
    /// Cache only; a miss is an empty result, never a network call
    CacheOnly,
    /// Cache, falling back to the network on a miss
    #[default]
    CacheFirst,
    /// Network only; the response is still written to the cache
    NetworkOnly,
    /// Network, falling back to the cache when the fetch fails
    NetworkFirst,
}

/// Executes an operation against the server and returns its `data`
pub trait NetworkFetcher: Send + Sync {
    fn fetch(&self, operation: &Operation) -> Result<Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Cache,
    Network,
}

/// Outcome of [`NormalizedCache::execute`]
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    /// `None` only for a cache-only miss
    pub data: Option<Value>,
    pub source: DataSource,
    /// Set when network data was fetched but could not be fully cached
    pub cache_error: Option<String>,
}

impl FetchResult {
    fn cache(data: Value) -> Self {
        Self {
            data: Some(data),
            source: DataSource::Cache,
            cache_error: None,
        }
    }

    fn network(data: Value, cache_error: Option<String>) -> Self {
        Self {
            data: Some(data),
            source: DataSource::Network,
            cache_error,
        }
    }

    pub fn is_cache_miss(&self) -> bool {
        self.data.is_none()
    }

    /// Network data that did not make it into the cache
    pub fn is_uncached(&self) -> bool {
        self.cache_error.is_some()
    }
}

impl NormalizedCache {
    /// Run `operation` under `policy`
    ///
    /// Network data is normalized and merged before being returned. Once the
    /// fetch succeeds the data is always returned; a failed or partial merge
    /// is logged and reported through [`FetchResult::cache_error`].
    pub fn execute(
        &self,
        operation: &Operation,
        policy: FetchPolicy,
        fetcher: &dyn NetworkFetcher,
    ) -> Result<FetchResult> {
        match policy {
            FetchPolicy::CacheOnly => match self.read(operation) {
                Ok(data) => Ok(FetchResult::cache(data)),
                Err(e) if e.is_cache_miss() => Ok(FetchResult {
                    data: None,
                    source: DataSource::Cache,
                    cache_error: None,
                }),
                Err(e) => Err(e),
            },
            FetchPolicy::CacheFirst => match self.read(operation) {
                Ok(data) => Ok(FetchResult::cache(data)),
                Err(e) if e.is_cache_miss() => self.fetch_and_store(operation, fetcher),
                Err(e) => Err(e),
            },
            FetchPolicy::NetworkOnly => self.fetch_and_store(operation, fetcher),
            FetchPolicy::NetworkFirst => match fetcher.fetch(operation) {
                Ok(data) => Ok(self.store_fetched(operation, data)),
                Err(network_error) => {
                    tracing::debug!(error = %network_error, "Network fetch failed, trying cache");
                    self.read(operation)
                        .map(FetchResult::cache)
                        .map_err(|_| network_error)
                }
            },
        }
    }

    fn fetch_and_store(&self, operation: &Operation, fetcher: &dyn NetworkFetcher) -> Result<FetchResult> {
        let data = fetcher.fetch(operation)?;
        Ok(self.store_fetched(operation, data))
    }

    fn store_fetched(&self, operation: &Operation, data: Value) -> FetchResult {
        let cache_error = match self.normalize_and_merge(operation, &data) {
            Ok(_) => None,
            Err(e @ NormCacheError::SecondaryWrite { .. }) => {
                tracing::warn!(operation = %operation.name, error = %e, "Response cached in memory only");
                Some(e.to_string())
            }
            Err(e) => {
                tracing::warn!(operation = %operation.name, error = %e, "Response fetched but not cached");
                Some(e.to_string())
            }
        };
        FetchResult::network(data, cache_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_key::TypenameIdResolver;
    use crate::record::{ChangedKeys, Record};
    use crate::storage::{MemoryStore, NormalizedStore, StoreStats};
    use gql_operation::{Field, ScalarType};
    use std::collections::BTreeMap;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    struct StubFetcher {
        response: Option<Value>,
        calls: Mutex<usize>,
    }

    impl StubFetcher {
        fn ok(data: Value) -> Self {
            Self {
                response: Some(data),
                calls: Mutex::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                response: None,
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock()
        }
    }

    impl NetworkFetcher for StubFetcher {
        fn fetch(&self, _operation: &Operation) -> Result<Value> {
            *self.calls.lock() += 1;
            self.response
                .clone()
                .ok_or_else(|| NormCacheError::Other("connection refused".to_string()))
        }
    }

    /// Reads like an empty store, refuses every write
    struct FullDiskStore;

    impl NormalizedStore for FullDiskStore {
        fn name(&self) -> &'static str {
            "full-disk"
        }

        fn load(&self, _key: &str) -> Result<Option<Arc<Record>>> {
            Ok(None)
        }

        fn merge_all(&self, _records: &[Record]) -> Result<ChangedKeys> {
            Err(NormCacheError::MergeTransaction("disk full".to_string()))
        }

        fn remove(&self, _key: &str, _cascade: bool) -> Result<bool> {
            Ok(false)
        }

        fn clear_all(&self) -> Result<()> {
            Ok(())
        }

        fn dump(&self) -> Result<BTreeMap<String, Arc<Record>>> {
            Ok(BTreeMap::new())
        }

        fn stats(&self) -> Result<StoreStats> {
            Ok(StoreStats::default())
        }
    }

    fn cache() -> NormalizedCache {
        NormalizedCache::new(Arc::new(MemoryStore::new()), Arc::new(TypenameIdResolver::new()))
    }

    fn hero_name() -> Operation {
        Operation::query(
            "HeroName",
            vec![Field::object("hero", vec![Field::scalar("name", ScalarType::String).into()]).into()],
        )
    }

    fn hero_data() -> Value {
        json!({"hero": {"name": "R2-D2"}})
    }

    #[test]
    fn test_cache_only_miss_is_empty() {
        let cache = cache();
        let fetcher = StubFetcher::ok(hero_data());
        let result = cache.execute(&hero_name(), FetchPolicy::CacheOnly, &fetcher).unwrap();
        assert!(result.is_cache_miss());
        assert_eq!(fetcher.calls(), 0);
    }

    #[test]
    fn test_cache_first_fetches_once() {
        let cache = cache();
        let fetcher = StubFetcher::ok(hero_data());

        let first = cache.execute(&hero_name(), FetchPolicy::CacheFirst, &fetcher).unwrap();
        assert_eq!(first.source, DataSource::Network);
        let second = cache.execute(&hero_name(), FetchPolicy::CacheFirst, &fetcher).unwrap();
        assert_eq!(second.source, DataSource::Cache);
        assert_eq!(second.data, Some(hero_data()));
        assert_eq!(fetcher.calls(), 1);
    }

    #[test]
    fn test_network_only_always_fetches_and_stores() {
        let cache = cache();
        let fetcher = StubFetcher::ok(hero_data());
        cache.execute(&hero_name(), FetchPolicy::NetworkOnly, &fetcher).unwrap();
        cache.execute(&hero_name(), FetchPolicy::NetworkOnly, &fetcher).unwrap();
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(cache.read(&hero_name()).unwrap(), hero_data());
    }

    #[test]
    fn test_network_first_falls_back_to_cache() {
        let cache = cache();
        cache.normalize_and_merge(&hero_name(), &hero_data()).unwrap();

        let result = cache
            .execute(&hero_name(), FetchPolicy::NetworkFirst, &StubFetcher::failing())
            .unwrap();
        assert_eq!(result.source, DataSource::Cache);

        let empty = self::cache();
        let err = empty
            .execute(&hero_name(), FetchPolicy::NetworkFirst, &StubFetcher::failing())
            .unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_network_only_returns_data_when_caching_fails() {
        let cache = NormalizedCache::new(Arc::new(FullDiskStore), Arc::new(TypenameIdResolver::new()));
        let fetcher = StubFetcher::ok(hero_data());

        let result = cache.execute(&hero_name(), FetchPolicy::NetworkOnly, &fetcher).unwrap();
        assert_eq!(result.source, DataSource::Network);
        assert_eq!(result.data, Some(hero_data()));
        assert!(result.is_uncached());
        assert!(result.cache_error.unwrap().contains("disk full"));
    }

    #[test]
    fn test_network_first_keeps_fetched_data_when_caching_fails() {
        let cache = NormalizedCache::new(Arc::new(FullDiskStore), Arc::new(TypenameIdResolver::new()));
        let fetcher = StubFetcher::ok(hero_data());

        let result = cache.execute(&hero_name(), FetchPolicy::NetworkFirst, &fetcher).unwrap();
        assert_eq!(result.source, DataSource::Network);
        assert_eq!(result.data, Some(hero_data()));
        assert!(result.is_uncached());
        assert_eq!(fetcher.calls(), 1);
    }

    #[test]
    fn test_cached_fetch_has_no_cache_error() {
        let cache = cache();
        let result = cache
            .execute(&hero_name(), FetchPolicy::NetworkOnly, &StubFetcher::ok(hero_data()))
            .unwrap();
        assert!(!result.is_uncached());
    }
}
