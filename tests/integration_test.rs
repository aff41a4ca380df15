//! Integration tests for normcache
//!
//! These tests verify the full workflow from normalization through storage
//! backends and back out through the reader.

use normcache::config::{validate_config_result, BackendKind, CacheConfig};
use normcache::gql_operation::{Argument, Field, FieldType, Operation, ScalarType, Variables};
use normcache::record::merge_record;
use normcache::storage::{EvictionPolicy, MemoryStore, NormalizedStore, SqliteConfig, SqliteStore};
use normcache::{
    FetchPolicy, NetworkFetcher, NormCacheError, NormalizedCache, Record, TypenameIdResolver,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn hero_and_friends() -> Operation {
    let character = vec![
        Field::typename().into(),
        Field::scalar("id", ScalarType::Id).into(),
        Field::scalar("name", ScalarType::String).into(),
    ];
    let mut hero = character.clone();
    hero.push(Field::list("friends", FieldType::object(character)).into());

    Operation::query(
        "HeroAndFriends",
        vec![Field::object("hero", hero)
            .with_argument("episode", Argument::variable("episode"))
            .into()],
    )
    .with_variables(Variables::new().with("episode", "EMPIRE"))
}

fn hero_and_friends_data() -> Value {
    json!({
        "hero": {
            "__typename": "Human",
            "id": "1000",
            "name": "Luke Skywalker",
            "friends": [
                {"__typename": "Human", "id": "1002", "name": "Han Solo"},
                {"__typename": "Droid", "id": "2001", "name": "R2-D2"}
            ]
        }
    })
}

fn memory_cache() -> NormalizedCache {
    NormalizedCache::new(Arc::new(MemoryStore::new()), Arc::new(TypenameIdResolver::new()))
}

mod normalization_tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let cache = memory_cache();
        cache
            .normalize_and_merge(&hero_and_friends(), &hero_and_friends_data())
            .unwrap();

        assert_eq!(cache.read(&hero_and_friends()).unwrap(), hero_and_friends_data());

        let records = cache.dump().unwrap();
        assert_eq!(records.len(), 4);
        assert!(records.contains_key("Human.1000"));
        assert!(records.contains_key("Human.1002"));
        assert!(records.contains_key("Droid.2001"));
        assert!(records["QUERY_ROOT"].has_field(r#"hero({"episode":"EMPIRE"})"#));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let cache = memory_cache();
        let first = cache
            .normalize_and_merge(&hero_and_friends(), &hero_and_friends_data())
            .unwrap();
        assert!(!first.is_empty());

        let second = cache
            .normalize_and_merge(&hero_and_friends(), &hero_and_friends_data())
            .unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_disjoint_merges_commute() {
        let a = Record::builder("Droid.2001").field("name", "R2-D2").build();
        let b = Record::builder("Droid.2001").field("primaryFunction", "Astromech").build();

        let ab = merge_record(Some(&merge_record(None, &a).record), &b).record;
        let ba = merge_record(Some(&merge_record(None, &b).record), &a).record;
        assert_eq!(ab, ba);
        assert_eq!(ab.len(), 2);
    }

    #[test]
    fn test_argument_order_independence() {
        let in_order = Field::object("hero", vec![Field::scalar("name", ScalarType::String).into()])
            .with_argument("episode", Argument::literal("JEDI"))
            .with_argument("color", Argument::variable("color"));
        let reversed = Field::object("hero", vec![Field::scalar("name", ScalarType::String).into()])
            .with_argument("color", Argument::literal("blue"))
            .with_argument("episode", Argument::literal("JEDI"));

        let writer = Operation::query("Write", vec![in_order.into()])
            .with_variables(Variables::new().with("color", "blue"));
        let reader = Operation::query("Read", vec![reversed.into()]);

        let cache = NormalizedCache::new(Arc::new(MemoryStore::new()), Arc::new(normcache::NoKeyResolver));
        cache
            .normalize_and_merge(&writer, &json!({"hero": {"name": "R2-D2"}}))
            .unwrap();

        let root = cache.dump().unwrap()["QUERY_ROOT"].clone();
        assert!(root.has_field(r#"hero({"color":"blue","episode":"JEDI"})"#));
        assert_eq!(cache.read(&reader).unwrap(), json!({"hero": {"name": "R2-D2"}}));
    }

    #[test]
    fn test_alias_independence() {
        let plain = Operation::query(
            "Hero",
            vec![Field::object("hero", vec![Field::scalar("name", ScalarType::String).into()]).into()],
        );
        let aliased = Operation::query(
            "Artoo",
            vec![Field::object("hero", vec![Field::scalar("name", ScalarType::String).into()])
                .with_alias("r2")
                .into()],
        );

        let cache = NormalizedCache::new(Arc::new(MemoryStore::new()), Arc::new(normcache::NoKeyResolver));
        cache
            .normalize_and_merge(&aliased, &json!({"r2": {"name": "R2-D2"}}))
            .unwrap();

        assert!(cache.dump().unwrap()["QUERY_ROOT"].has_field("hero"));
        assert_eq!(cache.read(&plain).unwrap(), json!({"hero": {"name": "R2-D2"}}));
        assert_eq!(cache.read(&aliased).unwrap(), json!({"r2": {"name": "R2-D2"}}));
    }

    #[test]
    fn test_dangling_optional_reference_is_absent() {
        let op = Operation::query(
            "Hero",
            vec![Field::object(
                "hero",
                vec![
                    Field::typename().into(),
                    Field::scalar("id", ScalarType::Id).into(),
                    Field::scalar("name", ScalarType::String).into(),
                ],
            )
            .nullable()
            .into()],
        );
        let cache = memory_cache();
        cache
            .normalize_and_merge(
                &op,
                &json!({"hero": {"__typename": "Droid", "id": "2001", "name": "R2-D2"}}),
            )
            .unwrap();
        assert!(cache.remove("Droid.2001", false).unwrap());

        assert_eq!(cache.read(&op).unwrap(), json!({}));
    }
}

mod storage_tests {
    use super::*;

    fn sized(key: &str, approx_bytes: usize) -> Record {
        Record::builder(key).field("payload", "x".repeat(approx_bytes)).build()
    }

    #[test]
    fn test_eviction_boundary() {
        let store = MemoryStore::with_policy(EvictionPolicy::unbounded().with_max_size_bytes(2000));
        let cache = NormalizedCache::new(Arc::new(store), Arc::new(TypenameIdResolver::new()));

        cache.merge_records(&[sized("key1", 1100)]).unwrap();
        cache.merge_records(&[sized("key2", 1100)]).unwrap();
        cache.merge_records(&[sized("key3", 10)]).unwrap();

        let records = cache.dump().unwrap();
        assert!(!records.contains_key("key1"));
        assert!(records.contains_key("key2"));
        assert!(records.contains_key("key3"));
    }

    #[test]
    fn test_two_tier_survives_primary_clear() {
        let dir = TempDir::new().unwrap();
        let secondary = Arc::new(SqliteStore::open(&SqliteConfig::at(dir.path().join("records.db"))).unwrap());
        let primary = Arc::new(MemoryStore::new().with_secondary(secondary.clone()));
        let cache = NormalizedCache::new(primary.clone(), Arc::new(TypenameIdResolver::new()));

        cache
            .normalize_and_merge(&hero_and_friends(), &hero_and_friends_data())
            .unwrap();
        primary.clear_primary_cache();
        assert!(primary.is_empty());

        assert_eq!(cache.read(&hero_and_friends()).unwrap(), hero_and_friends_data());
        assert!(secondary.load("Droid.2001").unwrap().is_some());
    }

    #[test]
    fn test_sqlite_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let config = SqliteConfig::at(dir.path().join("records.db"));

        {
            let cache = NormalizedCache::new(
                Arc::new(SqliteStore::open(&config).unwrap()),
                Arc::new(TypenameIdResolver::new()),
            );
            cache
                .normalize_and_merge(&hero_and_friends(), &hero_and_friends_data())
                .unwrap();
        }

        let cache = NormalizedCache::new(
            Arc::new(SqliteStore::open(&config).unwrap()),
            Arc::new(TypenameIdResolver::new()),
        );
        assert_eq!(cache.read(&hero_and_friends()).unwrap(), hero_and_friends_data());
        assert_eq!(cache.stats().unwrap().entries, 4);
    }

    #[test]
    fn test_cascade_remove_keeps_shared_records() {
        let cache = memory_cache();
        cache
            .normalize_and_merge(&hero_and_friends(), &hero_and_friends_data())
            .unwrap();
        // Droid.2001 is also reachable from the root directly
        cache
            .merge_records(&[Record::builder("QUERY_ROOT")
                .field("droid", normcache::RecordValue::reference("Droid.2001"))
                .build()])
            .unwrap();

        assert!(cache.remove("Human.1000", true).unwrap());
        let records = cache.dump().unwrap();
        assert!(!records.contains_key("Human.1000"));
        assert!(!records.contains_key("Human.1002"));
        assert!(records.contains_key("Droid.2001"));
    }
}

mod fetch_tests {
    use super::*;

    struct CountingFetcher {
        calls: AtomicUsize,
    }

    impl NetworkFetcher for CountingFetcher {
        fn fetch(&self, _operation: &Operation) -> normcache::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(hero_and_friends_data())
        }
    }

    #[test]
    fn test_cache_only_miss_on_empty_store() {
        let cache = memory_cache();
        let fetcher = CountingFetcher {
            calls: AtomicUsize::new(0),
        };

        let err = cache.read(&hero_and_friends()).unwrap_err();
        assert!(matches!(err, NormCacheError::CacheMiss { .. }));

        let result = cache
            .execute(&hero_and_friends(), FetchPolicy::CacheOnly, &fetcher)
            .unwrap();
        assert!(result.is_cache_miss());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cache_first_then_watch() {
        let cache = memory_cache();
        let fetcher = CountingFetcher {
            calls: AtomicUsize::new(0),
        };
        cache
            .execute(&hero_and_friends(), FetchPolicy::CacheFirst, &fetcher)
            .unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        cache.watch(hero_and_friends(), move |result| {
            assert!(result.is_ok());
            s.fetch_add(1, Ordering::SeqCst);
        });

        // Han appears in the watched query as a friend
        let human = Operation::query(
            "Human",
            vec![Field::object(
                "human",
                vec![
                    Field::typename().into(),
                    Field::scalar("id", ScalarType::Id).into(),
                    Field::scalar("name", ScalarType::String).into(),
                ],
            )
            .into()],
        );
        cache
            .normalize_and_merge(
                &human,
                &json!({"human": {"__typename": "Human", "id": "1002", "name": "Han"}}),
            )
            .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(
            cache.read(&hero_and_friends()).unwrap()["hero"]["friends"][0]["name"],
            "Han"
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }
}

mod metrics_tests {
    use super::*;

    #[test]
    fn test_cache_activity_shows_in_metrics() {
        let cache = memory_cache();
        cache
            .normalize_and_merge(&hero_and_friends(), &hero_and_friends_data())
            .unwrap();
        cache.read(&hero_and_friends()).unwrap();

        let output = normcache::metrics::encode_metrics();
        assert!(output.contains("normcache_records_merged_total"));
        assert!(output.contains("normcache_loads_total"));
        assert!(output.contains("backend=\"memory\""));
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_config_driven_two_tier() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut config = CacheConfig::new();
        config.backend = BackendKind::TwoTier;
        config.sqlite.path = temp_dir.path().join("cache.db");
        config.eviction.max_entries = Some(100);
        config.save(&config_path).unwrap();

        let loaded = CacheConfig::load(&config_path).unwrap();
        validate_config_result(&loaded).unwrap();

        let cache = loaded.build_cache().unwrap();
        cache
            .normalize_and_merge(&hero_and_friends(), &hero_and_friends_data())
            .unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.entries, 4);
        assert_eq!(stats.secondary.map(|s| s.entries), Some(4));
        drop(cache);

        // A fresh build reads through to the durable tier
        let cache = loaded.build_cache().unwrap();
        assert_eq!(cache.read(&hero_and_friends()).unwrap(), hero_and_friends_data());
    }
}
