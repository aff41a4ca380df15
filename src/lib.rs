//! normcache - Normalized GraphQL response cache
//!
//! Flattens GraphQL responses into identity-keyed records so overlapping
//! queries share one copy of each object, then reconstructs responses from
//! those records for later reads.
//!
//! # Architecture
//!
//! - **record**: Records, field values, references and field-level merge
//! - **cache_key**: Field keys and pluggable record key resolution
//! - **normalizer**: Response tree to record set
//! - **reader**: Record set back to a response tree, with dependency tracking
//! - **storage**: In-memory LRU, SQLite and two-tier backends
//! - **cache**: The [`NormalizedCache`] facade (watchers, fetch policies)
//! - **config**: YAML configuration and validation
//!
//! # Example
//!
//! ```
//! use normcache::gql_operation::{Field, Operation, ScalarType};
//! use normcache::{MemoryStore, NormalizedCache, TypenameIdResolver};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let cache = NormalizedCache::new(Arc::new(MemoryStore::new()), Arc::new(TypenameIdResolver::new()));
//! let op = Operation::query(
//!     "HeroName",
//!     vec![Field::object(
//!         "hero",
//!         vec![
//!             Field::typename().into(),
//!             Field::scalar("id", ScalarType::Id).into(),
//!             Field::scalar("name", ScalarType::String).into(),
//!         ],
//!     )
//!     .into()],
//! );
//!
//! let data = json!({"hero": {"__typename": "Droid", "id": "2001", "name": "R2-D2"}});
//! cache.normalize_and_merge(&op, &data).unwrap();
//! assert_eq!(cache.read(&op).unwrap(), data);
//! ```

// Core modules
pub mod cache_key;
pub mod error;
pub mod normalizer;
pub mod reader;
pub mod record;
pub mod storage;

// Components
pub mod cache;
pub mod config;
pub mod logging;
pub mod metrics;

// Re-exports
pub use cache::{DataSource, FetchPolicy, FetchResult, NetworkFetcher, NormalizedCache, WatchId};
pub use cache_key::{
    field_key, CacheKey, CacheKeyResolver, FnKeyResolver, NoKeyResolver, TypeFieldsResolver,
    TypenameIdResolver,
};
pub use error::{NormCacheError, Result};
pub use normalizer::normalize;
pub use reader::{read_operation, DependencySet, ReadResult};
pub use record::{CacheReference, ChangedKeys, FieldRef, Record, RecordSet, RecordValue};
pub use storage::{EvictionPolicy, MemoryStore, NormalizedStore, SqliteConfig, SqliteStore, StoreStats};

pub use gql_operation;
