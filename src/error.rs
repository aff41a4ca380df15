//! Error types for normcache
//!
//! One enum covers every failure mode of the cache: read misses, corrupt
//! records, rolled-back transactions, degraded two-tier writes, and the
//! underlying I/O, database and serialization errors.

use crate::record::ChangedKeys;
use thiserror::Error;

/// Result type alias for normcache operations
pub type Result<T> = std::result::Result<T, NormCacheError>;

/// Comprehensive error type for normcache operations
#[derive(Error, Debug)]
pub enum NormCacheError {
    /// A required record or field is not in the cache
    #[error("Cache miss: {}", describe_miss(.record_key, .field_key.as_deref()))]
    CacheMiss {
        record_key: String,
        field_key: Option<String>,
    },

    /// A stored value does not have the shape the field tree expects
    #[error("Corrupt record {record_key}: field {field_key} expected {expected}, found {found}")]
    CorruptRecord {
        record_key: String,
        field_key: String,
        expected: String,
        found: String,
    },

    /// A durable batch merge failed and was rolled back
    #[error("Merge transaction rolled back: {0}")]
    MergeTransaction(String),

    /// Two-tier write reached the primary tier but not the secondary
    #[error("Secondary cache write failed ({} fields still merged in primary): {message}", .changed.len())]
    SecondaryWrite {
        changed: ChangedKeys,
        message: String,
    },

    /// The response tree does not match the operation's field tree
    #[error("Invalid response at {path}: {message}")]
    InvalidResponse { path: String, message: String },

    /// Operation building or custom scalar conversion errors
    #[error("Operation error: {0}")]
    Operation(#[from] gql_operation::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage backend errors outside a merge transaction
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

fn describe_miss(record_key: &str, field_key: Option<&str>) -> String {
    match field_key {
        Some(field) => format!("field {} of record {}", field, record_key),
        None => format!("record {}", record_key),
    }
}

impl NormCacheError {
    pub fn record_miss(record_key: impl Into<String>) -> Self {
        NormCacheError::CacheMiss {
            record_key: record_key.into(),
            field_key: None,
        }
    }

    pub fn field_miss(record_key: impl Into<String>, field_key: impl Into<String>) -> Self {
        NormCacheError::CacheMiss {
            record_key: record_key.into(),
            field_key: Some(field_key.into()),
        }
    }

    /// Whether falling back to the network can recover from this error
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, NormCacheError::CacheMiss { .. })
    }

    /// Whether the write took effect in memory but not durably
    pub fn is_degraded(&self) -> bool {
        matches!(self, NormCacheError::SecondaryWrite { .. })
    }

    /// Changed keys carried by a degraded write
    pub fn changed_keys(&self) -> Option<&ChangedKeys> {
        match self {
            NormCacheError::SecondaryWrite { changed, .. } => Some(changed),
            _ => None,
        }
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            NormCacheError::CacheMiss { .. } => "cache_miss",
            NormCacheError::CorruptRecord { .. } => "corrupt_record",
            NormCacheError::MergeTransaction(_) => "merge_transaction",
            NormCacheError::SecondaryWrite { .. } => "secondary_write",
            NormCacheError::InvalidResponse { .. } => "invalid_response",
            NormCacheError::Operation(_) => "operation",
            NormCacheError::Config(_) => "config",
            NormCacheError::Storage(_) => "storage",
            NormCacheError::Io(_) => "io",
            NormCacheError::Json(_) => "json",
            NormCacheError::Yaml(_) => "yaml",
            NormCacheError::Database(_) => "database",
            NormCacheError::Other(_) => "other",
        }
    }
}
