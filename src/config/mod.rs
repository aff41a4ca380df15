//! Configuration system
//!
//! Loads ~/.config/normcache/config.yaml with support for:
//! - Backend selection (memory, sqlite, two-tier)
//! - Size, entry-count and expiry bounds for the in-memory tier
//! - SQLite location and connection settings
//! - Cache key resolution strategy

mod cache_config;
pub mod validation;

pub use cache_config::{BackendKind, CacheConfig, EvictionConfig, ResolverConfig};
pub use validation::{validate_config, validate_config_result, ValidationError};
