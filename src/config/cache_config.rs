//! normcache configuration file handling
//!
//! Loads and manages ~/.config/normcache/config.yaml: which backend to build,
//! its eviction bounds, and how records are keyed.

use crate::cache_key::{CacheKeyResolver, NoKeyResolver, TypeFieldsResolver, TypenameIdResolver};
use crate::storage::{EvictionPolicy, ExpireBasis, MemoryStore, NormalizedStore, SqliteConfig, SqliteStore};
use crate::{NormalizedCache, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Storage topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Bounded in-memory store only
    #[default]
    Memory,
    /// SQLite only
    Sqlite,
    /// In-memory primary over SQLite secondary
    TwoTier,
}

/// Eviction bounds for the in-memory tier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,

    /// Expiry in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_after_secs: Option<u64>,

    #[serde(default)]
    pub expire_basis: ExpireBasis,
}

impl EvictionConfig {
    pub fn policy(&self) -> EvictionPolicy {
        let mut policy = EvictionPolicy::unbounded();
        if let Some(bytes) = self.max_size_bytes {
            policy = policy.with_max_size_bytes(bytes);
        }
        if let Some(entries) = self.max_entries {
            policy = policy.with_max_entries(entries);
        }
        if let Some(secs) = self.expire_after_secs {
            let ttl = Duration::from_secs(secs);
            policy = match self.expire_basis {
                ExpireBasis::SinceWrite => policy.expire_after_write(ttl),
                ExpireBasis::SinceAccess => policy.expire_after_access(ttl),
            };
        }
        policy
    }
}

/// Key resolution strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ResolverConfig {
    /// Every object keyed by its path
    Path,
    /// `Typename.<id_field>`
    TypenameId {
        #[serde(default = "default_id_field")]
        id_field: String,
    },
    /// Per-type key fields and argument redirects
    TypeFields {
        #[serde(default)]
        types: BTreeMap<String, Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_id_field: Option<String>,
        /// Field name to the typename its `id` argument keys
        #[serde(default)]
        redirects: BTreeMap<String, String>,
    },
}

fn default_id_field() -> String {
    "id".to_string()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig::TypenameId {
            id_field: default_id_field(),
        }
    }
}

/// normcache configuration
///
/// Represents the complete ~/.config/normcache/config.yaml file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default)]
    pub eviction: EvictionConfig,

    /// Durable store settings, used by `sqlite` and `two_tier`
    #[serde(default)]
    pub sqlite: SqliteConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the default path (~/.config/normcache/config.yaml)
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        Self::load(&path)
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::NormCacheError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading normcache configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            backend = ?config.backend,
            sqlite = %config.sqlite.path.display(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving normcache configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/normcache/config.yaml)
    pub fn default_path() -> PathBuf {
        // Always use ~/.config for consistency across platforms (macOS, Linux)
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("normcache");
        path.push("config.yaml");
        path
    }

    /// Construct the configured backend
    pub fn build_store(&self) -> Result<Arc<dyn NormalizedStore>> {
        let policy = self.eviction.policy();
        let store: Arc<dyn NormalizedStore> = match self.backend {
            BackendKind::Memory => Arc::new(MemoryStore::with_policy(policy)),
            BackendKind::Sqlite => Arc::new(SqliteStore::open(&self.sqlite)?),
            BackendKind::TwoTier => {
                let secondary = Arc::new(SqliteStore::open(&self.sqlite)?);
                Arc::new(MemoryStore::with_policy(policy).with_secondary(secondary))
            }
        };
        Ok(store)
    }

    /// Construct the configured key resolver
    pub fn build_resolver(&self) -> Arc<dyn CacheKeyResolver> {
        let resolver: Arc<dyn CacheKeyResolver> = match &self.resolver {
            ResolverConfig::Path => Arc::new(NoKeyResolver),
            ResolverConfig::TypenameId { id_field } => Arc::new(TypenameIdResolver::with_id_field(id_field.clone())),
            ResolverConfig::TypeFields {
                types,
                default_id_field,
                redirects,
            } => {
                let mut resolver = TypeFieldsResolver::new();
                for (typename, fields) in types {
                    resolver = resolver.with_type(typename.clone(), fields.clone());
                }
                if let Some(field) = default_id_field {
                    resolver = resolver.with_default_id_field(field.clone());
                }
                for (field_name, typename) in redirects {
                    resolver = resolver.with_redirect(field_name.clone(), typename.clone());
                }
                Arc::new(resolver)
            }
        };
        resolver
    }

    /// Store plus resolver as a ready cache
    pub fn build_cache(&self) -> Result<NormalizedCache> {
        Ok(NormalizedCache::new(self.build_store()?, self.build_resolver()))
    }
}
