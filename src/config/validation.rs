//! Configuration validation
//!
//! Validates normcache configuration for correctness:
//! - Eviction bounds are non-zero when set
//! - Durable backends have a database path
//! - Key resolver strategies name at least one key field

use super::cache_config::{BackendKind, CacheConfig, ResolverConfig};
use crate::NormCacheError;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub context: Option<String>,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            context: None,
            field: field.into(),
            message: message.into(),
        }
    }

    fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref ctx) = self.context {
            write!(f, "[{}] {}: {}", ctx, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a normcache configuration
pub fn validate_config(config: &CacheConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.eviction.max_size_bytes == Some(0) {
        errors.push(ValidationError::new(
            "eviction.max_size_bytes",
            "Size budget must be greater than 0 (omit it for no bound)",
        ));
    }

    if config.eviction.max_entries == Some(0) {
        errors.push(ValidationError::new(
            "eviction.max_entries",
            "Entry budget must be greater than 0 (omit it for no bound)",
        ));
    }

    if config.eviction.expire_after_secs == Some(0) {
        errors.push(ValidationError::new(
            "eviction.expire_after_secs",
            "Expiry must be at least one second",
        ));
    }

    if config.backend == BackendKind::Sqlite && !config.eviction.policy().is_unbounded() {
        tracing::warn!("Eviction settings only apply to the in-memory tier and are ignored by the sqlite backend");
    }

    if matches!(config.backend, BackendKind::Sqlite | BackendKind::TwoTier)
        && config.sqlite.path.as_os_str().is_empty()
    {
        errors.push(ValidationError::new(
            "sqlite.path",
            "A database path is required for the sqlite and two_tier backends",
        ));
    }

    if let Err(mut resolver_errors) = validate_resolver(&config.resolver) {
        errors.append(&mut resolver_errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the key resolver strategy
fn validate_resolver(resolver: &ResolverConfig) -> ValidationResult {
    let mut errors = Vec::new();

    match resolver {
        ResolverConfig::Path => {}
        ResolverConfig::TypenameId { id_field } => {
            if id_field.is_empty() {
                errors.push(ValidationError::new(
                    "resolver.id_field",
                    "Identity field name cannot be empty",
                ));
            }
        }
        ResolverConfig::TypeFields {
            types,
            default_id_field,
            redirects,
        } => {
            for (typename, fields) in types {
                if typename.is_empty() {
                    errors.push(ValidationError::new("resolver.types", "Type name cannot be empty"));
                }
                if fields.is_empty() {
                    errors.push(
                        ValidationError::new("resolver.types", "At least one key field must be listed")
                            .with_context(typename),
                    );
                }
                if fields.iter().any(|f| f.is_empty()) {
                    errors.push(
                        ValidationError::new("resolver.types", "Key field names cannot be empty")
                            .with_context(typename),
                    );
                }
            }

            if default_id_field.as_deref() == Some("") {
                errors.push(ValidationError::new(
                    "resolver.default_id_field",
                    "Default identity field cannot be empty",
                ));
            }

            for (field_name, typename) in redirects {
                if typename.is_empty() {
                    errors.push(
                        ValidationError::new("resolver.redirects", "Redirect target type cannot be empty")
                            .with_context(field_name),
                    );
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate configuration and return a Result
pub fn validate_config_result(config: &CacheConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        NormCacheError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}
