//! Record identity resolution

use gql_operation::{Field, Variables};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a response object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Globally unique record key, shared across queries
    Key(String),
    /// No stable identity; the object is keyed by its path under its parent
    NoKey,
}

impl CacheKey {
    pub fn key(key: impl Into<String>) -> Self {
        CacheKey::Key(key.into())
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            CacheKey::Key(k) => Some(k),
            CacheKey::NoKey => None,
        }
    }
}

/// Maps response objects to record keys
///
/// Implementations must be deterministic over the object's visible fields.
pub trait CacheKeyResolver: Send + Sync {
    /// Identity of an object found in a response under `field`
    fn resolve(&self, field: &Field, object: &Map<String, Value>) -> CacheKey;

    /// Identity implied by a field's arguments alone
    ///
    /// Lets a read follow `hero(id: "2001")` to `Droid.2001` even when this
    /// query never fetched it. Defaults to no redirect.
    fn from_field_arguments(&self, _field: &Field, _variables: &Variables) -> CacheKey {
        CacheKey::NoKey
    }
}

/// Never assigns identity; every object is keyed by its path
#[derive(Debug, Clone, Copy, Default)]
pub struct NoKeyResolver;

impl CacheKeyResolver for NoKeyResolver {
    fn resolve(&self, _field: &Field, _object: &Map<String, Value>) -> CacheKey {
        CacheKey::NoKey
    }
}

/// Keys objects as `Typename.id`
///
/// Objects lacking either `__typename` or the id field get no key.
#[derive(Debug, Clone)]
pub struct TypenameIdResolver {
    id_field: String,
}

impl TypenameIdResolver {
    pub fn new() -> Self {
        Self::with_id_field("id")
    }

    pub fn with_id_field(id_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
        }
    }
}

impl Default for TypenameIdResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheKeyResolver for TypenameIdResolver {
    fn resolve(&self, _field: &Field, object: &Map<String, Value>) -> CacheKey {
        let typename = object.get("__typename").and_then(Value::as_str);
        let id = object.get(&self.id_field).and_then(id_text);
        match (typename, id) {
            (Some(typename), Some(id)) => CacheKey::Key(format!("{}.{}", typename, id)),
            _ => CacheKey::NoKey,
        }
    }
}

/// Per-type key fields, e.g. `User` keyed by `login`
///
/// Keys are `Typename.value` or `Typename.value1.value2` for compound keys.
/// Redirect rules map a field name to the typename its `id` argument keys.
#[derive(Debug, Clone, Default)]
pub struct TypeFieldsResolver {
    key_fields: BTreeMap<String, Vec<String>>,
    default_id_field: Option<String>,
    redirects: BTreeMap<String, String>,
}

impl TypeFieldsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key objects of `typename` by the given fields
    pub fn with_type(mut self, typename: impl Into<String>, fields: Vec<String>) -> Self {
        self.key_fields.insert(typename.into(), fields);
        self
    }

    /// Fallback id field for types without an explicit rule
    pub fn with_default_id_field(mut self, field: impl Into<String>) -> Self {
        self.default_id_field = Some(field.into());
        self
    }

    /// Resolve reads of `field_name(id: ...)` to `typename.<id>`
    pub fn with_redirect(mut self, field_name: impl Into<String>, typename: impl Into<String>) -> Self {
        self.redirects.insert(field_name.into(), typename.into());
        self
    }

    fn key_for(&self, typename: &str, object: &Map<String, Value>) -> Option<String> {
        let parts: Option<Vec<String>> = match self.key_fields.get(typename) {
            Some(fields) => fields
                .iter()
                .map(|f| object.get(f).and_then(id_text))
                .collect(),
            None => {
                let field = self.default_id_field.as_ref()?;
                object.get(field).and_then(id_text).map(|id| vec![id])
            }
        };
        parts
            .filter(|p| !p.is_empty())
            .map(|p| format!("{}.{}", typename, p.join(".")))
    }
}

impl CacheKeyResolver for TypeFieldsResolver {
    fn resolve(&self, _field: &Field, object: &Map<String, Value>) -> CacheKey {
        object
            .get("__typename")
            .and_then(Value::as_str)
            .and_then(|typename| self.key_for(typename, object))
            .map(CacheKey::Key)
            .unwrap_or(CacheKey::NoKey)
    }

    fn from_field_arguments(&self, field: &Field, variables: &Variables) -> CacheKey {
        let Some(typename) = self.redirects.get(&field.field_name) else {
            return CacheKey::NoKey;
        };
        field
            .arguments
            .get("id")
            .map(|arg| arg.resolve(variables))
            .and_then(|value| id_text(&value))
            .map(|id| CacheKey::Key(format!("{}.{}", typename, id)))
            .unwrap_or(CacheKey::NoKey)
    }
}

type RecordSetFn = dyn Fn(&Field, &Map<String, Value>) -> CacheKey + Send + Sync;
type ArgumentsFn = dyn Fn(&Field, &Variables) -> CacheKey + Send + Sync;

/// Resolver built from closures, for deployment-specific rules
pub struct FnKeyResolver {
    record_set: Box<RecordSetFn>,
    arguments: Option<Box<ArgumentsFn>>,
}

impl FnKeyResolver {
    pub fn new<F>(record_set: F) -> Self
    where
        F: Fn(&Field, &Map<String, Value>) -> CacheKey + Send + Sync + 'static,
    {
        Self {
            record_set: Box::new(record_set),
            arguments: None,
        }
    }

    pub fn with_arguments<F>(mut self, arguments: F) -> Self
    where
        F: Fn(&Field, &Variables) -> CacheKey + Send + Sync + 'static,
    {
        self.arguments = Some(Box::new(arguments));
        self
    }
}

impl fmt::Debug for FnKeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnKeyResolver")
            .field("redirects", &self.arguments.is_some())
            .finish()
    }
}

impl CacheKeyResolver for FnKeyResolver {
    fn resolve(&self, field: &Field, object: &Map<String, Value>) -> CacheKey {
        (self.record_set)(field, object)
    }

    fn from_field_arguments(&self, field: &Field, variables: &Variables) -> CacheKey {
        match &self.arguments {
            Some(arguments) => arguments(field, variables),
            None => CacheKey::NoKey,
        }
    }
}

/// String form of an identifier value; ids may arrive as strings or numbers
fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
