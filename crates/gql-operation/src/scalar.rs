//! Custom scalar adapters

use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Converts a custom scalar between its source (wire/cache) form and the
/// representation handed to application code
pub trait CustomScalarAdapter: Send + Sync {
    /// Source form to application form
    fn decode(&self, value: &Value) -> Result<Value>;

    /// Application form to source form
    fn encode(&self, value: &Value) -> Result<Value>;
}

/// Registry of adapters keyed by scalar type name
///
/// Scalars without a registered adapter pass through unchanged.
#[derive(Clone, Default)]
pub struct ScalarAdapters {
    adapters: HashMap<String, Arc<dyn CustomScalarAdapter>>,
}

impl ScalarAdapters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous one for the same type
    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        adapter: Arc<dyn CustomScalarAdapter>,
    ) {
        self.adapters.insert(type_name.into(), adapter);
    }

    pub fn with(mut self, type_name: impl Into<String>, adapter: Arc<dyn CustomScalarAdapter>) -> Self {
        self.register(type_name, adapter);
        self
    }

    pub fn get(&self, type_name: &str) -> Option<&Arc<dyn CustomScalarAdapter>> {
        self.adapters.get(type_name)
    }

    pub fn decode(&self, type_name: &str, value: &Value) -> Result<Value> {
        match self.adapters.get(type_name) {
            Some(adapter) => adapter.decode(value),
            None => Ok(value.clone()),
        }
    }

    pub fn encode(&self, type_name: &str, value: &Value) -> Result<Value> {
        match self.adapters.get(type_name) {
            Some(adapter) => adapter.encode(value),
            None => Ok(value.clone()),
        }
    }
}

impl fmt::Debug for ScalarAdapters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.adapters.keys().collect();
        names.sort();
        f.debug_struct("ScalarAdapters")
            .field("types", &names)
            .finish()
    }
}
