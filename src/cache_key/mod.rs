//! Cache identity
//!
//! Field keys name a field within a record; record keys name the record an
//! object normalizes into. Both the normalizer and the reader compute them
//! through this module so a write and a later read always agree.

mod builder;
mod resolver;

pub use builder::field_key;
pub use resolver::{
    CacheKey, CacheKeyResolver, FnKeyResolver, NoKeyResolver, TypeFieldsResolver,
    TypenameIdResolver,
};
