//! Normalized records
//!
//! A record is the flat, identity-keyed form of one response object. Fields
//! hold scalars, lists, or weak references to other records by key.

mod entry;
mod field_ref;
mod merger;
mod record_set;
mod value;

pub use entry::{Record, RecordBuilder};
pub use field_ref::{ChangedKeys, FieldRef};
pub use merger::{merge_record, MergeOutcome};
pub use record_set::RecordSet;
pub use value::{CacheReference, RecordValue};
