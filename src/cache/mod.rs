//! Cache facade
//!
//! [`NormalizedCache`] ties a storage backend, a key resolver and custom
//! scalar adapters together: normalize-and-merge on write, reconstructing
//! reads, watchers and fetch policies.

mod fetch_policy;
mod store;
mod watch;

pub use fetch_policy::{DataSource, FetchPolicy, FetchResult, NetworkFetcher};
pub use store::NormalizedCache;
pub use watch::{WatchCallback, WatchId};
