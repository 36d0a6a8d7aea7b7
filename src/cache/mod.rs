//! Result cache with staleness, in-flight coalescing and garbage collection.
//!
//! This module is agnostic of what is being cached:
//! - Entries are keyed by `QueryKey` and hold the last successful value
//! - Fresh entries are served without a network call
//! - Concurrent requests for one key share a single fetch
//! - Failures never evict data that was already cached

mod entry;
mod layer;
mod store;

pub use entry::{CacheEntry, FetchStatus, Lookup, PendingFetch};
pub use layer::{CacheOptions, Observer, QueryCache};
