//! # tally-cache
//!
//! Time-to-live cache for facet counts, keyed by filter fingerprint.

pub mod cache;

pub use cache::{CacheStats, FacetCache};
