//! Centralized default constants for tally.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// CACHE
// =============================================================================

/// Time-to-live for cached counts and snapshots, in seconds (5 minutes).
pub const CACHE_TTL_SECS: u64 = 300;

// =============================================================================
// FILTER-CHANGE DEBOUNCE
// =============================================================================

/// Settling window for filter-change fetches in milliseconds.
///
/// Must stay within `FILTER_DEBOUNCE_MIN_MS..=FILTER_DEBOUNCE_MAX_MS`.
pub const FILTER_DEBOUNCE_MS: u64 = 400;

/// Lower bound accepted for the filter-change window.
pub const FILTER_DEBOUNCE_MIN_MS: u64 = 300;

/// Upper bound accepted for the filter-change window.
pub const FILTER_DEBOUNCE_MAX_MS: u64 = 500;

// =============================================================================
// PER-ENTITY BATCHING
// =============================================================================

/// Coalescing window for per-entity count requests in milliseconds.
pub const BATCH_DEBOUNCE_MS: u64 = 500;

/// Number of per-entity requests committed per chunk.
pub const BATCH_SIZE: usize = 10;

/// Maximum simultaneous outstanding per-entity fetches.
pub const BATCH_MAX_CONCURRENT: usize = 4;

/// Pause between chunks in milliseconds.
pub const BATCH_CHUNK_PAUSE_MS: u64 = 100;

// =============================================================================
// AGGREGATE QUERIES
// =============================================================================

/// Maximum entries requested per labelled facet list.
pub const FACET_LIMIT: u32 = 100;

/// Capacity of the service command channel.
pub const COMMAND_CAPACITY: usize = 64;

// =============================================================================
// TRANSPORT
// =============================================================================

/// Default GraphQL endpoint base URL.
pub const GRAPHQL_URL: &str = "http://localhost:9999";

/// Default HTTP request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
