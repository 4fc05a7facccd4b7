//! Structured logging schema and field name constants for tally.
//!
//! All crates use these constants for consistent structured logging fields.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, stale snapshot kept or zero count substituted |
//! | INFO  | Lifecycle events (service start/stop, cache clear) |
//! | DEBUG | Decision points (debounce armed, cache hit, stale discard) |
//! | TRACE | Per-item iteration (individual counts, queued requests) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "cache", "scheduler", "engine", "client"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "debouncer", "batch", "service", "graphql"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "fetch_facets", "count_matching", "merge"
pub const OPERATION: &str = "op";

// ─── Facet fields ──────────────────────────────────────────────────────────

/// Result-set mode ("scenes", "performers", ...).
pub const MODE: &str = "mode";

/// Filter fingerprint (short form).
pub const FINGERPRINT: &str = "fingerprint";

/// Facet category name.
pub const CATEGORY: &str = "category";

/// Engine-local fetch sequence number.
pub const FETCH_ID: &str = "fetch_id";

/// Fetch kind ("full", "incremental").
pub const FETCH_KIND: &str = "fetch_kind";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of entries produced by a fetch or merge.
pub const RESULT_COUNT: &str = "result_count";

/// Number of requests in a batch chunk.
pub const CHUNK_SIZE: &str = "chunk_size";

/// Number of outstanding fetches.
pub const IN_FLIGHT: &str = "in_flight";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
