//! # tally-scheduler
//!
//! Timing policy for count fetches:
//!
//! - [`Debouncer`]: trailing-edge settling window for filter changes, keyed by
//!   fingerprint so returning to the committed filter costs nothing.
//! - [`BatchScheduler`]: coalesces per-entity count requests into chunks and
//!   bounds how many run at once.

pub mod batch;
pub mod debounce;

pub use batch::{BatchConfig, BatchScheduler, BatchStats, PendingKey};
pub use debounce::{DebounceDecision, Debouncer};
