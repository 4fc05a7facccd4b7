//! # tally-engine
//!
//! Facet-count orchestration for tally.
//!
//! - [`FacetCountsEngine`]: per-mode state machine (debounce, lazy facets,
//!   cache use, stale-result discard). Performs no I/O.
//! - [`FacetDistributionContext`] / [`FacetSubscriber`]: one shared
//!   `{ counts, loading }` value fanned out to every filter widget.
//! - [`FacetCountsService`] / [`FacetCountsHandle`]: tokio task driving the
//!   engines against a [`tally_core::FacetTransport`].
//! - [`mock::MockTransport`]: scripted transport for tests.

pub mod config;
pub mod distribution;
pub mod engine;
pub mod mapper;
pub mod mock;
pub mod service;

pub use config::EngineConfig;
pub use distribution::{
    AnnotatedCandidate, FacetDistribution, FacetDistributionContext, FacetSubscriber,
};
pub use engine::{EntityCountPlan, FacetCountsEngine, FetchKind, FetchOutcome, FetchTicket};
pub use service::{FacetCountsHandle, FacetCountsService};
