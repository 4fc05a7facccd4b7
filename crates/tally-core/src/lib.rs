//! # tally-core
//!
//! Core types, traits, and abstractions for tally, the facet-count cache of
//! a media library browser.
//!
//! This crate provides the filter model, its fingerprint, facet categories and
//! mode profiles, the immutable count snapshot, and the transport trait every
//! other tally crate builds on.

pub mod defaults;
pub mod error;
pub mod facets;
pub mod filter;
pub mod fingerprint;
pub mod logging;
pub mod modes;
pub mod query;
pub mod snapshot;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use facets::{FacetCategory, FacetKind};
pub use filter::{
    Criterion, CriterionModifier, CriterionValue, DisplayMode, FilterSpec, LabeledId,
    SortDirection,
};
pub use fingerprint::{fingerprint, Fingerprint};
pub use modes::{ModeProfile, ResultMode};
pub use query::{CountQuery, FacetQuery, FacetResponse};
pub use snapshot::{BooleanCounts, FacetCountEntry, FacetCounts, FacetCountsSnapshot};
pub use traits::FacetTransport;
