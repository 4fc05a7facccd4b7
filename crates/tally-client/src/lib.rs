//! # tally-client
//!
//! GraphQL-over-HTTP implementation of [`tally_core::FacetTransport`].
//!
//! Aggregate counts use the mode's facet root field (`sceneFacets`,
//! `performerFacets`, ...) and per-entity counts use the mode's list query
//! with `{ count }`.

pub mod config;
pub mod documents;
pub mod transport;

pub use config::GraphqlConfig;
pub use transport::GraphqlTransport;
