//! Core traits for tally abstractions.
//!
//! The counting backend is a black box behind [`FacetTransport`]; concrete
//! implementations live in `tally-client` (HTTP) and `tally-engine` (mock).

use async_trait::async_trait;

use crate::error::Result;
use crate::facets::FacetCategory;
use crate::modes::ResultMode;
use crate::query::{CountQuery, FacetQuery, FacetResponse};

/// Request/response access to the backend's counting endpoints.
#[async_trait]
pub trait FacetTransport: Send + Sync {
    /// Run the aggregate facet query for a mode.
    async fn fetch_facets(&self, query: &FacetQuery) -> Result<FacetResponse>;

    /// Total results of the list query with one category pinned to one value.
    async fn count_matching(&self, query: &CountQuery) -> Result<u64>;

    /// Whether `fetch_facets` can count `category` for `mode`.
    ///
    /// Categories without bulk support are resolved one value at a time
    /// through `count_matching`.
    fn supports_bulk(&self, _mode: ResultMode, _category: FacetCategory) -> bool {
        true
    }
}
