//! Scripted in-memory transport for deterministic testing.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_engine::mock::MockTransport;
//!
//! let transport = MockTransport::new()
//!     .with_response(ResultMode::Scenes, FacetResponse::new().with(FacetCategory::Tags, json!([])))
//!     .with_latency(Duration::from_millis(50));
//!
//! // ... drive the service ...
//! assert_eq!(transport.facet_call_count(), 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use tally_core::{
    CountQuery, Error, FacetCategory, FacetQuery, FacetResponse, FacetTransport, Result,
    ResultMode,
};

/// One call made against the mock.
#[derive(Debug, Clone)]
pub enum MockCall {
    Facets(FacetQuery),
    Count(CountQuery),
}

#[derive(Debug, Default)]
struct MockState {
    responses: HashMap<ResultMode, FacetResponse>,
    /// Responses keyed by search term, checked before `responses`.
    search_responses: HashMap<String, FacetResponse>,
    counts: HashMap<(FacetCategory, String), u64>,
    unsupported: HashSet<(ResultMode, FacetCategory)>,
    /// Latency overrides keyed by search term.
    search_latency: HashMap<String, Duration>,
    latency: Duration,
    fail_next: usize,
    panic_next: usize,
    calls: Vec<MockCall>,
    outstanding: usize,
    max_outstanding: usize,
}

/// Mock counting backend. Cloning shares state.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate response returned for `mode`.
    pub fn with_response(self, mode: ResultMode, response: FacetResponse) -> Self {
        self.set_response(mode, response);
        self
    }

    /// Aggregate response for queries carrying this search term.
    pub fn with_search_response(self, search: impl Into<String>, response: FacetResponse) -> Self {
        self.lock().search_responses.insert(search.into(), response);
        self
    }

    /// Count returned by `count_matching` for one value (others get zero).
    pub fn with_count(self, category: FacetCategory, key: impl Into<String>, count: u64) -> Self {
        self.lock().counts.insert((category, key.into()), count);
        self
    }

    /// Simulated latency for every call.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    /// Latency for aggregate queries carrying this search term.
    pub fn with_search_latency(self, search: impl Into<String>, latency: Duration) -> Self {
        self.lock().search_latency.insert(search.into(), latency);
        self
    }

    /// Report `category` as unavailable through the bulk endpoint.
    pub fn without_bulk(self, mode: ResultMode, category: FacetCategory) -> Self {
        self.lock().unsupported.insert((mode, category));
        self
    }

    /// Replace the response for `mode` between fetches.
    pub fn set_response(&self, mode: ResultMode, response: FacetResponse) {
        self.lock().responses.insert(mode, response);
    }

    /// Fail the next `n` calls.
    pub fn fail_next(&self, n: usize) {
        self.lock().fail_next = n;
    }

    /// Panic inside the next `n` calls, as a crashing backend client would.
    pub fn panic_next(&self, n: usize) {
        self.lock().panic_next = n;
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Aggregate queries received, in order.
    pub fn facet_queries(&self) -> Vec<FacetQuery> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                MockCall::Facets(q) => Some(q.clone()),
                MockCall::Count(_) => None,
            })
            .collect()
    }

    pub fn facet_call_count(&self) -> usize {
        self.facet_queries().len()
    }

    pub fn count_call_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, MockCall::Count(_)))
            .count()
    }

    /// Highest number of calls outstanding at once.
    pub fn max_outstanding(&self) -> usize {
        self.lock().max_outstanding
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log the call and return its latency and scripted fault.
    fn begin(&self, call: MockCall) -> (Duration, Fault) {
        let mut state = self.lock();
        let latency = match &call {
            MockCall::Facets(q) => q
                .search
                .as_ref()
                .and_then(|s| state.search_latency.get(s).copied())
                .unwrap_or(state.latency),
            MockCall::Count(_) => state.latency,
        };
        state.calls.push(call);
        state.outstanding += 1;
        state.max_outstanding = state.max_outstanding.max(state.outstanding);
        let fault = if state.panic_next > 0 {
            state.panic_next -= 1;
            Fault::Panic
        } else if state.fail_next > 0 {
            state.fail_next -= 1;
            Fault::Fail
        } else {
            Fault::None
        };
        (latency, fault)
    }

    fn end(&self) {
        let mut state = self.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
    }

    async fn simulate_latency(latency: Duration) {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    None,
    Fail,
    Panic,
}

impl Fault {
    fn apply(self) -> Result<()> {
        match self {
            Fault::None => Ok(()),
            Fault::Fail => Err(Error::Transport("Simulated failure".into())),
            Fault::Panic => panic!("simulated transport crash"),
        }
    }
}

#[async_trait]
impl FacetTransport for MockTransport {
    async fn fetch_facets(&self, query: &FacetQuery) -> Result<FacetResponse> {
        let (latency, fault) = self.begin(MockCall::Facets(query.clone()));
        Self::simulate_latency(latency).await;
        self.end();
        fault.apply()?;
        let state = self.lock();
        let response = query
            .search
            .as_ref()
            .and_then(|s| state.search_responses.get(s))
            .or_else(|| state.responses.get(&query.mode))
            .cloned()
            .unwrap_or_default();
        Ok(response)
    }

    async fn count_matching(&self, query: &CountQuery) -> Result<u64> {
        let (latency, fault) = self.begin(MockCall::Count(query.clone()));
        Self::simulate_latency(latency).await;
        self.end();
        fault.apply()?;
        Ok(self
            .lock()
            .counts
            .get(&(query.category, query.key.clone()))
            .copied()
            .unwrap_or(0))
    }

    fn supports_bulk(&self, mode: ResultMode, category: FacetCategory) -> bool {
        !self.lock().unsupported.contains(&(mode, category))
    }
}
