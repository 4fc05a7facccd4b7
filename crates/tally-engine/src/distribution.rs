//! Shared read-only fan-out of the active mode's counts.
//!
//! Every filter widget under one list view holds a [`FacetSubscriber`] on the
//! same [`FacetDistributionContext`]. Widgets never fetch; they read the
//! latest published [`FacetDistribution`] and wait for the next one.

use std::cmp::Ordering;
use std::sync::Arc;

use tokio::sync::watch;

use tally_core::{
    BooleanCounts, Error, FacetCategory, FacetCounts, FacetCountsSnapshot, LabeledId, Result,
    ResultMode,
};

/// The value every subscriber sees: `{ counts, loading }` for one mode.
#[derive(Debug, Clone)]
pub struct FacetDistribution {
    pub mode: ResultMode,
    pub counts: Arc<FacetCountsSnapshot>,
    /// A newer filter is settling or being fetched; `counts` may be stale.
    pub loading: bool,
    /// Number of publishes before this one. Set by the context.
    pub version: u64,
}

impl FacetDistribution {
    pub fn new(mode: ResultMode, counts: Arc<FacetCountsSnapshot>, loading: bool) -> Self {
        Self {
            mode,
            counts,
            loading,
            version: 0,
        }
    }

    pub fn empty(mode: ResultMode) -> Self {
        Self::new(mode, Arc::new(FacetCountsSnapshot::empty(mode)), false)
    }

    fn same_as(&self, other: &FacetDistribution) -> bool {
        self.mode == other.mode
            && self.loading == other.loading
            && Arc::ptr_eq(&self.counts, &other.counts)
    }
}

/// Publishing side of the distribution.
#[derive(Clone)]
pub struct FacetDistributionContext {
    tx: Arc<watch::Sender<FacetDistribution>>,
}

impl FacetDistributionContext {
    pub fn new(mode: ResultMode) -> Self {
        let (tx, _rx) = watch::channel(FacetDistribution::empty(mode));
        Self { tx: Arc::new(tx) }
    }

    /// Publish a value, skipping it if nothing observable changed.
    ///
    /// Returns whether subscribers were notified.
    pub fn publish(&self, mut next: FacetDistribution) -> bool {
        self.tx.send_if_modified(|current| {
            if current.same_as(&next) {
                return false;
            }
            next.version = current.version + 1;
            *current = next.clone();
            true
        })
    }

    pub fn subscribe(&self) -> FacetSubscriber {
        FacetSubscriber {
            rx: self.tx.subscribe(),
        }
    }

    pub fn current(&self) -> FacetDistribution {
        self.tx.borrow().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A candidate value with its count, for filter pickers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedCandidate {
    pub id: String,
    pub label: Option<String>,
    /// `None` when the count is unknown.
    pub count: Option<u64>,
}

/// Read handle held by one filter widget.
#[derive(Clone)]
pub struct FacetSubscriber {
    rx: watch::Receiver<FacetDistribution>,
}

impl FacetSubscriber {
    /// Latest published value; marks it seen.
    pub fn current(&mut self) -> FacetDistribution {
        self.rx.borrow_and_update().clone()
    }

    /// Latest published value without marking it seen.
    pub fn peek(&self) -> FacetDistribution {
        self.rx.borrow().clone()
    }

    /// Wait for the next publish.
    pub async fn changed(&mut self) -> Result<()> {
        self.rx.changed().await.map_err(|_| Error::Closed)
    }

    /// Wait until a published value satisfies `predicate`, returning it.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&FacetDistribution) -> bool,
    ) -> Result<FacetDistribution> {
        let value = self
            .rx
            .wait_for(|d| predicate(d))
            .await
            .map_err(|_| Error::Closed)?;
        Ok(value.clone())
    }

    pub fn loading(&self) -> bool {
        self.rx.borrow().loading
    }

    pub fn publish_count(&self) -> u64 {
        self.rx.borrow().version
    }

    /// Count for one value; `None` means unknown, not zero.
    pub fn count(&self, category: FacetCategory, key: &str) -> Option<u64> {
        self.rx.borrow().counts.count(category, key)
    }

    pub fn boolean(&self, category: FacetCategory) -> Option<BooleanCounts> {
        match self.rx.borrow().counts.get(category)? {
            FacetCounts::Boolean(pair) => Some(*pair),
            FacetCounts::Entries(_) => None,
        }
    }

    /// Attach counts to picker candidates, most matches first.
    ///
    /// Candidates with unknown counts sort after known ones, then by label.
    /// A missing candidate label falls back to the label the backend returned.
    pub fn annotate(
        &self,
        category: FacetCategory,
        candidates: impl IntoIterator<Item = LabeledId>,
    ) -> Vec<AnnotatedCandidate> {
        let distribution = self.rx.borrow();
        let mut annotated: Vec<AnnotatedCandidate> = candidates
            .into_iter()
            .map(|candidate| {
                let entry = distribution.counts.entry(category, &candidate.id);
                let count = distribution.counts.count(category, &candidate.id);
                let label = candidate
                    .label
                    .or_else(|| entry.and_then(|e| e.label.clone()));
                AnnotatedCandidate {
                    id: candidate.id,
                    label,
                    count,
                }
            })
            .collect();
        drop(distribution);

        annotated.sort_by(|a, b| {
            let by_count = match (a.count, b.count) {
                (Some(x), Some(y)) => y.cmp(&x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            by_count.then_with(|| a.label.cmp(&b.label)).then_with(|| a.id.cmp(&b.id))
        });
        annotated
    }
}
