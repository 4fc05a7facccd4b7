//! Per-mode facet-count state machine.
//!
//! [`FacetCountsEngine`] performs no I/O. Every transition is a method call
//! that may hand back a [`FetchTicket`]; the caller runs the query and feeds
//! the result back through [`FacetCountsEngine::on_fetch_complete`]. The
//! async driver lives in [`crate::service`].
//!
//! ```text
//! on_filter_changed ─► Debouncer ─(fire)─► commit ─► cache hit? ─► publish
//!                                                  └─► FetchTicket ─► transport
//! on_fetch_complete ─► fingerprint still committed? ─► merge ─► cache ─► publish
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use tally_cache::FacetCache;
use tally_core::{
    fingerprint, CountQuery, FacetCategory, FacetCountEntry, FacetCounts, FacetCountsSnapshot,
    FacetQuery, FacetResponse, FilterSpec, Fingerprint, Result, ResultMode,
};
use tally_scheduler::{DebounceDecision, Debouncer, PendingKey};

use crate::config::EngineConfig;
use crate::distribution::FacetDistribution;
use crate::mapper::map_response;

/// Whether a fetch replaces the snapshot or adds lazy categories to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Eager categories plus every expanded lazy category.
    Full,
    /// Only newly expanded lazy categories, merged into the snapshot.
    Incremental,
}

impl FetchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchKind::Full => "full",
            FetchKind::Incremental => "incremental",
        }
    }
}

/// A fetch the caller must run against the transport.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    pub id: u64,
    pub kind: FetchKind,
    pub fingerprint: Fingerprint,
    /// Categories this fetch will merge.
    pub categories: Vec<FacetCategory>,
    pub query: FacetQuery,
}

/// Result of feeding a completed fetch back in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Merged into the published snapshot.
    Merged,
    /// Lazy categories that arrived before the snapshot for their
    /// fingerprint; folded in when it lands.
    Staged,
    /// Issued for a fingerprint that is no longer committed.
    Discarded,
    /// The transport failed; the snapshot is unchanged.
    Failed,
    /// Not a fetch this engine issued (or already completed).
    Unknown,
}

#[derive(Debug)]
struct InFlight {
    kind: FetchKind,
    fingerprint: Fingerprint,
    categories: Vec<FacetCategory>,
    query: FacetQuery,
}

/// Counts for ids resolved one at a time.
#[derive(Debug, Clone)]
pub struct EntityCountPlan {
    pub mode: ResultMode,
    pub fingerprint: Fingerprint,
    pub category: FacetCategory,
    /// Fresh counts served from the cache.
    pub cached: Vec<(String, u64)>,
    /// Requests still to run through the batch scheduler.
    pub pending: Vec<(PendingKey, CountQuery)>,
}

/// Facet-count orchestration for one result mode.
pub struct FacetCountsEngine {
    mode: ResultMode,
    facet_limit: u32,
    cache: FacetCache,
    debouncer: Debouncer<FilterSpec>,
    active: bool,
    /// Latest filter seen, committed or not.
    latest: FilterSpec,
    /// Filter the current counts are for (or being fetched for).
    committed: Option<(Fingerprint, FilterSpec)>,
    expanded: BTreeSet<FacetCategory>,
    /// Categories the transport cannot count in bulk; left to entity counts.
    per_entity: BTreeSet<FacetCategory>,
    /// Lazy categories fetched or in flight for the committed fingerprint.
    requested_lazy: BTreeSet<FacetCategory>,
    snapshot: Arc<FacetCountsSnapshot>,
    staged: BTreeMap<FacetCategory, FacetCounts>,
    in_flight: HashMap<u64, InFlight>,
    next_fetch_id: u64,
}

impl FacetCountsEngine {
    /// Create a dormant engine for `mode`.
    pub fn new(mode: ResultMode, cache: FacetCache, config: &EngineConfig) -> Self {
        Self {
            mode,
            facet_limit: config.facet_limit,
            cache,
            debouncer: Debouncer::new(config.debounce),
            active: false,
            latest: FilterSpec::new(mode),
            committed: None,
            expanded: BTreeSet::new(),
            per_entity: BTreeSet::new(),
            requested_lazy: BTreeSet::new(),
            snapshot: Arc::new(FacetCountsSnapshot::empty(mode)),
            staged: BTreeMap::new(),
            in_flight: HashMap::new(),
            next_fetch_id: 1,
        }
    }

    /// Exclude categories from aggregate fetches; they are resolved through
    /// [`FacetCountsEngine::prepare_entity_counts`] instead.
    pub fn with_per_entity(mut self, categories: impl IntoIterator<Item = FacetCategory>) -> Self {
        self.per_entity = categories.into_iter().collect();
        self
    }

    pub fn mode(&self) -> ResultMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn snapshot(&self) -> Arc<FacetCountsSnapshot> {
        self.snapshot.clone()
    }

    pub fn committed_fingerprint(&self) -> Option<&Fingerprint> {
        self.committed.as_ref().map(|(fp, _)| fp)
    }

    pub fn expanded(&self) -> &BTreeSet<FacetCategory> {
        &self.expanded
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.next_deadline()
    }

    /// A timer is pending or a fetch for the committed filter is running.
    pub fn loading(&self) -> bool {
        if self.debouncer.is_pending() {
            return true;
        }
        let Some(committed) = self.committed_fingerprint() else {
            return false;
        };
        self.in_flight.values().any(|f| &f.fingerprint == committed)
    }

    pub fn distribution(&self) -> FacetDistribution {
        FacetDistribution::new(self.mode, self.snapshot.clone(), self.loading())
    }

    /// Record a new filter. Dormant engines only remember it.
    pub fn on_filter_changed(&mut self, spec: FilterSpec, now: Instant) -> Option<FetchTicket> {
        if spec.mode != self.mode {
            warn!(
                mode = %self.mode,
                filter_mode = %spec.mode,
                "Ignoring filter for another mode"
            );
            return None;
        }
        self.latest = spec.clone();
        if !self.active {
            return None;
        }

        let fp = fingerprint(&spec);
        match self.debouncer.submit(fp, spec, now, false) {
            DebounceDecision::Skip => None,
            DebounceDecision::Armed { deadline } => {
                debug!(
                    mode = %self.mode,
                    delay_ms = deadline.saturating_duration_since(now).as_millis() as u64,
                    "Debounce armed"
                );
                None
            }
            DebounceDecision::Fire(fp, spec) => self.commit(fp, spec, false),
        }
    }

    /// Fire the debounce timer if it is due.
    pub fn tick(&mut self, now: Instant) -> Option<FetchTicket> {
        let (fp, spec) = self.debouncer.poll_due(now)?;
        self.commit(fp, spec, false)
    }

    /// Activate or deactivate the mode.
    ///
    /// Activation commits the latest filter immediately. Deactivation drops
    /// an unfired timer; in-flight fetches still land.
    pub fn set_active(&mut self, active: bool, now: Instant) -> Option<FetchTicket> {
        if self.active == active {
            return None;
        }
        self.active = active;
        if !active {
            self.debouncer.cancel();
            debug!(mode = %self.mode, "Engine dormant");
            return None;
        }

        debug!(mode = %self.mode, "Engine active");
        let spec = self.latest.clone();
        let fp = fingerprint(&spec);
        match self.debouncer.submit(fp, spec, now, true) {
            DebounceDecision::Fire(fp, spec) => self.commit(fp, spec, false),
            _ => None,
        }
    }

    /// A filter section was expanded; lazy categories are fetched now.
    pub fn expand_section(&mut self, category: FacetCategory, now: Instant) -> Option<FetchTicket> {
        if !self.mode.profile().supports(category) {
            debug!(mode = %self.mode, %category, "Category not counted for mode");
            return None;
        }
        self.expanded.insert(category);
        if !category.is_lazy() || !self.active || self.per_entity.contains(&category) {
            return None;
        }

        // A settling filter would refetch anyway: fire it now as a full fetch.
        if let Some((fp, spec)) = self.debouncer.flush() {
            return self.commit(fp, spec, false);
        }

        let Some(fp) = self.committed_fingerprint().cloned() else {
            let spec = self.latest.clone();
            let fp = fingerprint(&spec);
            return match self.debouncer.submit(fp, spec, now, true) {
                DebounceDecision::Fire(fp, spec) => self.commit(fp, spec, false),
                _ => None,
            };
        };

        if !self.requested_lazy.insert(category) {
            return None;
        }
        Some(self.issue(FetchKind::Incremental, fp, vec![category]))
    }

    /// A section was collapsed. Its counts stay; it stops being fetched.
    pub fn collapse_section(&mut self, category: FacetCategory) {
        self.expanded.remove(&category);
    }

    /// Fetch the latest filter now, bypassing the debounce and the cache.
    pub fn refetch(&mut self, _now: Instant) -> Option<FetchTicket> {
        if !self.active {
            return None;
        }
        let spec = self.latest.clone();
        let fp = fingerprint(&spec);
        self.debouncer.force(fp.clone());
        self.cache.invalidate_snapshot(&fp);
        self.commit(fp, spec, true)
    }

    /// Forget the committed filter so the next activation or change fetches.
    pub fn reset(&mut self) {
        self.debouncer.reset();
        self.committed = None;
        self.requested_lazy.clear();
        self.staged.clear();
    }

    /// Feed back a completed fetch.
    pub fn on_fetch_complete(
        &mut self,
        fetch_id: u64,
        result: Result<FacetResponse>,
    ) -> FetchOutcome {
        let Some(fetch) = self.in_flight.remove(&fetch_id) else {
            debug!(mode = %self.mode, fetch_id, "Completion for unknown fetch");
            return FetchOutcome::Unknown;
        };

        if self.committed_fingerprint() != Some(&fetch.fingerprint) {
            debug!(
                mode = %self.mode,
                fetch_id,
                fingerprint = %fetch.fingerprint.short(),
                "Discarding stale fetch result"
            );
            return FetchOutcome::Discarded;
        }

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    mode = %self.mode,
                    fetch_id,
                    fetch_kind = fetch.kind.as_str(),
                    error = %e,
                    "Facet fetch failed, keeping previous counts"
                );
                if fetch.kind == FetchKind::Incremental {
                    // Let a later expansion retry.
                    for category in &fetch.categories {
                        self.requested_lazy.remove(category);
                    }
                }
                return FetchOutcome::Failed;
            }
        };

        let mapped = map_response(&response, &fetch.query, &fetch.categories);
        let same_fingerprint = self.snapshot.fingerprint.as_ref() == Some(&fetch.fingerprint);
        let outcome = match fetch.kind {
            FetchKind::Full if same_fingerprint => {
                self.snapshot = Arc::new(self.snapshot.merged(fetch.fingerprint.clone(), mapped));
                FetchOutcome::Merged
            }
            FetchKind::Full => {
                let mut facets = std::mem::take(&mut self.staged);
                facets.extend(mapped);
                self.snapshot = Arc::new(FacetCountsSnapshot::new(
                    self.mode,
                    fetch.fingerprint.clone(),
                    facets,
                ));
                FetchOutcome::Merged
            }
            FetchKind::Incremental if same_fingerprint => {
                self.snapshot = Arc::new(self.snapshot.merged(fetch.fingerprint.clone(), mapped));
                FetchOutcome::Merged
            }
            FetchKind::Incremental => {
                self.staged.extend(mapped);
                return FetchOutcome::Staged;
            }
        };

        self.cache.put_snapshot(&fetch.fingerprint, self.snapshot.clone());
        debug!(
            mode = %self.mode,
            fetch_id,
            fetch_kind = fetch.kind.as_str(),
            fingerprint = %fetch.fingerprint.short(),
            result_count = self.snapshot.entry_count(),
            "Facet counts merged"
        );
        outcome
    }

    /// Work out which per-entity counts still need fetching.
    ///
    /// Ids the category is filtered to are skipped. Returns `None` when
    /// nothing is committed yet or the mode does not count `category`.
    pub fn prepare_entity_counts(
        &self,
        category: FacetCategory,
        ids: &[String],
    ) -> Option<EntityCountPlan> {
        if !self.mode.profile().supports(category) {
            return None;
        }
        let (fp, spec) = self.committed.as_ref()?;
        let selected = spec.self_selected(category);

        let mut cached = Vec::new();
        let mut pending = Vec::new();
        let mut seen = BTreeSet::new();
        for id in ids {
            if selected.contains(id) || !seen.insert(id.as_str()) {
                continue;
            }
            match self.cache.get(fp, category, id) {
                Some(count) => cached.push((id.clone(), count)),
                None => pending.push((
                    PendingKey::new(fp.clone(), category, id.clone()),
                    CountQuery::for_filter(spec, category, id.clone()),
                )),
            }
        }

        Some(EntityCountPlan {
            mode: self.mode,
            fingerprint: fp.clone(),
            category,
            cached,
            pending,
        })
    }

    /// Record per-entity counts. Returns whether the snapshot changed.
    pub fn merge_entity_counts(
        &mut self,
        fingerprint: &Fingerprint,
        category: FacetCategory,
        counts: &[(String, u64)],
    ) -> bool {
        for (id, count) in counts {
            self.cache.set(fingerprint, category, id, *count);
        }
        if counts.is_empty()
            || self.committed_fingerprint() != Some(fingerprint)
            || self.snapshot.fingerprint.as_ref() != Some(fingerprint)
        {
            return false;
        }

        let entries = counts.iter().map(|(id, count)| {
            let label = self.snapshot.entry(category, id).and_then(|e| e.label.clone());
            FacetCountEntry::new(id.clone(), label, *count)
        });
        let updated = self.snapshot.with_entries(category, entries);
        self.snapshot = Arc::new(updated);
        true
    }

    fn commit(
        &mut self,
        fp: Fingerprint,
        spec: FilterSpec,
        bypass_cache: bool,
    ) -> Option<FetchTicket> {
        let changed = self.committed_fingerprint() != Some(&fp);
        if changed {
            self.requested_lazy.clear();
            self.staged.clear();
        }
        self.committed = Some((fp.clone(), spec));

        let profile = self.mode.profile();
        let eager: Vec<FacetCategory> = profile
            .eager_categories()
            .filter(|c| !self.per_entity.contains(c))
            .collect();
        let lazy: Vec<FacetCategory> = profile
            .lazy_categories()
            .filter(|c| self.expanded.contains(c) && !self.per_entity.contains(c))
            .collect();

        if !bypass_cache {
            if let Some(cached) = self.cache.get_snapshot(&fp) {
                if cached.covers(eager.iter().copied()) {
                    let missing: Vec<FacetCategory> =
                        lazy.iter().copied().filter(|c| !cached.has(*c)).collect();
                    debug!(
                        mode = %self.mode,
                        fingerprint = %fp.short(),
                        missing_lazy = missing.len(),
                        "Serving counts from cache"
                    );
                    self.snapshot = cached;
                    self.requested_lazy
                        .extend(lazy.iter().copied().filter(|c| !missing.contains(c)));
                    if missing.is_empty() {
                        return None;
                    }
                    self.requested_lazy.extend(missing.iter().copied());
                    return Some(self.issue(FetchKind::Incremental, fp, missing));
                }
            }
        }

        self.requested_lazy.extend(lazy.iter().copied());
        let mut categories = eager;
        categories.extend(lazy);
        Some(self.issue(FetchKind::Full, fp, categories))
    }

    fn issue(
        &mut self,
        kind: FetchKind,
        fp: Fingerprint,
        categories: Vec<FacetCategory>,
    ) -> FetchTicket {
        let id = self.next_fetch_id;
        self.next_fetch_id += 1;

        let spec = match &self.committed {
            Some((_, spec)) => spec,
            None => &self.latest,
        };
        let lazy = categories.iter().copied().filter(|c| c.is_lazy());
        let query = FacetQuery::for_filter(spec, self.facet_limit, lazy);
        let query = match kind {
            FetchKind::Incremental => query.incremental(),
            FetchKind::Full => query,
        };

        info!(
            mode = %self.mode,
            fetch_id = id,
            fetch_kind = kind.as_str(),
            fingerprint = %fp.short(),
            categories = categories.len(),
            "Issuing facet fetch"
        );

        self.in_flight.insert(
            id,
            InFlight {
                kind,
                fingerprint: fp.clone(),
                categories: categories.clone(),
                query: query.clone(),
            },
        );
        FetchTicket {
            id,
            kind,
            fingerprint: fp,
            categories,
            query,
        }
    }
}
