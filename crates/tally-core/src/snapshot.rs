//! Immutable facet-count snapshots.
//!
//! A snapshot is built once per merge and shared as
//! `Arc<FacetCountsSnapshot>`; readers never see a half-merged value.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::facets::{FacetCategory, FacetKind};
use crate::fingerprint::Fingerprint;
use crate::modes::ResultMode;

/// Count for one facet value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetCountEntry {
    /// Entity id, or the raw value for enum, rating and boolean facets.
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub count: u64,
}

impl FacetCountEntry {
    pub fn new(key: impl Into<String>, label: Option<String>, count: u64) -> Self {
        Self {
            key: key.into(),
            label,
            count,
        }
    }
}

/// Counts for a boolean facet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BooleanCounts {
    pub true_count: u64,
    pub false_count: u64,
}

impl BooleanCounts {
    pub fn get(&self, value: bool) -> u64 {
        if value {
            self.true_count
        } else {
            self.false_count
        }
    }
}

/// Counts for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "counts", rename_all = "snake_case")]
pub enum FacetCounts {
    Entries(BTreeMap<String, FacetCountEntry>),
    Boolean(BooleanCounts),
}

impl FacetCounts {
    /// Zero results in the shape `kind` expects.
    pub fn empty(kind: FacetKind) -> Self {
        match kind {
            FacetKind::Boolean => FacetCounts::Boolean(BooleanCounts::default()),
            _ => FacetCounts::Entries(BTreeMap::new()),
        }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = FacetCountEntry>) -> Self {
        FacetCounts::Entries(entries.into_iter().map(|e| (e.key.clone(), e)).collect())
    }

    pub fn entry(&self, key: &str) -> Option<&FacetCountEntry> {
        match self {
            FacetCounts::Entries(entries) => entries.get(key),
            FacetCounts::Boolean(_) => None,
        }
    }

    /// Count for a key. Boolean facets accept `"true"` and `"false"`.
    pub fn count(&self, key: &str) -> Option<u64> {
        match self {
            FacetCounts::Entries(entries) => entries.get(key).map(|e| e.count),
            FacetCounts::Boolean(pair) => match key {
                "true" => Some(pair.true_count),
                "false" => Some(pair.false_count),
                _ => None,
            },
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FacetCounts::Entries(entries) => entries.len(),
            FacetCounts::Boolean(_) => 2,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every `(key, count)` pair, booleans as `"true"` and `"false"`.
    pub fn key_counts(&self) -> Vec<(String, u64)> {
        match self {
            FacetCounts::Entries(entries) => entries
                .values()
                .map(|e| (e.key.clone(), e.count))
                .collect(),
            FacetCounts::Boolean(pair) => vec![
                ("true".to_string(), pair.true_count),
                ("false".to_string(), pair.false_count),
            ],
        }
    }

    /// Entries ordered by count descending, then label, then key.
    pub fn ranked(&self) -> Vec<&FacetCountEntry> {
        let mut ranked: Vec<&FacetCountEntry> = match self {
            FacetCounts::Entries(entries) => entries.values().collect(),
            FacetCounts::Boolean(_) => Vec::new(),
        };
        ranked.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.label.cmp(&b.label))
                .then_with(|| a.key.cmp(&b.key))
        });
        ranked
    }
}

/// Every fetched category for one mode and fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetCountsSnapshot {
    pub mode: ResultMode,
    /// Filter the counts were fetched for; `None` before the first fetch.
    pub fingerprint: Option<Fingerprint>,
    pub fetched_at: Option<DateTime<Utc>>,
    facets: BTreeMap<FacetCategory, FacetCounts>,
}

impl FacetCountsSnapshot {
    /// Snapshot with no counts yet.
    pub fn empty(mode: ResultMode) -> Self {
        Self {
            mode,
            fingerprint: None,
            fetched_at: None,
            facets: BTreeMap::new(),
        }
    }

    pub fn new(
        mode: ResultMode,
        fingerprint: Fingerprint,
        facets: BTreeMap<FacetCategory, FacetCounts>,
    ) -> Self {
        Self {
            mode,
            fingerprint: Some(fingerprint),
            fetched_at: Some(Utc::now()),
            facets,
        }
    }

    pub fn get(&self, category: FacetCategory) -> Option<&FacetCounts> {
        self.facets.get(&category)
    }

    pub fn has(&self, category: FacetCategory) -> bool {
        self.facets.contains_key(&category)
    }

    /// Whether every listed category has been fetched.
    pub fn covers(&self, categories: impl IntoIterator<Item = FacetCategory>) -> bool {
        categories.into_iter().all(|c| self.has(c))
    }

    pub fn categories(&self) -> impl Iterator<Item = FacetCategory> + '_ {
        self.facets.keys().copied()
    }

    /// Count for one value; `None` means unknown, not zero.
    pub fn count(&self, category: FacetCategory, key: &str) -> Option<u64> {
        self.facets.get(&category)?.count(key)
    }

    pub fn entry(&self, category: FacetCategory, key: &str) -> Option<&FacetCountEntry> {
        self.facets.get(&category)?.entry(key)
    }

    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }

    /// New snapshot with `updates` layered over this one's categories.
    pub fn merged(
        &self,
        fingerprint: Fingerprint,
        updates: BTreeMap<FacetCategory, FacetCounts>,
    ) -> Self {
        let mut facets = self.facets.clone();
        facets.extend(updates);
        Self::new(self.mode, fingerprint, facets)
    }

    /// New snapshot with single entries added to (or replaced in) a category.
    pub fn with_entries(
        &self,
        category: FacetCategory,
        entries: impl IntoIterator<Item = FacetCountEntry>,
    ) -> Self {
        let mut facets = self.facets.clone();
        let slot = facets
            .entry(category)
            .or_insert_with(|| FacetCounts::empty(category.kind()));
        if let FacetCounts::Entries(map) = slot {
            for entry in entries {
                map.insert(entry.key.clone(), entry);
            }
        }
        Self {
            mode: self.mode,
            fingerprint: self.fingerprint.clone(),
            fetched_at: Some(Utc::now()),
            facets,
        }
    }

    /// Total number of values across categories.
    pub fn entry_count(&self) -> usize {
        self.facets.values().map(FacetCounts::len).sum()
    }
}
