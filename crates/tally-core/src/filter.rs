//! Filter specifications for list views.
//!
//! A [`FilterSpec`] mixes fields that change what the backend counts (search
//! term, criteria) with fields that only change presentation (sort, paging,
//! display mode). [`FilterSpec::count_payload`] reduces it to the canonical
//! count-relevant form used for both fingerprinting and query building.
//!
//! # Example
//!
//! ```
//! use tally_core::{Criterion, CriterionModifier, FilterSpec, ResultMode};
//!
//! let spec = FilterSpec::new(ResultMode::Scenes)
//!     .with_search("beach")
//!     .with_criterion(Criterion::ids("tags", CriterionModifier::Includes, ["5", "9"]))
//!     .with_page(3);
//!
//! let payload = spec.count_payload();
//! assert_eq!(payload["q"], "beach");
//! assert_eq!(payload["filter"]["tags"]["value"][0], "5");
//! assert!(payload.get("page").is_none());
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::facets::{FacetCategory, FacetKind};
use crate::modes::ResultMode;

/// Comparison applied by a criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CriterionModifier {
    Equals,
    NotEquals,
    Includes,
    IncludesAll,
    Excludes,
    IsNull,
    NotNull,
    GreaterThan,
    LessThan,
    Between,
    NotBetween,
}

impl CriterionModifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CriterionModifier::Equals => "EQUALS",
            CriterionModifier::NotEquals => "NOT_EQUALS",
            CriterionModifier::Includes => "INCLUDES",
            CriterionModifier::IncludesAll => "INCLUDES_ALL",
            CriterionModifier::Excludes => "EXCLUDES",
            CriterionModifier::IsNull => "IS_NULL",
            CriterionModifier::NotNull => "NOT_NULL",
            CriterionModifier::GreaterThan => "GREATER_THAN",
            CriterionModifier::LessThan => "LESS_THAN",
            CriterionModifier::Between => "BETWEEN",
            CriterionModifier::NotBetween => "NOT_BETWEEN",
        }
    }

    /// Null checks ignore the criterion value entirely.
    pub fn is_null_check(&self) -> bool {
        matches!(self, CriterionModifier::IsNull | CriterionModifier::NotNull)
    }

    /// Modifiers that select results carrying one of the listed values.
    pub fn is_inclusive(&self) -> bool {
        matches!(
            self,
            CriterionModifier::Includes | CriterionModifier::IncludesAll
        )
    }
}

/// An id with its display label. Only the id reaches the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledId {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl LabeledId {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
        }
    }

    pub fn labeled(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: Some(label.into()),
        }
    }
}

/// Value carried by a criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CriterionValue {
    None,
    /// Hierarchical id selection (tags, studios, performers).
    Ids {
        items: Vec<LabeledId>,
        #[serde(default)]
        excluded: Vec<LabeledId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        depth: Option<i32>,
    },
    /// Enum members (resolutions, orientations).
    Values(Vec<String>),
    Text(String),
    Number {
        value: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value2: Option<i64>,
    },
    Bool(bool),
}

/// One named constraint of a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub field: String,
    pub modifier: CriterionModifier,
    pub value: CriterionValue,
}

impl Criterion {
    pub fn new(
        field: impl Into<String>,
        modifier: CriterionModifier,
        value: CriterionValue,
    ) -> Self {
        Self {
            field: field.into(),
            modifier,
            value,
        }
    }

    /// Id criterion without labels.
    pub fn ids<I, S>(field: impl Into<String>, modifier: CriterionModifier, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            field,
            modifier,
            CriterionValue::Ids {
                items: ids.into_iter().map(LabeledId::new).collect(),
                excluded: Vec::new(),
                depth: None,
            },
        )
    }

    /// Enum-member criterion.
    pub fn values<I, S>(field: impl Into<String>, modifier: CriterionModifier, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            field,
            modifier,
            CriterionValue::Values(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn boolean(field: impl Into<String>, value: bool) -> Self {
        Self::new(field, CriterionModifier::Equals, CriterionValue::Bool(value))
    }

    /// A criterion that cannot constrain the query, such as an empty tag list.
    pub fn is_inert(&self) -> bool {
        if self.modifier.is_null_check() {
            return false;
        }
        match &self.value {
            CriterionValue::None => true,
            CriterionValue::Ids {
                items, excluded, ..
            } => items.is_empty() && excluded.is_empty(),
            CriterionValue::Values(values) => values.is_empty(),
            CriterionValue::Text(text) => text.trim().is_empty(),
            CriterionValue::Number { .. } | CriterionValue::Bool(_) => false,
        }
    }

    /// Ids (or enum members) this criterion selects inclusively.
    pub fn selected_keys(&self) -> Vec<String> {
        if !self.modifier.is_inclusive() {
            return Vec::new();
        }
        let keys: BTreeSet<String> = match &self.value {
            CriterionValue::Ids { items, .. } => items.iter().map(|i| i.id.clone()).collect(),
            CriterionValue::Values(values) => values.iter().cloned().collect(),
            _ => BTreeSet::new(),
        };
        keys.into_iter().collect()
    }

    /// Canonical JSON form: labels dropped, lists sorted and de-duplicated.
    fn canonical(&self) -> Value {
        let modifier = self.modifier.as_str();
        if self.modifier.is_null_check() {
            return json!({ "modifier": modifier });
        }
        match &self.value {
            CriterionValue::None => json!({ "modifier": modifier }),
            CriterionValue::Ids {
                items,
                excluded,
                depth,
            } => {
                let mut obj = Map::new();
                obj.insert("modifier".into(), json!(modifier));
                obj.insert("value".into(), json!(sorted_ids(items)));
                if !excluded.is_empty() {
                    obj.insert("excludes".into(), json!(sorted_ids(excluded)));
                }
                if let Some(depth) = depth {
                    obj.insert("depth".into(), json!(depth));
                }
                Value::Object(obj)
            }
            CriterionValue::Values(values) => {
                let sorted: BTreeSet<&str> = values.iter().map(String::as_str).collect();
                json!({ "modifier": modifier, "value": sorted })
            }
            CriterionValue::Text(text) => json!({ "modifier": modifier, "value": text.trim() }),
            CriterionValue::Number { value, value2 } => match value2 {
                Some(value2) => json!({ "modifier": modifier, "value": value, "value2": value2 }),
                None => json!({ "modifier": modifier, "value": value }),
            },
            CriterionValue::Bool(b) => match self.modifier {
                CriterionModifier::NotEquals => json!(!b),
                _ => json!(b),
            },
        }
    }

    /// Fold a later criterion on the same field into this one.
    ///
    /// `IncludesAll` and `Excludes` lists with the same modifier combine into
    /// one list; any other combination keeps the later criterion.
    fn absorb(&mut self, later: Criterion) {
        let conjunctive = self.modifier == later.modifier
            && matches!(
                self.modifier,
                CriterionModifier::IncludesAll | CriterionModifier::Excludes
            );
        if conjunctive {
            match (&mut self.value, &later.value) {
                (
                    CriterionValue::Ids {
                        items,
                        excluded,
                        depth,
                    },
                    CriterionValue::Ids {
                        items: more,
                        excluded: more_excluded,
                        depth: later_depth,
                    },
                ) if *depth == *later_depth => {
                    items.extend(more.iter().cloned());
                    excluded.extend(more_excluded.iter().cloned());
                    return;
                }
                (CriterionValue::Values(values), CriterionValue::Values(more)) => {
                    values.extend(more.iter().cloned());
                    return;
                }
                _ => {}
            }
        }
        *self = later;
    }
}

fn sorted_ids(ids: &[LabeledId]) -> Vec<&str> {
    let set: BTreeSet<&str> = ids.iter().map(|i| i.id.as_str()).collect();
    set.into_iter().collect()
}

/// Sort direction of a list view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// How a list view renders its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    Grid,
    List,
    Wall,
    Tagger,
}

/// The active search of a list view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub mode: ResultMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_term: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_direction: SortDirection,
    pub page: u32,
    pub per_page: u32,
    #[serde(default)]
    pub display_mode: DisplayMode,
    #[serde(default)]
    pub zoom_index: u8,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
}

impl FilterSpec {
    /// Create an empty filter (matches everything) for a mode.
    pub fn new(mode: ResultMode) -> Self {
        Self {
            mode,
            search_term: None,
            sort_by: None,
            sort_direction: SortDirection::default(),
            page: 1,
            per_page: 40,
            display_mode: DisplayMode::default(),
            zoom_index: 1,
            criteria: Vec::new(),
        }
    }

    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    /// Append a criterion, replacing any existing one on the same field.
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.set_criterion(criterion);
        self
    }

    pub fn with_sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort_by = Some(field.into());
        self.sort_direction = direction;
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_display_mode(mut self, display_mode: DisplayMode) -> Self {
        self.display_mode = display_mode;
        self
    }

    /// Replace the criterion on `criterion.field`, or append it.
    pub fn set_criterion(&mut self, criterion: Criterion) {
        match self.criteria.iter_mut().find(|c| c.field == criterion.field) {
            Some(existing) => *existing = criterion,
            None => self.criteria.push(criterion),
        }
    }

    pub fn remove_criterion(&mut self, field: &str) {
        self.criteria.retain(|c| c.field != field);
    }

    pub fn criterion(&self, field: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.field == field)
    }

    /// Trimmed search term, `None` when blank.
    pub fn effective_search(&self) -> Option<&str> {
        self.search_term
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// One criterion per field, inert ones dropped.
    ///
    /// Criteria pushed directly onto `criteria` may repeat a field; they are
    /// folded together with [`Criterion::absorb`] in list order.
    fn effective_criteria(&self) -> BTreeMap<&str, Criterion> {
        let mut merged: BTreeMap<&str, Criterion> = BTreeMap::new();
        for criterion in self.criteria.iter().filter(|c| !c.is_inert()) {
            match merged.get_mut(criterion.field.as_str()) {
                Some(existing) => existing.absorb(criterion.clone()),
                None => {
                    merged.insert(criterion.field.as_str(), criterion.clone());
                }
            }
        }
        merged
    }

    /// Canonical filter object: one criterion object per field.
    pub fn filter_object(&self) -> Value {
        let obj: Map<String, Value> = self
            .effective_criteria()
            .into_iter()
            .map(|(field, criterion)| (field.to_string(), criterion.canonical()))
            .collect();
        Value::Object(obj)
    }

    /// Everything about this filter that changes backend counts.
    ///
    /// Sort, paging, display mode and zoom are excluded.
    pub fn count_payload(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("mode".into(), json!(self.mode.as_str()));
        if let Some(q) = self.effective_search() {
            obj.insert("q".into(), json!(q));
        }
        obj.insert("filter".into(), self.filter_object());
        Value::Object(obj)
    }

    /// Keys a category is currently filtered to inclusively.
    ///
    /// Counting such a category against its own selection only yields trivial
    /// full-match counts, so these keys are excluded from its count query.
    pub fn self_selected(&self, category: FacetCategory) -> Vec<String> {
        if category.kind() == FacetKind::Boolean {
            return Vec::new();
        }
        self.effective_criteria()
            .get(category.criterion_field())
            .map(Criterion::selected_keys)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(ids: &[&str]) -> Criterion {
        Criterion::ids("tags", CriterionModifier::Includes, ids.iter().copied())
    }

    #[test]
    fn test_empty_id_list_is_inert() {
        assert!(tags(&[]).is_inert());
        assert!(!tags(&["1"]).is_inert());
    }

    #[test]
    fn test_null_check_is_never_inert() {
        let c = Criterion::new("studios", CriterionModifier::IsNull, CriterionValue::None);
        assert!(!c.is_inert());
        assert_eq!(c.canonical(), json!({ "modifier": "IS_NULL" }));
    }

    #[test]
    fn test_canonical_drops_labels_and_sorts() {
        let c = Criterion::new(
            "tags",
            CriterionModifier::IncludesAll,
            CriterionValue::Ids {
                items: vec![
                    LabeledId::labeled("9", "Nine"),
                    LabeledId::labeled("2", "Two"),
                    LabeledId::new("9"),
                ],
                excluded: vec![],
                depth: Some(-1),
            },
        );
        assert_eq!(
            c.canonical(),
            json!({ "modifier": "INCLUDES_ALL", "value": ["2", "9"], "depth": -1 })
        );
    }

    #[test]
    fn test_set_criterion_replaces_same_field() {
        let mut spec = FilterSpec::new(ResultMode::Scenes).with_criterion(tags(&["1"]));
        spec.set_criterion(tags(&["2"]));
        assert_eq!(spec.criteria.len(), 1);
        assert_eq!(spec.criterion("tags").unwrap().selected_keys(), vec!["2"]);
    }

    #[test]
    fn test_count_payload_excludes_ui_fields() {
        let base = FilterSpec::new(ResultMode::Scenes).with_criterion(tags(&["1"]));
        let ui = base
            .clone()
            .with_page(7)
            .with_sort("date", SortDirection::Desc)
            .with_display_mode(DisplayMode::Wall);
        assert_eq!(base.count_payload(), ui.count_payload());
    }

    #[test]
    fn test_blank_search_is_omitted() {
        let spec = FilterSpec::new(ResultMode::Scenes).with_search("   ");
        assert!(spec.count_payload().get("q").is_none());
        let spec = FilterSpec::new(ResultMode::Scenes).with_search(" beach ");
        assert_eq!(spec.count_payload()["q"], "beach");
    }

    fn all_tags(ids: &[&str]) -> Criterion {
        Criterion::ids("tags", CriterionModifier::IncludesAll, ids.iter().copied())
    }

    #[test]
    fn test_duplicate_conjunctive_fields_merge_into_one_object() {
        let mut spec = FilterSpec::new(ResultMode::Scenes);
        spec.criteria.push(all_tags(&["2"]));
        spec.criteria.push(all_tags(&["1"]));
        let mut reversed = FilterSpec::new(ResultMode::Scenes);
        reversed.criteria.push(all_tags(&["1"]));
        reversed.criteria.push(all_tags(&["2"]));

        let obj = spec.filter_object();
        assert_eq!(
            obj["tags"],
            json!({ "modifier": "INCLUDES_ALL", "value": ["1", "2"] })
        );
        assert_eq!(obj, reversed.filter_object());
        assert_eq!(spec.self_selected(FacetCategory::Tags), vec!["1", "2"]);
    }

    #[test]
    fn test_duplicate_conflicting_fields_keep_the_later_criterion() {
        let mut spec = FilterSpec::new(ResultMode::Scenes);
        spec.criteria.push(tags(&["2"]));
        spec.criteria.push(Criterion::ids("tags", CriterionModifier::Excludes, ["1"]));

        let obj = spec.filter_object();
        assert_eq!(obj["tags"], json!({ "modifier": "EXCLUDES", "value": ["1"] }));
        assert!(spec.self_selected(FacetCategory::Tags).is_empty());
    }

    #[test]
    fn test_duplicate_fields_skip_inert_entries() {
        let mut spec = FilterSpec::new(ResultMode::Scenes);
        spec.criteria.push(tags(&["3"]));
        spec.criteria.push(tags(&[]));
        assert_eq!(spec.filter_object()["tags"]["value"], json!(["3"]));
    }

    #[test]
    fn test_self_selected_only_for_inclusive_modifiers() {
        let spec = FilterSpec::new(ResultMode::Scenes)
            .with_criterion(tags(&["5", "3"]))
            .with_criterion(Criterion::ids(
                "studios",
                CriterionModifier::Excludes,
                ["7"],
            ))
            .with_criterion(Criterion::values(
                "resolution",
                CriterionModifier::Includes,
                ["1080p"],
            ));

        assert_eq!(spec.self_selected(FacetCategory::Tags), vec!["3", "5"]);
        assert!(spec.self_selected(FacetCategory::Studios).is_empty());
        assert_eq!(
            spec.self_selected(FacetCategory::Resolutions),
            vec!["1080p"]
        );
    }

    #[test]
    fn test_boolean_criterion_is_plain_json_bool() {
        let spec = FilterSpec::new(ResultMode::Scenes)
            .with_criterion(Criterion::boolean("organized", true));
        assert_eq!(spec.filter_object()["organized"], json!(true));
        assert!(spec.self_selected(FacetCategory::Organized).is_empty());
    }

    #[test]
    fn test_not_equals_boolean_sends_the_negated_value() {
        let not_organized = Criterion::new(
            "organized",
            CriterionModifier::NotEquals,
            CriterionValue::Bool(true),
        );
        assert_eq!(not_organized.canonical(), json!(false));
        assert_eq!(Criterion::boolean("organized", false).canonical(), json!(false));
    }
}
