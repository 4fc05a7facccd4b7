//! Wire types exchanged with the counting backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::facets::{FacetCategory, FacetKind};
use crate::filter::{CriterionModifier, FilterSpec};
use crate::modes::ResultMode;

/// Aggregate count query for one mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetQuery {
    pub mode: ResultMode,
    /// Canonical mode filter object.
    pub filter: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Maximum entries per labelled list.
    pub limit: u32,
    /// Lazy categories to compute on this call.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lazy_flags: BTreeMap<FacetCategory, bool>,
    /// Keys each category must not be counted for (its own selection).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exclude: BTreeMap<FacetCategory, Vec<String>>,
    /// Only the requested lazy categories are wanted; eager ones are skipped.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub incremental: bool,
}

impl FacetQuery {
    /// Build the query for `spec`, requesting the given lazy categories.
    ///
    /// Categories outside the mode's profile are ignored.
    pub fn for_filter(
        spec: &FilterSpec,
        limit: u32,
        lazy: impl IntoIterator<Item = FacetCategory>,
    ) -> Self {
        let profile = spec.mode.profile();
        let lazy_flags = lazy
            .into_iter()
            .filter(|c| c.is_lazy() && profile.supports(*c))
            .map(|c| (c, true))
            .collect();
        let exclude = profile
            .categories
            .iter()
            .filter_map(|c| {
                let keys = spec.self_selected(*c);
                (!keys.is_empty()).then_some((*c, keys))
            })
            .collect();

        Self {
            mode: spec.mode,
            filter: spec.filter_object(),
            search: spec.effective_search().map(str::to_string),
            limit,
            lazy_flags,
            exclude,
            incremental: false,
        }
    }

    /// Mark the query as fetching lazy categories only.
    pub fn incremental(mut self) -> Self {
        self.incremental = true;
        self
    }

    pub fn is_lazy_requested(&self, category: FacetCategory) -> bool {
        self.lazy_flags.get(&category).copied().unwrap_or(false)
    }

    pub fn excluded(&self, category: FacetCategory) -> &[String] {
        self.exclude.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Count of results matching a base filter with one category pinned to a
/// single value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountQuery {
    pub mode: ResultMode,
    /// Mode filter with `category`'s own criterion removed.
    pub base_filter: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    pub category: FacetCategory,
    pub key: String,
}

impl CountQuery {
    pub fn for_filter(spec: &FilterSpec, category: FacetCategory, key: impl Into<String>) -> Self {
        let mut base_filter = spec.filter_object();
        if let Value::Object(obj) = &mut base_filter {
            obj.remove(category.criterion_field());
        }
        Self {
            mode: spec.mode,
            base_filter,
            search: spec.effective_search().map(str::to_string),
            category,
            key: key.into(),
        }
    }

    /// Base filter plus the pinned criterion for `key`.
    pub fn effective_filter(&self) -> Value {
        let mut obj = match &self.base_filter {
            Value::Object(obj) => obj.clone(),
            _ => Map::new(),
        };
        let pinned = match self.category.kind() {
            FacetKind::Boolean => json!(self.key == "true"),
            FacetKind::Rating => match self.key.parse::<i64>() {
                Ok(n) => json!({ "value": n, "modifier": CriterionModifier::Equals.as_str() }),
                Err(_) => {
                    json!({ "value": self.key, "modifier": CriterionModifier::Equals.as_str() })
                }
            },
            FacetKind::Labeled | FacetKind::Enum => {
                json!({ "value": [self.key], "modifier": CriterionModifier::Includes.as_str() })
            }
        };
        obj.insert(self.category.criterion_field().to_string(), pinned);
        Value::Object(obj)
    }
}

/// Raw aggregate response: category name to list or boolean pair.
///
/// Kept as JSON so a malformed or missing category degrades to zero results
/// for that category instead of failing the whole response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacetResponse {
    pub categories: Map<String, Value>,
}

impl FacetResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, category: FacetCategory) -> Option<&Value> {
        self.categories.get(category.as_str())
    }

    /// Add a category's raw value.
    pub fn with(mut self, category: FacetCategory, value: Value) -> Self {
        self.categories.insert(category.as_str().to_string(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Criterion;

    #[test]
    fn test_facet_query_collects_self_exclusions() {
        let spec = FilterSpec::new(ResultMode::Scenes)
            .with_criterion(Criterion::ids("tags", CriterionModifier::Includes, ["5"]))
            .with_criterion(Criterion::ids("studios", CriterionModifier::Excludes, ["2"]));
        let query = FacetQuery::for_filter(&spec, 50, []);

        assert_eq!(query.excluded(FacetCategory::Tags), ["5".to_string()]);
        assert!(query.excluded(FacetCategory::Studios).is_empty());
        assert_eq!(query.filter["tags"]["value"], json!(["5"]));
        assert_eq!(query.limit, 50);
    }

    #[test]
    fn test_facet_query_ignores_unsupported_lazy_flags() {
        let spec = FilterSpec::new(ResultMode::Performers);
        let query = FacetQuery::for_filter(
            &spec,
            10,
            [FacetCategory::PerformerTags, FacetCategory::Tags],
        );
        assert!(query.lazy_flags.is_empty());

        let spec = FilterSpec::new(ResultMode::Scenes);
        let query = FacetQuery::for_filter(&spec, 10, [FacetCategory::Captions]);
        assert!(query.is_lazy_requested(FacetCategory::Captions));
        assert!(!query.is_lazy_requested(FacetCategory::PerformerTags));
    }

    #[test]
    fn test_facet_query_wire_shape() {
        let spec = FilterSpec::new(ResultMode::Scenes);
        let query = FacetQuery::for_filter(&spec, 25, [FacetCategory::PerformerTags]);
        let wire = serde_json::to_value(&query).unwrap();
        assert_eq!(wire["mode"], "scenes");
        assert_eq!(wire["limit"], 25);
        assert_eq!(wire["lazy_flags"]["performer_tags"], true);
        assert!(wire.get("exclude").is_none());
        assert!(wire.get("search").is_none());
    }

    #[test]
    fn test_count_query_replaces_own_criterion() {
        let spec = FilterSpec::new(ResultMode::Scenes)
            .with_criterion(Criterion::ids("tags", CriterionModifier::IncludesAll, ["1", "2"]))
            .with_criterion(Criterion::boolean("organized", true));
        let query = CountQuery::for_filter(&spec, FacetCategory::Tags, "9");

        assert!(query.base_filter.get("tags").is_none());
        let effective = query.effective_filter();
        assert_eq!(
            effective["tags"],
            json!({ "value": ["9"], "modifier": "INCLUDES" })
        );
        assert_eq!(effective["organized"], json!(true));
    }

    #[test]
    fn test_count_query_pins_boolean_and_rating() {
        let spec = FilterSpec::new(ResultMode::Scenes);
        let organized = CountQuery::for_filter(&spec, FacetCategory::Organized, "false");
        assert_eq!(organized.effective_filter()["organized"], json!(false));

        let rating = CountQuery::for_filter(&spec, FacetCategory::Ratings, "80");
        assert_eq!(
            rating.effective_filter()["rating100"],
            json!({ "value": 80, "modifier": "EQUALS" })
        );
    }

    #[test]
    fn test_facet_response_parses_wire_object() {
        let response: FacetResponse = serde_json::from_value(json!({
            "tags": [{ "id": "5", "label": "Blonde", "count": 12 }],
            "organized": { "true": 3, "false": 4 }
        }))
        .unwrap();
        assert!(response.get(FacetCategory::Tags).unwrap().is_array());
        assert!(response.get(FacetCategory::Organized).unwrap().is_object());
        assert!(response.get(FacetCategory::Studios).is_none());
    }
}
