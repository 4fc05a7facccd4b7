//! Response-to-snapshot mapping.
//!
//! One mapper serves every mode: the category kind decides the shape. A
//! missing or malformed category maps to zero results for that category.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, trace};

use tally_core::{
    BooleanCounts, FacetCategory, FacetCountEntry, FacetCounts, FacetKind, FacetQuery,
    FacetResponse,
};

/// Map the listed categories of a response.
///
/// Keys the query excluded for a category (its own selection) are stripped
/// even if the backend returned them.
pub fn map_response(
    response: &FacetResponse,
    query: &FacetQuery,
    categories: &[FacetCategory],
) -> BTreeMap<FacetCategory, FacetCounts> {
    categories
        .iter()
        .map(|&category| {
            let counts = map_category(category, response.get(category), query.excluded(category));
            (category, counts)
        })
        .collect()
}

/// Map one category's raw value.
pub fn map_category(
    category: FacetCategory,
    raw: Option<&Value>,
    excluded: &[String],
) -> FacetCounts {
    let kind = category.kind();
    let Some(raw) = raw.filter(|v| !v.is_null()) else {
        debug!(%category, "Category missing from response, treating as empty");
        return FacetCounts::empty(kind);
    };

    match kind {
        FacetKind::Boolean => map_boolean(category, raw),
        FacetKind::Labeled | FacetKind::Enum | FacetKind::Rating => {
            let Some(items) = raw.as_array() else {
                debug!(%category, "Category is not a list, treating as empty");
                return FacetCounts::empty(kind);
            };
            let entries = items
                .iter()
                .filter_map(|item| map_entry(kind, item))
                .filter(|entry| !excluded.contains(&entry.key));
            FacetCounts::from_entries(entries)
        }
    }
}

fn map_entry(kind: FacetKind, item: &Value) -> Option<FacetCountEntry> {
    let obj = item.as_object()?;
    let key = match kind {
        FacetKind::Labeled => key_of(obj, "id").or_else(|| key_of(obj, "value")),
        _ => key_of(obj, "value").or_else(|| key_of(obj, "id")),
    };
    let Some(key) = key else {
        trace!(?item, "Skipping facet entry without a key");
        return None;
    };
    let label = obj
        .get("label")
        .or_else(|| obj.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(FacetCountEntry::new(key, label, count_of(obj.get("count"))))
}

fn map_boolean(category: FacetCategory, raw: &Value) -> FacetCounts {
    let mut pair = BooleanCounts::default();
    match raw {
        Value::Object(obj) => {
            pair.true_count = count_of(obj.get("true"));
            pair.false_count = count_of(obj.get("false"));
        }
        // Also accept `[{ value: true, count }, ...]`.
        Value::Array(items) => {
            for obj in items.iter().filter_map(Value::as_object) {
                match obj.get("value") {
                    Some(Value::Bool(true)) => pair.true_count = count_of(obj.get("count")),
                    Some(Value::Bool(false)) => pair.false_count = count_of(obj.get("count")),
                    _ => {}
                }
            }
        }
        _ => debug!(%category, "Boolean category malformed, treating as empty"),
    }
    FacetCounts::Boolean(pair)
}

/// Ids and values may arrive as strings or numbers.
fn key_of(obj: &Map<String, Value>, field: &str) -> Option<String> {
    match obj.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Counts are non-negative; anything else becomes zero.
fn count_of(raw: Option<&Value>) -> u64 {
    match raw {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tally_core::{Criterion, CriterionModifier, FilterSpec, ResultMode};

    #[test]
    fn test_labeled_entries_keep_labels() {
        let counts = map_category(
            FacetCategory::Tags,
            Some(&json!([{ "id": "5", "label": "Blonde", "count": 12 }])),
            &[],
        );
        let entry = counts.entry("5").unwrap();
        assert_eq!(entry.count, 12);
        assert_eq!(entry.label.as_deref(), Some("Blonde"));
    }

    #[test]
    fn test_missing_and_malformed_are_empty() {
        assert!(map_category(FacetCategory::Tags, None, &[]).is_empty());
        assert!(map_category(FacetCategory::Tags, Some(&Value::Null), &[]).is_empty());
        assert!(map_category(FacetCategory::Studios, Some(&json!("oops")), &[]).is_empty());
        assert_eq!(
            map_category(FacetCategory::Organized, Some(&json!(7)), &[]),
            FacetCounts::Boolean(BooleanCounts::default())
        );
    }

    #[test]
    fn test_numeric_ids_and_name_fallback() {
        let counts = map_category(
            FacetCategory::Studios,
            Some(&json!([{ "id": 42, "name": "Acme", "count": 3 }])),
            &[],
        );
        let entry = counts.entry("42").unwrap();
        assert_eq!(entry.label.as_deref(), Some("Acme"));
    }

    #[test]
    fn test_negative_counts_clamp_to_zero() {
        let counts = map_category(
            FacetCategory::Resolutions,
            Some(&json!([{ "value": "FULL_HD", "count": -4 }])),
            &[],
        );
        assert_eq!(counts.count("FULL_HD"), Some(0));
    }

    #[test]
    fn test_entries_without_key_are_skipped() {
        let counts = map_category(
            FacetCategory::Tags,
            Some(&json!([{ "label": "nameless", "count": 1 }, { "id": "1", "count": 2 }])),
            &[],
        );
        assert_eq!(counts.len(), 1);
    }

    #[test]
    fn test_rating_values_are_stringified() {
        let counts = map_category(
            FacetCategory::Ratings,
            Some(&json!([{ "value": 80, "count": 9 }])),
            &[],
        );
        assert_eq!(counts.count("80"), Some(9));
    }

    #[test]
    fn test_boolean_shapes() {
        let raw = json!({ "true": 3, "false": 5 });
        let pair = map_category(FacetCategory::Organized, Some(&raw), &[]);
        assert_eq!(pair.count("true"), Some(3));
        assert_eq!(pair.count("false"), Some(5));

        let listed = map_category(
            FacetCategory::Interactive,
            Some(&json!([{ "value": true, "count": 1 }, { "value": false, "count": 2 }])),
            &[],
        );
        assert_eq!(listed.count("false"), Some(2));
    }

    #[test]
    fn test_map_response_strips_self_selected_keys() {
        let spec = FilterSpec::new(ResultMode::Scenes).with_criterion(Criterion::ids(
            "tags",
            CriterionModifier::Includes,
            ["5"],
        ));
        let query = FacetQuery::for_filter(&spec, 100, Vec::new());
        let response = FacetResponse::new().with(
            FacetCategory::Tags,
            json!([{ "id": "5", "count": 12 }, { "id": "6", "count": 4 }]),
        );

        let mapped = map_response(
            &response,
            &query,
            &[FacetCategory::Tags, FacetCategory::Studios],
        );
        let tags = &mapped[&FacetCategory::Tags];
        assert_eq!(tags.count("5"), None);
        assert_eq!(tags.count("6"), Some(4));
        assert!(mapped[&FacetCategory::Studios].is_empty());
    }
}
