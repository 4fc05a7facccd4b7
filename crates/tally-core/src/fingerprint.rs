//! Stable identity of a filter's effect on counts.
//!
//! The fingerprint is the cache and invalidation key: two filters that would
//! send identical count queries must hash identically, whatever order their
//! criteria were added in and whatever page or sort the view is on.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::filter::FilterSpec;

/// Lowercase hex SHA-256 of a filter's canonical count payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint a filter.
///
/// `serde_json` objects keep their keys sorted, so serializing the canonical
/// payload is already deterministic.
pub fn fingerprint(filter: &FilterSpec) -> Fingerprint {
    let payload = filter.count_payload().to_string();
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    Fingerprint(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{
        Criterion, CriterionModifier, CriterionValue, DisplayMode, LabeledId, SortDirection,
    };
    use crate::modes::ResultMode;
    use serde_json::json;

    fn scene_filter() -> FilterSpec {
        FilterSpec::new(ResultMode::Scenes)
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = fingerprint(&scene_filter());
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp.short().len(), 12);
    }

    #[test]
    fn test_criteria_order_does_not_matter() {
        let tags = Criterion::ids("tags", CriterionModifier::Includes, ["1", "2"]);
        let studio = Criterion::ids("studios", CriterionModifier::Includes, ["9"]);
        let rating = Criterion::new(
            "rating100",
            CriterionModifier::GreaterThan,
            CriterionValue::Number {
                value: 60,
                value2: None,
            },
        );

        let a = scene_filter()
            .with_criterion(tags.clone())
            .with_criterion(studio.clone())
            .with_criterion(rating.clone());
        let b = scene_filter()
            .with_criterion(rating)
            .with_criterion(tags)
            .with_criterion(studio);

        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_id_order_and_labels_do_not_matter() {
        let a = scene_filter().with_criterion(Criterion::ids(
            "tags",
            CriterionModifier::Includes,
            ["2", "1"],
        ));
        let b = scene_filter().with_criterion(Criterion::new(
            "tags",
            CriterionModifier::Includes,
            CriterionValue::Ids {
                items: vec![LabeledId::labeled("1", "Blonde"), LabeledId::labeled("2", "Beach")],
                excluded: vec![],
                depth: None,
            },
        ));
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_ui_only_fields_do_not_matter() {
        let a = scene_filter();
        let b = scene_filter()
            .with_page(12)
            .with_sort("random_123", SortDirection::Desc)
            .with_display_mode(DisplayMode::Tagger);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_inert_criterion_matches_empty_filter() {
        let a = scene_filter();
        let b = scene_filter().with_criterion(Criterion::ids(
            "tags",
            CriterionModifier::Includes,
            Vec::<String>::new(),
        ));
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_boolean_modifier_changes_fingerprint() {
        let organized = |modifier| {
            scene_filter().with_criterion(Criterion::new(
                "organized",
                modifier,
                CriterionValue::Bool(true),
            ))
        };
        let equals = organized(CriterionModifier::Equals);
        let not_equals = organized(CriterionModifier::NotEquals);

        assert_ne!(fingerprint(&equals), fingerprint(&not_equals));
        assert_eq!(equals.filter_object()["organized"], json!(true));
        assert_eq!(not_equals.filter_object()["organized"], json!(false));
    }

    #[test]
    fn test_effective_changes_alter_fingerprint() {
        let base = scene_filter();
        let with_tag = scene_filter().with_criterion(Criterion::ids(
            "tags",
            CriterionModifier::Includes,
            ["5"],
        ));
        let excluding_tag = scene_filter().with_criterion(Criterion::ids(
            "tags",
            CriterionModifier::Excludes,
            ["5"],
        ));
        let searched = scene_filter().with_search("beach");
        let other_mode = FilterSpec::new(ResultMode::Galleries);

        let fps = [
            fingerprint(&base),
            fingerprint(&with_tag),
            fingerprint(&excluding_tag),
            fingerprint(&searched),
            fingerprint(&other_mode),
        ];
        for (i, a) in fps.iter().enumerate() {
            for b in fps.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
