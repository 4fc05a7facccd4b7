//! GraphQL documents and variables, derived from each mode's profile.

use serde_json::{json, Map, Value};

use tally_core::{CountQuery, FacetCategory, FacetKind, FacetQuery, ModeProfile, ResultMode};

/// Name of the root-field argument carrying the mode's filter object.
pub fn filter_argument(mode: ResultMode) -> &'static str {
    match mode {
        ResultMode::Scenes => "scene_filter",
        ResultMode::Performers => "performer_filter",
        ResultMode::Studios => "studio_filter",
        ResultMode::Galleries => "gallery_filter",
        ResultMode::Groups => "group_filter",
        ResultMode::Tags => "tag_filter",
    }
}

/// Variable gating a lazy category, e.g. `include_performer_tags`.
pub fn include_variable(category: FacetCategory) -> String {
    format!("include_{}", category.as_str())
}

fn operation_name(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn selection(category: FacetCategory) -> &'static str {
    match category.kind() {
        FacetKind::Labeled => "{ id name count }",
        FacetKind::Enum | FacetKind::Rating | FacetKind::Boolean => "{ value count }",
    }
}

/// Aggregate facet query for a mode.
///
/// Lazy categories are selected behind `@include` and eager ones behind
/// `@skip(if: $incremental)`, so one document serves both full and
/// incremental fetches.
pub fn facets_document(mode: ResultMode) -> String {
    let profile: &ModeProfile = mode.profile();
    let lazy: Vec<FacetCategory> = profile.lazy_categories().collect();

    let mut params = format!(
        "$filter: {}, $q: String, $limit: Int, $exclude: Map, $incremental: Boolean!",
        profile.filter_type
    );
    let mut args = format!(
        "{}: $filter, q: $q, limit: $limit, exclude: $exclude",
        filter_argument(mode)
    );
    for category in &lazy {
        let var = include_variable(*category);
        params.push_str(&format!(", ${var}: Boolean!"));
        args.push_str(&format!(", {var}: ${var}"));
    }

    let mut body = String::new();
    for category in profile.categories {
        let name = category.as_str();
        if category.is_lazy() {
            body.push_str(&format!(
                "    {name} @include(if: ${}) {}\n",
                include_variable(*category),
                selection(*category)
            ));
        } else {
            body.push_str(&format!(
                "    {name} @skip(if: $incremental) {}\n",
                selection(*category)
            ));
        }
    }

    format!(
        "query {}({params}) {{\n  {}({args}) {{\n{body}  }}\n}}",
        operation_name(profile.facets_field),
        profile.facets_field
    )
}

/// Variables for [`facets_document`].
pub fn facets_variables(query: &FacetQuery) -> Value {
    let mut vars = Map::new();
    vars.insert("filter".into(), query.filter.clone());
    vars.insert("q".into(), json!(query.search));
    vars.insert("limit".into(), json!(query.limit));

    let exclude: Map<String, Value> = query
        .exclude
        .iter()
        .map(|(category, keys)| (category.as_str().to_string(), json!(keys)))
        .collect();
    vars.insert("exclude".into(), Value::Object(exclude));
    vars.insert("incremental".into(), json!(query.incremental));

    for category in query.mode.profile().lazy_categories() {
        vars.insert(
            include_variable(category),
            json!(query.is_lazy_requested(category)),
        );
    }
    Value::Object(vars)
}

/// Total-count list query used for per-entity counts.
pub fn count_document(mode: ResultMode) -> String {
    let profile = mode.profile();
    format!(
        "query {}Count($filter: {}, $q: String) {{\n  \
         {}(filter: {{ q: $q, per_page: 0 }}, {}: $filter) {{ count }}\n}}",
        operation_name(profile.find_field),
        profile.filter_type,
        profile.find_field,
        filter_argument(mode)
    )
}

/// Variables for [`count_document`].
pub fn count_variables(query: &CountQuery) -> Value {
    json!({
        "filter": query.effective_filter(),
        "q": query.search,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{Criterion, CriterionModifier, FilterSpec};

    #[test]
    fn test_scene_document_gates_lazy_categories() {
        let doc = facets_document(ResultMode::Scenes);
        assert!(doc.starts_with("query SceneFacets($filter: SceneFilterType"));
        assert!(doc.contains("sceneFacets(scene_filter: $filter"));
        assert!(doc.contains("$include_performer_tags: Boolean!"));
        assert!(doc.contains(
            "performer_tags @include(if: $include_performer_tags) { id name count }"
        ));
        assert!(doc.contains("$incremental: Boolean!"));
        assert!(doc.contains("    tags @skip(if: $incremental) { id name count }"));
        assert!(doc.contains("    organized @skip(if: $incremental) { value count }"));
    }

    #[test]
    fn test_document_without_lazy_categories() {
        let doc = facets_document(ResultMode::Tags);
        assert!(doc.contains("tagFacets(tag_filter: $filter"));
        assert!(!doc.contains("@include"));
        assert!(doc.contains("@skip(if: $incremental)"));
    }

    #[test]
    fn test_facets_variables() {
        let spec = FilterSpec::new(ResultMode::Scenes)
            .with_search("beach")
            .with_criterion(Criterion::ids("tags", CriterionModifier::Includes, ["5"]));
        let query = FacetQuery::for_filter(&spec, 50, [FacetCategory::Captions]);

        let vars = facets_variables(&query);
        assert_eq!(vars["q"], "beach");
        assert_eq!(vars["limit"], 50);
        assert_eq!(vars["exclude"]["tags"], json!(["5"]));
        assert_eq!(vars["include_captions"], true);
        assert_eq!(vars["include_performer_tags"], false);
        assert_eq!(vars["filter"], query.filter);
        assert_eq!(vars["incremental"], false);
    }

    #[test]
    fn test_incremental_variables_skip_eager_categories() {
        let spec = FilterSpec::new(ResultMode::Scenes);
        let query = FacetQuery::for_filter(&spec, 100, [FacetCategory::PerformerTags]).incremental();

        let vars = facets_variables(&query);
        assert_eq!(vars["incremental"], true);
        assert_eq!(vars["include_performer_tags"], true);
        assert_eq!(vars["include_captions"], false);
    }

    #[test]
    fn test_count_document_and_variables() {
        let doc = count_document(ResultMode::Performers);
        assert!(doc.starts_with("query FindPerformersCount($filter: PerformerFilterType"));
        assert!(doc.contains(
            "findPerformers(filter: { q: $q, per_page: 0 }, performer_filter: $filter) { count }"
        ));

        let spec = FilterSpec::new(ResultMode::Scenes);
        let query = CountQuery::for_filter(&spec, FacetCategory::Studios, "7");
        let vars = count_variables(&query);
        assert_eq!(vars["filter"]["studios"]["value"], json!(["7"]));
        assert_eq!(vars["q"], Value::Null);
    }
}
