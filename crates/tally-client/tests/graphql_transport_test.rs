//! Integration tests for `GraphqlTransport` against a mock HTTP server.

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tally_client::{GraphqlConfig, GraphqlTransport};
use tally_core::{
    CountQuery, Criterion, CriterionModifier, Error, FacetCategory, FacetQuery, FacetTransport,
    FilterSpec, ResultMode,
};

fn transport(server: &MockServer) -> GraphqlTransport {
    GraphqlTransport::new(GraphqlConfig::new(server.uri())).expect("Failed to create transport")
}

fn scene_query() -> FacetQuery {
    let spec = FilterSpec::new(ResultMode::Scenes)
        .with_criterion(Criterion::ids("tags", CriterionModifier::Includes, ["5"]));
    FacetQuery::for_filter(&spec, 100, [FacetCategory::PerformerTags])
}

#[tokio::test]
async fn test_fetch_facets_returns_categories() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("Content-Type", "application/json"))
        .and(body_partial_json(json!({
            "variables": {
                "limit": 100,
                "exclude": { "tags": ["5"] },
                "include_performer_tags": true,
                "include_captions": false
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "sceneFacets": {
                    "tags": [{ "id": "6", "name": "Outdoor", "count": 3 }],
                    "organized": [{ "value": true, "count": 10 }]
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = transport(&server)
        .fetch_facets(&scene_query())
        .await
        .expect("facets");

    assert_eq!(
        response.get(FacetCategory::Tags),
        Some(&json!([{ "id": "6", "name": "Outdoor", "count": 3 }]))
    );
    assert!(response.get(FacetCategory::Organized).is_some());
    assert!(response.get(FacetCategory::Studios).is_none());
}

#[tokio::test]
async fn test_incremental_fetch_asks_to_skip_eager_categories() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({
            "variables": { "incremental": true, "include_performer_tags": true }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "sceneFacets": {
                    "performer_tags": [{ "id": "9", "name": "Tall", "count": 2 }]
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = transport(&server)
        .fetch_facets(&scene_query().incremental())
        .await
        .expect("facets");

    assert!(response.get(FacetCategory::PerformerTags).is_some());
    assert!(response.get(FacetCategory::Tags).is_none());
}

#[tokio::test]
async fn test_api_key_header_sent_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("ApiKey", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "tagFacets": {} }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = GraphqlConfig::new(server.uri()).with_api_key("secret");
    let transport = GraphqlTransport::new(config).expect("Failed to create transport");
    let query = FacetQuery::for_filter(&FilterSpec::new(ResultMode::Tags), 100, Vec::new());

    let response = transport.fetch_facets(&query).await.expect("facets");
    assert!(response.categories.is_empty());
}

#[tokio::test]
async fn test_graphql_errors_map_to_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{ "message": "unknown field sceneFacets" }]
        })))
        .mount(&server)
        .await;

    let err = transport(&server)
        .fetch_facets(&scene_query())
        .await
        .unwrap_err();
    match err {
        Error::Transport(msg) => assert!(msg.contains("unknown field sceneFacets")),
        other => panic!("Expected Transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_maps_to_request_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = transport(&server)
        .fetch_facets(&scene_query())
        .await
        .unwrap_err();
    match err {
        Error::Request(msg) => {
            assert!(msg.contains("500"));
            assert!(msg.contains("boom"));
        }
        other => panic!("Expected Request error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_undecodable_body_maps_to_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = transport(&server)
        .fetch_facets(&scene_query())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}

#[tokio::test]
async fn test_count_matching_pins_the_value() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({
            "variables": {
                "filter": { "performers": { "value": ["42"], "modifier": "INCLUDES" } }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "findScenes": { "count": 17 } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let spec = FilterSpec::new(ResultMode::Scenes);
    let query = CountQuery::for_filter(&spec, FacetCategory::Performers, "42");
    let count = transport(&server)
        .count_matching(&query)
        .await
        .expect("count");
    assert_eq!(count, 17);
}

#[tokio::test]
async fn test_count_without_number_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "findScenes": {} }
        })))
        .mount(&server)
        .await;

    let spec = FilterSpec::new(ResultMode::Scenes);
    let query = CountQuery::for_filter(&spec, FacetCategory::Studios, "1");
    let err = transport(&server).count_matching(&query).await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}
