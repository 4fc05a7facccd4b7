//! `FacetTransport` over GraphQL/HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use tally_core::{CountQuery, Error, FacetQuery, FacetResponse, FacetTransport, Result, ResultMode};

use crate::config::GraphqlConfig;
use crate::documents;

#[derive(Debug, Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

/// GraphQL client for the counting backend.
pub struct GraphqlTransport {
    client: Client,
    config: GraphqlConfig,
}

impl GraphqlTransport {
    /// Create a transport with the given configuration.
    pub fn new(config: GraphqlConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "client",
            component = "graphql",
            url = %config.endpoint(),
            timeout_secs = config.timeout_secs,
            "Initializing GraphQL transport"
        );

        Ok(Self { client, config })
    }

    /// Create from `TALLY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(GraphqlConfig::from_env())
    }

    pub fn config(&self) -> &GraphqlConfig {
        &self.config
    }

    /// Post one document and return its `data` object.
    async fn execute(&self, document: &str, variables: Value) -> Result<Map<String, Value>> {
        let body = GraphqlRequest {
            query: document,
            variables,
        };

        let mut request = self.client.post(self.config.endpoint()).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.header("ApiKey", api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(
                subsystem = "client",
                status = status.as_u16(),
                "GraphQL request rejected"
            );
            return Err(Error::Request(format!("HTTP {}: {}", status, text)));
        }

        let text = response.text().await?;
        let parsed: GraphqlResponse = serde_json::from_str(&text)
            .map_err(|e| Error::Transport(format!("Undecodable GraphQL response: {}", e)))?;

        if !parsed.errors.is_empty() {
            let messages: Vec<&str> = parsed.errors.iter().map(|e| e.message.as_str()).collect();
            return Err(Error::Transport(messages.join("; ")));
        }

        match parsed.data {
            Some(Value::Object(data)) => Ok(data),
            _ => Err(Error::Transport("GraphQL response has no data".into())),
        }
    }
}

fn root_field(mut data: Map<String, Value>, field: &str, mode: ResultMode) -> Result<Value> {
    data.remove(field)
        .filter(|v| !v.is_null())
        .ok_or_else(|| Error::Transport(format!("missing `{}` in {} response", field, mode)))
}

#[async_trait]
impl FacetTransport for GraphqlTransport {
    async fn fetch_facets(&self, query: &FacetQuery) -> Result<FacetResponse> {
        let profile = query.mode.profile();
        let document = documents::facets_document(query.mode);
        let data = self
            .execute(&document, documents::facets_variables(query))
            .await?;

        match root_field(data, profile.facets_field, query.mode)? {
            Value::Object(categories) => {
                debug!(
                    subsystem = "client",
                    mode = %query.mode,
                    result_count = categories.len(),
                    "Facet response decoded"
                );
                Ok(FacetResponse { categories })
            }
            other => Err(Error::Transport(format!(
                "`{}` is not an object: {}",
                profile.facets_field, other
            ))),
        }
    }

    async fn count_matching(&self, query: &CountQuery) -> Result<u64> {
        let profile = query.mode.profile();
        let document = documents::count_document(query.mode);
        let data = self
            .execute(&document, documents::count_variables(query))
            .await?;

        root_field(data, profile.find_field, query.mode)?
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                Error::Transport(format!("`{}.count` is not a count", profile.find_field))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_root_field_rejects_null() {
        let data = json!({ "sceneFacets": null });
        let Value::Object(map) = data else { unreachable!() };
        assert!(root_field(map, "sceneFacets", ResultMode::Scenes).is_err());
    }

    #[test]
    fn test_graphql_response_defaults() {
        let parsed: GraphqlResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.data.is_none());
        assert!(parsed.errors.is_empty());
    }

    #[test]
    fn test_new_with_defaults() {
        let transport = GraphqlTransport::new(GraphqlConfig::default()).unwrap();
        assert_eq!(transport.config().endpoint(), "http://localhost:9999/graphql");
    }
}
