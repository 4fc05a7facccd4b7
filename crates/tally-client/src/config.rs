//! Connection settings for the GraphQL transport.

use tally_core::defaults;

/// Environment variable holding the backend base URL.
pub const ENV_GRAPHQL_URL: &str = "TALLY_GRAPHQL_URL";

/// Environment variable holding the API key.
pub const ENV_API_KEY: &str = "TALLY_API_KEY";

/// Environment variable holding the request timeout in seconds.
pub const ENV_TIMEOUT_SECS: &str = "TALLY_TIMEOUT_SECS";

/// Configuration for [`GraphqlTransport`](crate::GraphqlTransport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphqlConfig {
    /// Base URL; requests go to `{base_url}/graphql`.
    pub base_url: String,
    /// Sent as the `ApiKey` header when set.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GraphqlConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::GRAPHQL_URL.to_string(),
            api_key: None,
            timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

impl GraphqlConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs.max(1);
        self
    }

    /// Read settings from `TALLY_GRAPHQL_URL`, `TALLY_API_KEY` and
    /// `TALLY_TIMEOUT_SECS`, falling back to defaults.
    ///
    /// An empty API key is treated as unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base_url = lookup(ENV_GRAPHQL_URL)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| defaults::GRAPHQL_URL.to_string());
        let api_key = lookup(ENV_API_KEY).filter(|s| !s.is_empty());
        let timeout_secs = lookup(ENV_TIMEOUT_SECS)
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults::REQUEST_TIMEOUT_SECS);

        Self {
            base_url,
            api_key,
            timeout_secs,
        }
    }

    /// Full endpoint URL.
    pub fn endpoint(&self) -> String {
        format!("{}/graphql", self.base_url.trim_end_matches('/'))
    }
}
