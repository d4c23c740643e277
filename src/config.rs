//! Client configuration

use crate::types::DEFAULT_LANGUAGE;

/// Production API root
pub const DEFAULT_ENDPOINT: &str = "https://api.biocaching.com/";

/// Settings for a [`crate::Biocaching`] client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    endpoint: String,
    api_key: String,
    default_language: String,
}

impl ClientConfig {
    /// Configuration for the production API with the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            default_language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    /// Use another API root; a trailing `/` is added when missing
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let mut endpoint = endpoint.into();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        self.endpoint = endpoint;
        self
    }

    /// Language seeded on first run (ISO 639-2). A persisted preference wins.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// Absolute URL of `path` under the endpoint
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path.trim_start_matches('/'))
    }
}
