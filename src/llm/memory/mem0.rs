//! Mem0 memory client
//!
//! https://docs.mem0.ai/ (v1 REST API)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{MemoryConfig, MemoryEntry, MemoryError, MemoryMessage, MemoryStore};

/// Mem0 REST client
#[derive(Debug)]
pub struct Mem0Client {
    config: MemoryConfig,
    client: Client,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    user_id: &'a str,
}

#[derive(Debug, Serialize)]
struct AddRequest<'a> {
    messages: Vec<MemoryMessage>,
    user_id: &'a str,
}

/// Search replies come back either as a bare list or wrapped in `results`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    List(Vec<MemoryEntry>),
    Wrapped { results: Vec<MemoryEntry> },
}

impl SearchResponse {
    fn into_entries(self) -> Vec<MemoryEntry> {
        match self {
            Self::List(entries) | Self::Wrapped { results: entries } => entries,
        }
    }
}

impl Mem0Client {
    pub fn new(config: MemoryConfig) -> Result<Self, MemoryError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("MEM0_API_KEY").ok())
            .ok_or_else(|| MemoryError::Unavailable("Mem0 API key not found".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MemoryError::Request(e.to_string()))?;

        Ok(Self {
            config,
            client,
            api_key,
        })
    }

    fn search_url(&self) -> String {
        format!("{}/v1/memories/search/", self.config.url.trim_end_matches('/'))
    }

    fn add_url(&self) -> String {
        format!("{}/v1/memories/", self.config.url.trim_end_matches('/'))
    }
}

#[async_trait]
impl MemoryStore for Mem0Client {
    async fn search(&self, query: &str, user_id: &str) -> Result<Vec<MemoryEntry>, MemoryError> {
        let response = self
            .client
            .post(self.search_url())
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&SearchRequest { query, user_id })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MemoryError::Request(format!("HTTP {}", response.status())));
        }

        let entries = response
            .json::<SearchResponse>()
            .await
            .map_err(|e| MemoryError::InvalidResponse(e.to_string()))?
            .into_entries();

        debug!("Mem0 search returned {} memories", entries.len());
        Ok(entries)
    }

    async fn add(&self, messages: Vec<MemoryMessage>, user_id: &str) -> Result<(), MemoryError> {
        let response = self
            .client
            .post(self.add_url())
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&AddRequest { messages, user_id })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MemoryError::Request(format!("HTTP {}", response.status())));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let client = Mem0Client::new(MemoryConfig {
            api_key: Some("m0-test".to_string()),
            url: "https://api.mem0.ai/".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(client.search_url(), "https://api.mem0.ai/v1/memories/search/");
        assert_eq!(client.add_url(), "https://api.mem0.ai/v1/memories/");
    }

    #[test]
    fn test_search_response_shapes() {
        let list: SearchResponse =
            serde_json::from_str(r#"[{"id": "1", "memory": "a", "score": 0.9}]"#).unwrap();
        assert_eq!(list.into_entries().len(), 1);

        let wrapped: SearchResponse =
            serde_json::from_str(r#"{"results": [{"memory": "a"}, {"memory": "b"}]}"#).unwrap();
        assert_eq!(wrapped.into_entries()[1].memory, "b");
    }
}
