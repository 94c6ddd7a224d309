//! Cross-batch memory
//!
//! Prior classifications are written to an external memory service and
//! searched again when the same source shows up in a later batch. Every
//! call here is best-effort: callers log failures and carry on without
//! context.

mod mem0;

pub use mem0::Mem0Client;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Memory store errors
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory store unavailable: {0}")]
    Unavailable(String),

    #[error("memory request failed: {0}")]
    Request(String),

    #[error("invalid memory response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for MemoryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            MemoryError::Unavailable(err.to_string())
        } else {
            MemoryError::Request(err.to_string())
        }
    }
}

/// One remembered fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub memory: String,
}

/// Role/content pair recorded as an interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMessage {
    pub role: String,
    pub content: String,
}

impl MemoryMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// External memory collaborator
#[async_trait]
pub trait MemoryStore: Send + Sync + std::fmt::Debug {
    /// Search memories relevant to `query`, most relevant first
    async fn search(&self, query: &str, user_id: &str) -> Result<Vec<MemoryEntry>, MemoryError>;

    /// Record an interaction
    async fn add(&self, messages: Vec<MemoryMessage>, user_id: &str) -> Result<(), MemoryError>;
}

/// Memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Enable memory lookups and writes
    pub enabled: bool,
    /// Service base URL
    pub url: String,
    /// API key (falls back to MEM0_API_KEY)
    pub api_key: Option<String>,
    /// Identifier all memories of this deployment are stored under
    pub session_id: String,
    /// Request timeout
    pub timeout_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "https://api.mem0.ai".to_string(),
            api_key: None,
            session_id: "weblog-triage".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Build the configured store, if any
pub fn create_store(config: &MemoryConfig) -> Result<Option<Arc<dyn MemoryStore>>, MemoryError> {
    if !config.enabled {
        return Ok(None);
    }
    Ok(Some(Arc::new(Mem0Client::new(config.clone())?)))
}

/// Render search results as prompt context
pub fn format_context(entries: &[MemoryEntry]) -> String {
    if entries.is_empty() {
        return String::new();
    }

    let joined = entries
        .iter()
        .map(|e| e.memory.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    format!("Previous relevant log details: {}", joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MemoryConfig::default();
        assert!(!config.enabled);
        assert!(create_store(&config).unwrap().is_none());
    }

    #[test]
    fn test_format_context() {
        assert_eq!(format_context(&[]), "");

        let entries = vec![
            MemoryEntry {
                memory: "10.0.0.5 flagged abnormal".to_string(),
            },
            MemoryEntry {
                memory: "uses sqlmap".to_string(),
            },
        ];
        assert_eq!(
            format_context(&entries),
            "Previous relevant log details: 10.0.0.5 flagged abnormal uses sqlmap"
        );
    }
}
