//! LLM Configuration
//!
//! Provider selection and per-backend settings. Local Ollama is the
//! default; an OpenAI-compatible endpoint (including Azure OpenAI
//! deployments) can be selected instead.

use serde::{Deserialize, Serialize};

/// Main LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider to use
    #[serde(default)]
    pub provider: ProviderType,
    /// Ollama configuration
    #[serde(default)]
    pub ollama: OllamaConfig,
    /// OpenAI / Azure OpenAI configuration
    #[serde(default)]
    pub openai: OpenAIConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderType::Ollama,
            ollama: OllamaConfig::default(),
            openai: OpenAIConfig::default(),
        }
    }
}

impl LlmConfig {
    /// Sampling temperature of the selected provider
    pub fn temperature(&self) -> f32 {
        match self.provider {
            ProviderType::Ollama => self.ollama.temperature,
            ProviderType::OpenAI => self.openai.temperature,
        }
    }
}

/// LLM provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Ollama local server
    #[default]
    Ollama,
    /// OpenAI-compatible API
    OpenAI,
}

/// Ollama configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Server URL
    pub url: String,
    /// Model name to use
    pub model: String,
    /// Request timeout
    pub timeout_secs: u64,
    /// Context window size
    pub num_ctx: usize,
    /// Temperature for generation
    pub temperature: f32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:11434".to_string(),
            model: "llama3.2".to_string(),
            timeout_secs: 120,
            num_ctx: 8192,
            temperature: 0.1,
        }
    }
}

/// OpenAI-compatible API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAIConfig {
    /// API key (falls back to OPENAI_API_KEY / AZURE_OPENAI_API_KEY)
    pub api_key: Option<String>,
    /// API base URL; for Azure, the resource endpoint
    pub base_url: String,
    /// Model to use
    pub model: String,
    /// Azure deployment name; switches to Azure URL layout and auth
    pub azure_deployment: Option<String>,
    /// Azure API version
    pub api_version: String,
    /// Request timeout
    pub timeout_secs: u64,
    /// Max tokens per request
    pub max_tokens: usize,
    /// Temperature
    pub temperature: f32,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            azure_deployment: None,
            api_version: "2023-05-15".to_string(),
            timeout_secs: 60,
            max_tokens: 4096,
            temperature: 0.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LlmConfig::default();
        assert_eq!(config.provider, ProviderType::Ollama);
        assert_eq!(config.temperature(), 0.1);
    }

    #[test]
    fn test_ollama_config() {
        let config = OllamaConfig::default();
        assert_eq!(config.url, "http://127.0.0.1:11434");
        assert_eq!(config.model, "llama3.2");
    }

    #[test]
    fn test_provider_type_serde() {
        let config: LlmConfig = toml::from_str("provider = \"openai\"").unwrap();
        assert_eq!(config.provider, ProviderType::OpenAI);
        assert!(config.openai.azure_deployment.is_none());
    }
}
