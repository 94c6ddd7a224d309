//! Ollama LLM Provider
//!
//! Local LLM provider using Ollama server.
//! https://ollama.ai/

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CompletionRequest, CompletionResponse, LlmError, LlmProvider, ProviderHealth};
use crate::llm::config::{OllamaConfig, ProviderType};

/// Ollama provider
#[derive(Debug)]
pub struct OllamaProvider {
    config: OllamaConfig,
    client: Client,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    pub fn new(config: OllamaConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Get the chat API URL
    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.config.url.trim_end_matches('/'))
    }

    /// Get the tags API URL (for health check)
    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.config.url.trim_end_matches('/'))
    }
}

/// Ollama chat request
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
}

/// Ollama message
#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

/// Ollama options
#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<usize>,
}

/// Ollama chat response
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    model: String,
    message: OllamaChatMessage,
    #[serde(default)]
    prompt_eval_count: Option<usize>,
    #[serde(default)]
    eval_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatMessage {
    content: String,
}

/// Ollama tags response
#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Ollama
    }

    async fn health_check(&self) -> Result<ProviderHealth, LlmError> {
        let start = Instant::now();

        let response = self
            .client
            .get(self.tags_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        let resp = match response {
            Ok(resp) => resp,
            Err(e) => {
                return Ok(ProviderHealth {
                    available: false,
                    provider: "ollama".to_string(),
                    model: None,
                    latency_ms: Some(start.elapsed().as_millis() as u64),
                    error: Some(e.to_string()),
                });
            }
        };

        if !resp.status().is_success() {
            return Ok(ProviderHealth {
                available: false,
                provider: "ollama".to_string(),
                model: None,
                latency_ms: Some(start.elapsed().as_millis() as u64),
                error: Some(format!("HTTP {}", resp.status())),
            });
        }

        let tags: OllamaTagsResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let model_available = tags
            .models
            .iter()
            .any(|m| m.name.starts_with(&self.config.model));

        Ok(ProviderHealth {
            available: model_available,
            provider: "ollama".to_string(),
            model: model_available.then(|| self.config.model.clone()),
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: (!model_available).then(|| format!("Model {} not found", self.config.model)),
        })
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let start = Instant::now();

        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(OllamaMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(OllamaMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        let ollama_request = OllamaChatRequest {
            model: self.config.model.clone(),
            messages,
            stream: false,
            options: Some(OllamaOptions {
                temperature: request.temperature.or(Some(self.config.temperature)),
                num_ctx: Some(self.config.num_ctx),
                num_predict: request.max_tokens,
            }),
            format: request.json.then(|| "json".to_string()),
        };

        debug!("Sending Ollama request: model={}", self.config.model);

        let response = self
            .client
            .post(self.chat_url())
            .json(&ollama_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Ollama error: {} - {}", status, body);

            if status.as_u16() == 404 {
                return Err(LlmError::ModelNotFound(self.config.model.clone()));
            }
            return Err(LlmError::Internal(format!("HTTP {}: {}", status, body)));
        }

        let ollama_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Ok(CompletionResponse {
            text: ollama_response.message.content,
            prompt_tokens: ollama_response.prompt_eval_count,
            completion_tokens: ollama_response.eval_count,
            model: ollama_response.model,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
