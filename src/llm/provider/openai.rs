//! OpenAI API Provider
//!
//! Cloud LLM provider for the OpenAI chat completions API. Setting
//! `azure_deployment` switches to an Azure OpenAI deployment: the URL gains
//! the deployment path and `api-version` query, and auth moves to the
//! `api-key` header.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CompletionRequest, CompletionResponse, LlmError, LlmProvider, ProviderHealth};
use crate::llm::config::{OpenAIConfig, ProviderType};

/// OpenAI provider
#[derive(Debug)]
pub struct OpenAIProvider {
    config: OpenAIConfig,
    client: Client,
    api_key: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider
    pub fn new(config: OpenAIConfig) -> Result<Self, LlmError> {
        let env_var = if config.azure_deployment.is_some() {
            "AZURE_OPENAI_API_KEY"
        } else {
            "OPENAI_API_KEY"
        };
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(env_var).ok())
            .ok_or_else(|| LlmError::Authentication(format!("API key not found (set {})", env_var)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            api_key,
        })
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// Get the chat completions URL
    fn chat_url(&self) -> String {
        match &self.config.azure_deployment {
            Some(deployment) => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.base(),
                deployment,
                self.config.api_version
            ),
            None => format!("{}/chat/completions", self.base()),
        }
    }

    /// Get the models URL
    fn models_url(&self) -> String {
        match &self.config.azure_deployment {
            Some(_) => format!(
                "{}/openai/models?api-version={}",
                self.base(),
                self.config.api_version
            ),
            None => format!("{}/models", self.base()),
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        if self.config.azure_deployment.is_some() {
            builder.header("api-key", &self.api_key)
        } else {
            builder.header("Authorization", format!("Bearer {}", self.api_key))
        }
    }

    fn health(&self, available: bool, start: Instant, error: Option<String>) -> ProviderHealth {
        ProviderHealth {
            available,
            provider: self.name().to_string(),
            model: available.then(|| self.config.model.clone()),
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error,
        }
    }
}

/// OpenAI chat request
#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

/// OpenAI chat response
#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

/// OpenAI error response
#[derive(Debug, Deserialize)]
struct OpenAIError {
    error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    message: String,
    code: Option<String>,
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    fn name(&self) -> &str {
        if self.config.azure_deployment.is_some() {
            "azure-openai"
        } else {
            "openai"
        }
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenAI
    }

    async fn health_check(&self) -> Result<ProviderHealth, LlmError> {
        let start = Instant::now();

        let response = self
            .authorize(self.client.get(self.models_url()))
            .timeout(Duration::from_secs(10))
            .send()
            .await;

        Ok(match response {
            Ok(resp) if resp.status().is_success() => self.health(true, start, None),
            Ok(resp) if resp.status().as_u16() == 401 => {
                self.health(false, start, Some("Invalid API key".to_string()))
            }
            Ok(resp) => self.health(false, start, Some(format!("HTTP {}", resp.status()))),
            Err(e) => self.health(false, start, Some(e.to_string())),
        })
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let start = Instant::now();

        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(OpenAIMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        let openai_request = OpenAIChatRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: request.max_tokens.or(Some(self.config.max_tokens)),
            temperature: request.temperature.or(Some(self.config.temperature)),
            response_format: request.json.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        debug!("Sending {} request: model={}", self.name(), self.config.model);

        let response = self
            .authorize(self.client.post(self.chat_url()))
            .json(&openai_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();

            if status.as_u16() == 429 {
                return Err(LlmError::RateLimited("Rate limit exceeded".to_string()));
            }
            if status.as_u16() == 401 {
                return Err(LlmError::Authentication("Invalid API key".to_string()));
            }

            if let Ok(error) = response.json::<OpenAIError>().await {
                warn!("OpenAI error: {}", error.error.message);
                if error.error.code.as_deref() == Some("model_not_found")
                    || error.error.code.as_deref() == Some("DeploymentNotFound")
                {
                    return Err(LlmError::ModelNotFound(self.config.model.clone()));
                }
                return Err(LlmError::Internal(error.error.message));
            }

            return Err(LlmError::Internal(format!("HTTP {}", status)));
        }

        let openai_response: OpenAIChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let text = openai_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("No content in response".to_string()))?;

        Ok(CompletionResponse {
            text,
            prompt_tokens: openai_response.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens: openai_response.usage.as_ref().map(|u| u.completion_tokens),
            model: openai_response.model,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
