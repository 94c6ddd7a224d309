//! LLM Integration Module
//!
//! Model-backed analysis of access-log batches:
//! - Per-source classification of each batch (`classifier`)
//! - Reply extraction and schema validation (`extract`, `prediction`)
//! - Cross-batch memory (`memory`)
//! - Prompt templates for classification and periodic summaries (`prompts`)
//!
//! # Providers
//!
//! - **Ollama** (default): local LLM server
//! - **OpenAI**: OpenAI-compatible endpoints, including Azure OpenAI
//!   deployments

pub mod classifier;
pub mod config;
pub mod extract;
pub mod memory;
pub mod prediction;
pub mod prompts;
pub mod provider;

// Re-exports for convenience
pub use classifier::{BatchClassifier, ClassifierStats, GroupFailure, GroupKey, GroupStage, GroupSummary};
pub use config::{LlmConfig, ProviderType};
pub use extract::extract_json_object;
pub use memory::{MemoryConfig, MemoryEntry, MemoryError, MemoryMessage, MemoryStore};
pub use prediction::{Prediction, ThreatPrediction};
pub use prompts::{OutputFormat, PromptContext, PromptTemplate};
pub use provider::{create_provider, CompletionRequest, CompletionResponse, LlmError, LlmProvider};
