//! LLM Prompt Templates
//!
//! Structured prompts for per-source classification and periodic summaries.

pub mod pattern;
pub mod summary;

pub use pattern::PatternPrompt;
pub use summary::SummaryPrompt;

/// Base prompt template
pub trait PromptTemplate {
    /// Get the system prompt
    fn system_prompt(&self) -> &str;

    /// Build the user prompt with context
    fn build_prompt(&self, context: &PromptContext) -> String;

    /// Get expected output format
    fn output_format(&self) -> OutputFormat;

    /// Get maximum tokens for response
    fn max_tokens(&self) -> usize {
        2048
    }
}

/// Output format for LLM responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text response
    Text,
    /// JSON response
    Json,
}

/// Context for prompt building
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    /// Serialized data under analysis
    pub payload: String,
    /// Memory context (may be empty)
    pub memory: String,
    /// Entries in the full data set, when `payload` is a sample
    pub total_entries: Option<usize>,
    /// Entries included in `payload`
    pub sampled_entries: Option<usize>,
}

impl PromptContext {
    /// Create a new prompt context
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            ..Default::default()
        }
    }

    /// Add memory context
    pub fn with_memory(mut self, memory: impl Into<String>) -> Self {
        self.memory = memory.into();
        self
    }

    /// Describe the sample the payload was cut from
    pub fn with_sample(mut self, sampled: usize, total: usize) -> Self {
        self.sampled_entries = Some(sampled);
        self.total_entries = Some(total);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_context() {
        let ctx = PromptContext::new("{}").with_memory("seen before").with_sample(5, 50);
        assert_eq!(ctx.memory, "seen before");
        assert_eq!(ctx.sampled_entries, Some(5));
        assert_eq!(ctx.total_entries, Some(50));
    }
}
