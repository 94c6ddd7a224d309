//! Source Activity Classification Prompt
//!
//! Asks the model whether one source's activity within a batch is normal
//! or abnormal, answering in the prediction schema.

use super::{OutputFormat, PromptContext, PromptTemplate};
use crate::llm::prediction::PREDICTION_SCHEMA;

/// Per-source classification prompt template
#[derive(Debug)]
pub struct PatternPrompt {
    system: String,
}

impl PatternPrompt {
    /// Create a new classification prompt
    pub fn new() -> Self {
        Self {
            system: PATTERN_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl Default for PatternPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptTemplate for PatternPrompt {
    fn system_prompt(&self) -> &str {
        &self.system
    }

    fn build_prompt(&self, context: &PromptContext) -> String {
        let mut prompt = String::new();

        prompt.push_str(PATTERN_INSTRUCTIONS);
        prompt.push_str("\n\n## Context\n");
        if context.memory.is_empty() {
            prompt.push_str("(no prior context)");
        } else {
            prompt.push_str(&context.memory);
        }
        prompt.push_str("\n\n## Log activity summary\n");
        prompt.push_str(&context.payload);
        prompt.push_str("\n\n## Output format\n");
        prompt.push_str("Respond with a single JSON object conforming to this schema:\n");
        prompt.push_str(PREDICTION_SCHEMA);
        prompt.push('\n');

        prompt
    }

    fn output_format(&self) -> OutputFormat {
        OutputFormat::Json
    }

    fn max_tokens(&self) -> usize {
        1024
    }
}

const PATTERN_SYSTEM_PROMPT: &str = r#"You are an expert web security analyst classifying HTTP access-log activity.
Each request gives you the activity of one source within a short window.
Respond only with valid JSON that matches the requested schema."#;

const PATTERN_INSTRUCTIONS: &str = r#"Classify the following web server activity summary as "normal" or "abnormal".
Use the context of earlier summaries, if any, as a baseline: a source that was flagged before and shows up again should be treated with suspicion.

Weigh these factors together:

1. Request frequency: requests per second over the window, spikes, sustained bursts.
2. Status codes: the mix of 2xx/3xx/4xx/5xx, in particular high 4xx or 5xx ratios.
3. Paths: repeated hits on the same resource, probes for admin panels, dotfiles, backups, or CMS endpoints.
4. User agent: real browsers versus scripts, scanners, and crawlers. Treat self-declared bots as abnormal.
5. Methods: unusual distributions such as bursts of POST, PUT, or DELETE.

Report the prediction, a reasoning object (pattern_type, description, confidence from 0 to 100, indicators) and a metrics object (requests_per_second, time_window_seconds)."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_prompt_embeds_payload_and_schema() {
        let prompt = PatternPrompt::new();
        let context = PromptContext::new(r#"{"ip":"10.0.0.7"}"#)
            .with_memory("Previous relevant log details: 10.0.0.7 abnormal");

        let built = prompt.build_prompt(&context);
        assert!(built.contains("10.0.0.7"));
        assert!(built.contains("Previous relevant log details"));
        assert!(built.contains("\"enum\": [\"normal\", \"abnormal\"]"));
    }

    #[test]
    fn test_empty_memory_placeholder() {
        let built = PatternPrompt::new().build_prompt(&PromptContext::new("{}"));
        assert!(built.contains("(no prior context)"));
    }

    #[test]
    fn test_output_format() {
        assert_eq!(PatternPrompt::new().output_format(), OutputFormat::Json);
    }
}
