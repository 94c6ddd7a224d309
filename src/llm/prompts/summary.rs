//! Periodic Summary Prompt
//!
//! Asks for a sectioned security report over a sample of raw log lines.

use super::{OutputFormat, PromptContext, PromptTemplate};

/// Report sections the model must fill, with a description of each
pub const REPORT_TEMPLATE: &str = r#"{
  "http_status_distribution": "Distribution analysis of HTTP status codes",
  "suspicious_ip_activity": [
    {"ip": "IP address", "requests": "Number of requests", "comment": "Analysis of the activity"}
  ],
  "large_response_anomalies": [
    {"size": "Response size in bytes", "path": "Request path", "comment": "Analysis of the anomaly"}
  ],
  "suspicious_path_analysis": [
    {"path": "Suspicious path", "occurrences": "Number of occurrences", "comment": "Analysis of the suspicious activity"}
  ],
  "user_agent_analysis": {
    "browser_distribution": {"browser_name": "percentage"},
    "suspicious_agents": ["List of suspicious user agents"]
  },
  "recommendations": ["List of security recommendations"]
}"#;

/// Section keys of [`REPORT_TEMPLATE`]
pub const REPORT_SECTIONS: [&str; 6] = [
    "http_status_distribution",
    "suspicious_ip_activity",
    "large_response_anomalies",
    "suspicious_path_analysis",
    "user_agent_analysis",
    "recommendations",
];

/// Periodic summary prompt template
#[derive(Debug)]
pub struct SummaryPrompt {
    system: String,
}

impl SummaryPrompt {
    pub fn new() -> Self {
        Self {
            system: SUMMARY_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl Default for SummaryPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptTemplate for SummaryPrompt {
    fn system_prompt(&self) -> &str {
        &self.system
    }

    fn build_prompt(&self, context: &PromptContext) -> String {
        let total = context.total_entries.unwrap_or(0);
        let sampled = context.sampled_entries.unwrap_or(total);

        let mut prompt = String::new();
        prompt.push_str("Analyze these access logs and provide a security analysis report.\n");
        prompt.push_str(&format!(
            "This is a sample of {} entries from a total of {} log entries.\n\n",
            sampled, total
        ));
        prompt.push_str("## Sample logs\n");
        prompt.push_str(&context.payload);
        prompt.push_str("\n\n## Output format\n");
        prompt.push_str("Provide your analysis as a JSON object with exactly these keys:\n");
        prompt.push_str(REPORT_TEMPLATE);
        prompt.push_str("\n\nEnsure the response is one properly formatted JSON object with every section.\n");
        prompt
    }

    fn output_format(&self) -> OutputFormat {
        OutputFormat::Json
    }

    fn max_tokens(&self) -> usize {
        4096
    }
}

const SUMMARY_SYSTEM_PROMPT: &str = r#"You are an expert security analyst. Analyze the provided web access logs and write a detailed security report.
Focus on patterns, anomalies, and potential security concerns, and give specific recommendations based on what you observe.
Your response must be a valid JSON object with the exact structure provided."#;
