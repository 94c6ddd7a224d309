//! Periodic traffic summaries
//!
//! Whole-file statistics plus a model-written security report over a sample
//! of the raw lines.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{Result, TriageError};
use crate::llm::extract::extract_json_object;
use crate::llm::prompts::summary::REPORT_SECTIONS;
use crate::llm::prompts::{OutputFormat, PromptContext, PromptTemplate, SummaryPrompt};
use crate::llm::provider::{CompletionRequest, LlmProvider};
use crate::logs::record::{LogRow, TIMESTAMP_FORMAT};
use crate::metrics::{round1, span_seconds};

/// Placeholder for report sections the model left out
pub const MISSING_SECTION: &str = "No analysis available";

/// Default number of rows handed to the model
pub const DEFAULT_SAMPLE_SIZE: usize = 500;

/// Headline numbers for a summary window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficSummary {
    pub total_requests: usize,
    pub unique_ips: usize,
    /// Percentage of rows with status >= 400
    pub error_rate: f64,
    /// Percentage of rows with status 200
    pub success_rate: f64,
    pub requests_per_minute: f64,
    /// Human readable mean of `bytes_sent`
    pub avg_response_size: String,
}

impl TrafficSummary {
    pub fn from_rows(rows: &[LogRow]) -> Self {
        let total = rows.len();
        if total == 0 {
            return Self {
                total_requests: 0,
                unique_ips: 0,
                error_rate: 0.0,
                success_rate: 0.0,
                requests_per_minute: 0.0,
                avg_response_size: format_bytes(0.0),
            };
        }

        let unique_ips = rows.iter().map(|r| r.ip.as_str()).collect::<HashSet<_>>().len();
        let errors = rows.iter().filter(|r| r.status >= 400).count();
        let ok = rows.iter().filter(|r| r.status == 200).count();

        let span = span_seconds(rows);
        let requests_per_minute = if span > 0.0 {
            round1(total as f64 / span * 60.0)
        } else {
            total as f64
        };

        let bytes: u64 = rows.iter().map(|r| r.bytes_sent).sum();

        Self {
            total_requests: total,
            unique_ips,
            error_rate: round1(100.0 * errors as f64 / total as f64),
            success_rate: round1(100.0 * ok as f64 / total as f64),
            requests_per_minute,
            avg_response_size: format_bytes(bytes as f64 / total as f64),
        }
    }
}

/// Format a byte count with a base-1024 unit, one decimal
pub fn format_bytes(mut value: f64) -> String {
    for unit in ["B", "KB", "MB", "GB"] {
        if value < 1024.0 {
            return format!("{:.1}{}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1}TB", value)
}

/// Model-written report, one entry per section
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    #[serde(flatten)]
    pub sections: Map<String, Value>,
    /// Sections filled with the placeholder
    #[serde(skip)]
    pub missing: Vec<String>,
}

impl SummaryReport {
    /// Take a decoded reply and fill any absent section
    pub fn from_object(mut sections: Map<String, Value>) -> Self {
        let mut missing = Vec::new();
        for section in REPORT_SECTIONS {
            if !sections.contains_key(section) {
                warn!("Missing section in report: {}", section);
                sections.insert(section.to_string(), Value::String(MISSING_SECTION.to_string()));
                missing.push(section.to_string());
            }
        }
        Self { sections, missing }
    }

    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections.get(name)
    }
}

/// Generates [`SummaryReport`]s
#[derive(Debug)]
pub struct SummaryAnalyzer {
    provider: Arc<dyn LlmProvider>,
    prompt: SummaryPrompt,
    sample_size: usize,
    temperature: Option<f32>,
}

impl SummaryAnalyzer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            prompt: SummaryPrompt::new(),
            sample_size: DEFAULT_SAMPLE_SIZE,
            temperature: None,
        }
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Ask the model for a report over the first `sample_size` rows
    pub async fn generate(&self, rows: &[LogRow]) -> Result<SummaryReport> {
        if rows.is_empty() {
            return Err(TriageError::EmptyBatch);
        }

        let sample = &rows[..rows.len().min(self.sample_size)];
        let lines = sample.iter().map(format_line).collect::<Vec<_>>().join("\n");
        let payload = format!(
            "Analyzing {} log entries (showing sample of {}):\n{}",
            rows.len(),
            sample.len(),
            lines
        );

        let context = PromptContext::new(payload).with_sample(sample.len(), rows.len());
        let mut request = CompletionRequest::new(self.prompt.build_prompt(&context))
            .with_system(self.prompt.system_prompt())
            .with_max_tokens(self.prompt.max_tokens());
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }
        if self.prompt.output_format() == OutputFormat::Json {
            request = request.with_json();
        }

        info!("Requesting summary over {} of {} rows", sample.len(), rows.len());
        let response = self.provider.complete(request).await?;
        debug!("Summary reply: {} chars in {}ms", response.text.len(), response.duration_ms);

        let object = extract_json_object(&response.text)?;
        Ok(SummaryReport::from_object(object))
    }
}

/// One row as a combined-log-format line
fn format_line(row: &LogRow) -> String {
    format!(
        "{} - - [{}] \"{} {} {}\" {} {} \"{}\" \"{}\"",
        row.ip,
        row.timestamp.format(TIMESTAMP_FORMAT),
        row.method,
        row.path,
        row.protocol,
        row.status,
        row.bytes_sent,
        row.referer,
        row.user_agent
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::classifier::tests::ScriptedProvider;
    use crate::metrics::tests::row;

    fn rows() -> Vec<LogRow> {
        let mut rows = vec![
            row("10.0.0.1", "2024-12-30 14:00:00 +0000", 200),
            row("10.0.0.1", "2024-12-30 14:00:30 +0000", 404),
            row("10.0.0.2", "2024-12-30 14:01:00 +0000", 301),
        ];
        rows[2].bytes_sent = 4096;
        rows
    }

    #[test]
    fn test_traffic_summary() {
        let summary = TrafficSummary::from_rows(&rows());
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.unique_ips, 2);
        assert_eq!(summary.error_rate, 33.3);
        assert_eq!(summary.success_rate, 33.3);
        assert_eq!(summary.requests_per_minute, 3.0);
        assert_eq!(summary.avg_response_size, "1.5KB");
    }

    #[test]
    fn test_zero_span_rate_is_total() {
        let rows = vec![
            row("10.0.0.1", "2024-12-30 14:00:00 +0000", 200),
            row("10.0.0.2", "2024-12-30 14:00:00 +0000", 200),
        ];
        assert_eq!(TrafficSummary::from_rows(&rows).requests_per_minute, 2.0);
        assert_eq!(TrafficSummary::from_rows(&[]).avg_response_size, "0.0B");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512.0), "512.0B");
        assert_eq!(format_bytes(1536.0), "1.5KB");
        assert_eq!(format_bytes(5.0 * 1024.0 * 1024.0), "5.0MB");
        assert_eq!(format_bytes(2.0 * 1024f64.powi(4)), "2.0TB");
    }

    #[test]
    fn test_report_fills_missing_sections() {
        let object = serde_json::json!({
            "http_status_distribution": "mostly 200",
            "recommendations": ["rate limit /login"]
        });
        let report = match object {
            Value::Object(map) => SummaryReport::from_object(map),
            _ => unreachable!(),
        };

        assert_eq!(report.missing.len(), 4);
        assert_eq!(report.section("user_agent_analysis"), Some(&Value::from(MISSING_SECTION)));
        assert_eq!(report.section("http_status_distribution"), Some(&Value::from("mostly 200")));
    }

    #[tokio::test]
    async fn test_generate_samples_rows() {
        let provider = Arc::new(ScriptedProvider::default().reply_any(
            "```json\n{\"http_status_distribution\": \"ok\", \"suspicious_ip_activity\": [], \"large_response_anomalies\": [], \"suspicious_path_analysis\": [], \"user_agent_analysis\": {}, \"recommendations\": []}\n```",
        ));
        let analyzer = SummaryAnalyzer::new(provider.clone()).with_sample_size(2);

        let report = analyzer.generate(&rows()).await.unwrap();
        assert!(report.missing.is_empty());

        let prompt = provider.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("sample of 2 entries from a total of 3"));
        assert!(prompt.contains("10.0.0.1 - - [2024-12-30 14:00:00 +0000] \"GET / HTTP/1.1\" 200 256"));
        assert!(!prompt.contains("10.0.0.2 - -"));
    }

    #[tokio::test]
    async fn test_generate_rejects_prose() {
        let provider = Arc::new(ScriptedProvider::default().reply_any("Everything looks fine."));
        let analyzer = SummaryAnalyzer::new(provider);
        assert!(matches!(
            analyzer.generate(&rows()).await,
            Err(TriageError::ResponseParse(_))
        ));
        assert!(matches!(
            analyzer.generate(&[]).await,
            Err(TriageError::EmptyBatch)
        ));
    }
}
