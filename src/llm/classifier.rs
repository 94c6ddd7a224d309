//! Per-source batch classification
//!
//! Splits a batch into groups (one per source address by default), asks the
//! model about each group independently, and keeps only the replies that
//! survive extraction and schema validation. A failing group never aborts
//! the batch.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::extract::extract_json_object;
use super::memory::{format_context, MemoryMessage, MemoryStore};
use super::prediction::{validate_prediction, ThreatPrediction};
use super::prompts::{OutputFormat, PatternPrompt, PromptContext, PromptTemplate};
use super::provider::{CompletionRequest, LlmProvider};
use crate::error::TriageError;
use crate::logs::record::{LogRow, DISPLAY_FORMAT};

/// Field rows are grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    /// Source address
    #[default]
    SourceIp,
    /// User-Agent header
    UserAgent,
}

impl GroupKey {
    pub fn key_of<'a>(&self, row: &'a LogRow) -> &'a str {
        match self {
            Self::SourceIp => &row.ip,
            Self::UserAgent => &row.user_agent,
        }
    }
}

/// Partition rows by key, groups ordered by first appearance
pub fn group_rows<'a>(rows: &'a [LogRow], key: GroupKey) -> Vec<(String, Vec<&'a LogRow>)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<&LogRow>)> = Vec::new();

    for row in rows {
        let k = key.key_of(row);
        match index.get(k) {
            Some(&i) => groups[i].1.push(row),
            None => {
                index.insert(k, groups.len());
                groups.push((k.to_string(), vec![row]));
            }
        }
    }

    groups
}

/// Start and end of a group's activity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

/// Model input for one group
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub ip: String,
    /// Request count per method
    pub method: BTreeMap<String, usize>,
    /// Distinct paths in first-seen order
    pub paths: Vec<String>,
    pub status_codes: BTreeMap<u16, usize>,
    pub user_agent: String,
    pub request_count: usize,
    pub time_window: TimeWindow,
    #[serde(skip)]
    pub earliest: DateTime<FixedOffset>,
}

impl GroupSummary {
    pub fn from_rows(rows: &[&LogRow]) -> Option<Self> {
        let first = rows.first()?;
        let earliest = rows.iter().map(|r| r.timestamp).min()?;
        let latest = rows.iter().map(|r| r.timestamp).max()?;

        let mut method = BTreeMap::new();
        let mut status_codes = BTreeMap::new();
        let mut paths: Vec<String> = Vec::new();
        for row in rows {
            *method.entry(row.method.clone()).or_insert(0) += 1;
            *status_codes.entry(row.status).or_insert(0) += 1;
            if !paths.contains(&row.path) {
                paths.push(row.path.clone());
            }
        }

        Some(Self {
            ip: first.ip.clone(),
            method,
            paths,
            status_codes,
            user_agent: first.user_agent.clone(),
            request_count: rows.len(),
            time_window: TimeWindow {
                start: earliest.format(DISPLAY_FORMAT).to_string(),
                end: latest.format(DISPLAY_FORMAT).to_string(),
            },
            earliest,
        })
    }
}

/// Progress of one group through classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GroupStage {
    Pending,
    ContextFetched,
    ContextSkipped,
    Prompted,
    RawReplyReceived,
    Parsed,
    Validated,
}

/// A group that did not make it to `Validated`
#[derive(Debug, Error)]
#[error("group {key} failed after {stage:?}: {error}")]
pub struct GroupFailure {
    pub key: String,
    /// Last stage reached before the failure
    pub stage: GroupStage,
    pub error: TriageError,
}

impl GroupFailure {
    fn new(key: &str, stage: GroupStage, error: impl Into<TriageError>) -> Self {
        Self {
            key: key.to_string(),
            stage,
            error: error.into(),
        }
    }
}

/// Classifier statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierStats {
    /// Groups attempted
    pub total_groups: u64,
    /// Groups that produced a validated prediction
    pub classified: u64,
    /// Model calls that failed
    pub model_failures: u64,
    /// Replies with no decodable JSON
    pub parse_failures: u64,
    /// Replies that violated the schema
    pub schema_failures: u64,
    /// Memory lookups or writes that failed
    pub context_failures: u64,
    /// Average model latency (ms)
    pub avg_latency_ms: u64,
}

/// Classifies a batch group by group
#[derive(Debug)]
pub struct BatchClassifier {
    provider: Arc<dyn LlmProvider>,
    memory: Option<Arc<dyn MemoryStore>>,
    session_id: String,
    group_key: GroupKey,
    temperature: Option<f32>,
    prompt: PatternPrompt,
    stats: RwLock<ClassifierStats>,
}

impl BatchClassifier {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            memory: None,
            session_id: "weblog-triage".to_string(),
            group_key: GroupKey::default(),
            temperature: None,
            prompt: PatternPrompt::new(),
            stats: RwLock::new(ClassifierStats::default()),
        }
    }

    /// Consult and update a memory store, keyed by `session_id`
    pub fn with_memory(mut self, store: Arc<dyn MemoryStore>, session_id: impl Into<String>) -> Self {
        self.memory = Some(store);
        self.session_id = session_id.into();
        self
    }

    pub fn with_group_key(mut self, key: GroupKey) -> Self {
        self.group_key = key;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn group_key(&self) -> GroupKey {
        self.group_key
    }

    pub async fn stats(&self) -> ClassifierStats {
        self.stats.read().await.clone()
    }

    /// Classify every group in `rows`; failed groups are logged and omitted
    pub async fn classify(&self, rows: &[LogRow]) -> Vec<ThreatPrediction> {
        let groups = group_rows(rows, self.group_key);
        let mut predictions = Vec::with_capacity(groups.len());

        for (key, group) in &groups {
            match self.classify_group(key, group).await {
                Ok(prediction) => predictions.push(prediction),
                Err(failure) => {
                    warn!("Skipping {}", failure);
                    self.record_failure(&failure).await;
                }
            }
        }

        info!(
            "Classified {}/{} groups ({} abnormal)",
            predictions.len(),
            groups.len(),
            predictions.iter().filter(|p| p.is_abnormal()).count()
        );

        predictions
    }

    /// Run one group through context lookup, prompting, parsing and validation
    pub async fn classify_group(
        &self,
        key: &str,
        rows: &[&LogRow],
    ) -> Result<ThreatPrediction, GroupFailure> {
        let mut stage = GroupStage::Pending;
        {
            let mut stats = self.stats.write().await;
            stats.total_groups += 1;
        }

        let summary = GroupSummary::from_rows(rows)
            .ok_or_else(|| GroupFailure::new(key, stage, TriageError::EmptyBatch))?;
        let payload = serde_json::to_string(&summary).map_err(|e| GroupFailure::new(key, stage, e))?;

        let memory = match self.fetch_context(&payload).await {
            Some(context) => {
                stage = GroupStage::ContextFetched;
                context
            }
            None => {
                stage = GroupStage::ContextSkipped;
                String::new()
            }
        };
        debug!("Group {}: {:?}", key, stage);

        let context = PromptContext::new(payload).with_memory(memory);
        let mut request = CompletionRequest::new(self.prompt.build_prompt(&context))
            .with_system(self.prompt.system_prompt())
            .with_max_tokens(self.prompt.max_tokens());
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }
        if self.prompt.output_format() == OutputFormat::Json {
            request = request.with_json();
        }
        stage = GroupStage::Prompted;

        let start = Instant::now();
        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| GroupFailure::new(key, stage, e))?;
        self.record_latency(start.elapsed().as_millis() as u64).await;
        stage = GroupStage::RawReplyReceived;
        debug!("Group {}: {} chars from {}", key, response.text.len(), response.model);

        let object = extract_json_object(&response.text).map_err(|e| GroupFailure::new(key, stage, e))?;
        stage = GroupStage::Parsed;

        let prediction =
            validate_prediction(object, key, summary.earliest).map_err(|e| GroupFailure::new(key, stage, e))?;
        debug!("Group {}: {:?} as {}", key, GroupStage::Validated, prediction.prediction);

        self.remember(&summary, &prediction).await;
        {
            let mut stats = self.stats.write().await;
            stats.classified += 1;
        }

        Ok(prediction)
    }

    /// Best-effort memory lookup; `None` when there is no store or it failed
    async fn fetch_context(&self, query: &str) -> Option<String> {
        let store = self.memory.as_ref()?;
        match store.search(query, &self.session_id).await {
            Ok(entries) => Some(format_context(&entries)),
            Err(e) => {
                warn!("Memory search failed, continuing without context: {}", e);
                self.stats.write().await.context_failures += 1;
                None
            }
        }
    }

    /// Best-effort memory write of the observation and its verdict
    async fn remember(&self, summary: &GroupSummary, prediction: &ThreatPrediction) {
        let Some(store) = self.memory.as_ref() else {
            return;
        };

        let methods = summary.method.keys().cloned().collect::<Vec<_>>().join("/");
        let statuses = summary
            .status_codes
            .keys()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join("/");

        let messages = vec![
            MemoryMessage::user(format!(
                "ip: {}, user_agent: {}, method: {}, status: {}",
                summary.ip, summary.user_agent, methods, statuses
            )),
            MemoryMessage::assistant(format!(
                "prediction: {}, description: {}",
                prediction.prediction, prediction.reasoning.description
            )),
        ];

        if let Err(e) = store.add(messages, &self.session_id).await {
            warn!("Memory write failed for {}: {}", summary.ip, e);
            self.stats.write().await.context_failures += 1;
        }
    }

    async fn record_failure(&self, failure: &GroupFailure) {
        let mut stats = self.stats.write().await;
        match failure.error {
            TriageError::ModelInvocation(_) => stats.model_failures += 1,
            TriageError::ResponseParse(_) => stats.parse_failures += 1,
            TriageError::SchemaValidation(_) => stats.schema_failures += 1,
            _ => {}
        }
    }

    async fn record_latency(&self, latency_ms: u64) {
        let mut stats = self.stats.write().await;
        let calls = stats.classified + stats.model_failures + stats.parse_failures + stats.schema_failures + 1;
        stats.avg_latency_ms = (stats.avg_latency_ms * (calls - 1) + latency_ms) / calls;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::llm::config::ProviderType;
    use crate::llm::memory::{MemoryEntry, MemoryError};
    use crate::llm::provider::{CompletionResponse, LlmError, ProviderHealth};
    use crate::metrics::tests::row;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies by looking up the first scripted key contained in the prompt
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedProvider {
        pub replies: Vec<(String, Result<String, String>)>,
        pub fallback: Option<String>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        pub fn reply(mut self, key: &str, text: &str) -> Self {
            self.replies.push((key.to_string(), Ok(text.to_string())));
            self
        }

        /// Reply used when no scripted key matches
        pub fn reply_any(mut self, text: &str) -> Self {
            self.fallback = Some(text.to_string());
            self
        }

        pub fn fail(mut self, key: &str) -> Self {
            self.replies.push((key.to_string(), Err("connection refused".to_string())));
            self
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn provider_type(&self) -> ProviderType {
            ProviderType::Ollama
        }

        async fn health_check(&self) -> Result<ProviderHealth, LlmError> {
            Ok(ProviderHealth {
                available: true,
                provider: "scripted".to_string(),
                model: None,
                latency_ms: None,
                error: None,
            })
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            let scripted = self
                .replies
                .iter()
                .find(|(key, _)| request.prompt.contains(&format!("\"ip\":\"{}\"", key)))
                .map(|(_, reply)| reply.clone());
            let reply = match (scripted, &self.fallback) {
                (Some(reply), _) => reply,
                (None, Some(text)) => Ok(text.clone()),
                (None, None) => return Err(LlmError::Unavailable("no scripted reply".to_string())),
            };

            match reply {
                Ok(text) => Ok(CompletionResponse {
                    text,
                    prompt_tokens: None,
                    completion_tokens: None,
                    model: "scripted".to_string(),
                    duration_ms: 0,
                }),
                Err(e) => Err(LlmError::Connection(e)),
            }
        }
    }

    #[derive(Debug, Default)]
    pub(crate) struct FakeMemory {
        pub fail_search: bool,
        pub fail_add: bool,
        pub entries: Vec<MemoryEntry>,
        pub added: Mutex<Vec<Vec<MemoryMessage>>>,
    }

    #[async_trait]
    impl MemoryStore for FakeMemory {
        async fn search(&self, _query: &str, _user_id: &str) -> Result<Vec<MemoryEntry>, MemoryError> {
            if self.fail_search {
                return Err(MemoryError::Unavailable("down".to_string()));
            }
            Ok(self.entries.clone())
        }

        async fn add(&self, messages: Vec<MemoryMessage>, _user_id: &str) -> Result<(), MemoryError> {
            if self.fail_add {
                return Err(MemoryError::Request("HTTP 500".to_string()));
            }
            self.added.lock().unwrap().push(messages);
            Ok(())
        }
    }

    pub(crate) fn reply(label: &str) -> String {
        format!(
            "Sure, here is the analysis.\n```json\n{{\"prediction\": \"{}\", \"reasoning\": {{\"pattern_type\": \"scan\", \"description\": \"probing admin paths\", \"confidence\": 80, \"indicators\": [\"/wp-admin\"]}}, \"metrics\": {{\"requests_per_second\": 0.5, \"time_window_seconds\": 4}}}}\n```\nHope this helps!",
            label
        )
    }

    fn batch() -> Vec<LogRow> {
        vec![
            row("10.0.0.2", "2024-12-30 14:00:03 +0000", 200),
            row("10.0.0.1", "2024-12-30 14:00:01 +0000", 404),
            row("10.0.0.2", "2024-12-30 14:00:00 +0000", 200),
            row("10.0.0.3", "2024-12-30 14:00:05 +0000", 500),
        ]
    }

    #[test]
    fn test_grouping_is_stable() {
        let rows = batch();
        let groups = group_rows(&rows, GroupKey::SourceIp);
        let keys: Vec<&str> = groups.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["10.0.0.2", "10.0.0.1", "10.0.0.3"]);
        assert_eq!(groups[0].1.len(), 2);

        let by_agent = group_rows(&rows, GroupKey::UserAgent);
        assert_eq!(by_agent.len(), 1);
    }

    #[test]
    fn test_group_summary() {
        let rows = batch();
        let groups = group_rows(&rows, GroupKey::SourceIp);
        let summary = GroupSummary::from_rows(&groups[0].1).unwrap();

        assert_eq!(summary.ip, "10.0.0.2");
        assert_eq!(summary.request_count, 2);
        assert_eq!(summary.method["GET"], 2);
        assert_eq!(summary.status_codes[&200], 2);
        assert_eq!(summary.paths, vec!["/".to_string()]);
        assert_eq!(summary.time_window.start, "2024-12-30 14:00:00");
        assert_eq!(summary.time_window.end, "2024-12-30 14:00:03");

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status_codes"]["200"], 2);
        assert!(json.get("earliest").is_none());
    }

    #[tokio::test]
    async fn test_classify_keeps_order_and_stamps_earliest() {
        let provider = ScriptedProvider::default()
            .reply("10.0.0.1", &reply("abnormal"))
            .reply("10.0.0.2", &reply("normal"))
            .reply("10.0.0.3", &reply("abnormal"));
        let classifier = BatchClassifier::new(Arc::new(provider));

        let predictions = classifier.classify(&batch()).await;
        let sources: Vec<&str> = predictions.iter().map(|p| p.source.as_str()).collect();
        assert_eq!(sources, vec!["10.0.0.2", "10.0.0.1", "10.0.0.3"]);
        assert_eq!(
            predictions[0].timestamp.format(DISPLAY_FORMAT).to_string(),
            "2024-12-30 14:00:00"
        );

        let stats = classifier.stats().await;
        assert_eq!(stats.total_groups, 3);
        assert_eq!(stats.classified, 3);
    }

    #[tokio::test]
    async fn test_failed_groups_are_omitted() {
        let provider = ScriptedProvider::default()
            .reply("10.0.0.1", "I think this traffic is fine.")
            .fail("10.0.0.2")
            .reply("10.0.0.3", &reply("suspicious"));
        let classifier = BatchClassifier::new(Arc::new(provider));

        let predictions = classifier.classify(&batch()).await;
        assert!(predictions.is_empty());

        let stats = classifier.stats().await;
        assert_eq!(stats.parse_failures, 1);
        assert_eq!(stats.model_failures, 1);
        assert_eq!(stats.schema_failures, 1);
    }

    #[tokio::test]
    async fn test_failure_reports_stage() {
        let provider = ScriptedProvider::default().reply("10.0.0.1", "no json here");
        let classifier = BatchClassifier::new(Arc::new(provider));
        let rows = vec![row("10.0.0.1", "2024-12-30 14:00:00 +0000", 200)];
        let refs: Vec<&LogRow> = rows.iter().collect();

        let failure = classifier.classify_group("10.0.0.1", &refs).await.unwrap_err();
        assert_eq!(failure.stage, GroupStage::RawReplyReceived);
        assert!(matches!(failure.error, TriageError::ResponseParse(_)));
    }

    #[tokio::test]
    async fn test_memory_search_failure_does_not_block() {
        let provider = Arc::new(ScriptedProvider::default().reply("10.0.0.1", &reply("normal")));
        let memory = Arc::new(FakeMemory {
            fail_search: true,
            ..Default::default()
        });
        let classifier = BatchClassifier::new(provider.clone()).with_memory(memory.clone(), "test");
        let rows = vec![row("10.0.0.1", "2024-12-30 14:00:00 +0000", 200)];

        let predictions = classifier.classify(&rows).await;
        assert_eq!(predictions.len(), 1);
        assert!(provider.prompts.lock().unwrap()[0].contains("(no prior context)"));
        assert_eq!(memory.added.lock().unwrap().len(), 1);
        assert_eq!(classifier.stats().await.context_failures, 1);
    }

    #[tokio::test]
    async fn test_memory_context_reaches_prompt_and_is_updated() {
        let provider = Arc::new(ScriptedProvider::default().reply("10.0.0.1", &reply("abnormal")));
        let memory = Arc::new(FakeMemory {
            entries: vec![MemoryEntry {
                memory: "10.0.0.1 was flagged for scanning".to_string(),
            }],
            ..Default::default()
        });
        let classifier = BatchClassifier::new(provider.clone()).with_memory(memory.clone(), "test");
        let rows = vec![row("10.0.0.1", "2024-12-30 14:00:00 +0000", 404)];

        classifier.classify(&rows).await;

        let prompt = provider.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("Previous relevant log details: 10.0.0.1 was flagged for scanning"));

        let added = memory.added.lock().unwrap();
        assert_eq!(added[0][0].content, "ip: 10.0.0.1, user_agent: Mozilla/5.0, method: GET, status: 404");
        assert_eq!(added[0][1].content, "prediction: abnormal, description: probing admin paths");
    }

    #[tokio::test]
    async fn test_memory_add_failure_keeps_prediction() {
        let provider = Arc::new(ScriptedProvider::default().reply("10.0.0.1", &reply("normal")));
        let memory = Arc::new(FakeMemory {
            fail_add: true,
            ..Default::default()
        });
        let classifier = BatchClassifier::new(provider).with_memory(memory, "test");
        let rows = vec![row("10.0.0.1", "2024-12-30 14:00:00 +0000", 200)];

        assert_eq!(classifier.classify(&rows).await.len(), 1);
    }
}
