//! Per-tick processing
//!
//! `LogProcessor` owns the cursor and the classifier. Each call to
//! [`LogProcessor::process_logs`] draws one batch, computes its metrics and
//! classifies it.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::llm::classifier::BatchClassifier;
use crate::llm::memory::create_store;
use crate::llm::prediction::ThreatPrediction;
use crate::llm::provider::create_provider;
use crate::logs::cursor::BatchCursor;
use crate::logs::source::LogSource;
use crate::metrics::{MetricsEngine, TrafficMetrics};

/// Result of one tick
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub batch_id: u64,
    pub metrics: TrafficMetrics,
    /// One per group that classified successfully, in first-seen order
    pub predictions: Vec<ThreatPrediction>,
    /// Source records of this batch dropped as malformed
    pub dropped_rows: usize,
}

impl BatchOutcome {
    /// Number of abnormal predictions
    pub fn active_threats(&self) -> usize {
        self.predictions.iter().filter(|p| p.is_abnormal()).count()
    }
}

/// Batch pipeline
#[derive(Debug)]
pub struct LogProcessor {
    cursor: BatchCursor,
    classifier: BatchClassifier,
}

impl LogProcessor {
    pub fn new(cursor: BatchCursor, classifier: BatchClassifier) -> Self {
        Self { cursor, classifier }
    }

    /// Wire up provider, memory store and cursor from configuration
    pub fn from_config(config: &Config, source: LogSource) -> Result<Self> {
        let provider = create_provider(&config.llm)?;
        let mut classifier = BatchClassifier::new(Arc::from(provider))
            .with_group_key(config.source.group_by)
            .with_temperature(config.llm.temperature());

        if let Some(store) = create_store(&config.memory)? {
            classifier = classifier.with_memory(store, config.memory.session_id.clone());
        }

        let cursor = BatchCursor::new(source, config.source.batch_size);
        Ok(Self::new(cursor, classifier))
    }

    pub fn cursor(&self) -> &BatchCursor {
        &self.cursor
    }

    pub fn classifier(&self) -> &BatchClassifier {
        &self.classifier
    }

    /// Draw the next batch, compute its metrics and classify it.
    ///
    /// Fails only when the source cannot be read or the batch has no
    /// parsable rows; per-group classification failures are omitted from
    /// the predictions instead.
    pub async fn process_logs(&mut self) -> Result<BatchOutcome> {
        let batch = self.cursor.next_batch()?;
        if batch.dropped > 0 {
            warn!("Batch {}: dropped {} malformed rows", batch.id, batch.dropped);
        }

        let metrics = MetricsEngine::compute(&batch.rows)?;
        let predictions = self.classifier.classify(&batch.rows).await;

        let outcome = BatchOutcome {
            batch_id: batch.id,
            metrics,
            predictions,
            dropped_rows: batch.dropped,
        };

        info!(
            "Batch {}: {} rows, {:.1} req/s, {:.1}% errors, {} threats",
            outcome.batch_id,
            batch.rows.len(),
            outcome.metrics.requests_per_second,
            outcome.metrics.error_rate,
            outcome.active_threats()
        );

        Ok(outcome)
    }
}
