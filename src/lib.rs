//! weblog-triage: LLM-assisted triage of web access logs
//!
//! Reads an access-log CSV in fixed-size batches from a circular cursor,
//! computes traffic metrics for each batch and asks a language model to
//! classify every source seen in it as normal or abnormal. A periodic
//! whole-file summary report is available as well.

pub mod config;
pub mod error;
pub mod llm;
pub mod logs;
pub mod metrics;
pub mod pipeline;
pub mod summary;

pub use config::Config;
pub use error::{Result, TriageError};
pub use llm::{BatchClassifier, GroupKey, Prediction, ThreatPrediction};
pub use logs::{Batch, BatchCursor, LogRow, LogSource};
pub use metrics::{MetricsEngine, TrafficMetrics};
pub use pipeline::{BatchOutcome, LogProcessor};
pub use summary::{SummaryAnalyzer, SummaryReport, TrafficSummary};
