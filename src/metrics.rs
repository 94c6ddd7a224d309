//! Batch traffic metrics
//!
//! Throughput, error rate and source cardinality over one batch of rows.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TriageError};
use crate::logs::LogRow;

/// Metrics for one batch; recomputed on every tick, never stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficMetrics {
    /// Rows per second over the batch's time span
    pub requests_per_second: f64,
    /// Percentage of rows with a 4xx/5xx status, one decimal
    pub error_rate: f64,
    /// Distinct source addresses
    pub unique_ips: usize,
    /// Rows in the batch
    pub total_requests: usize,
}

/// Stateless metrics calculator
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsEngine;

impl MetricsEngine {
    /// Compute metrics for a non-empty batch. A zero-second span reports
    /// the row count as the rate.
    pub fn compute(rows: &[LogRow]) -> Result<TrafficMetrics> {
        if rows.is_empty() {
            return Err(TriageError::EmptyBatch);
        }

        let count = rows.len();
        let span = span_seconds(rows);
        let requests_per_second = if span > 0.0 {
            count as f64 / span
        } else {
            count as f64
        };

        let errors = rows.iter().filter(|r| r.is_error()).count();
        let error_rate = round1(100.0 * errors as f64 / count as f64);

        let unique_ips = rows
            .iter()
            .map(|r| r.ip.as_str())
            .collect::<HashSet<_>>()
            .len();

        Ok(TrafficMetrics {
            requests_per_second,
            error_rate,
            unique_ips,
            total_requests: count,
        })
    }
}

/// Seconds between the earliest and latest row
pub fn span_seconds(rows: &[LogRow]) -> f64 {
    let earliest = rows.iter().map(|r| r.timestamp).min();
    let latest = rows.iter().map(|r| r.timestamp).max();
    match (earliest, latest) {
        (Some(start), Some(end)) => (end - start).num_milliseconds() as f64 / 1000.0,
        _ => 0.0,
    }
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
