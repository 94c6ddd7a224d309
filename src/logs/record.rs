//! Access-log records
//!
//! Typed rows parsed from the access-log CSV export. A row that cannot yield
//! an absolute timestamp or an integer status code is malformed and dropped
//! by the caller; an unparsable byte count is tolerated and read as zero.

use chrono::{DateTime, FixedOffset};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timestamp layout used by the collector, e.g. `2024-12-30 14:23:45 +0000`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Layout used when a timestamp is rendered back for prompts and reports
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Row-level parse failures
#[derive(Debug, Error)]
pub enum RowParseError {
    #[error("invalid timestamp '{0}'")]
    Timestamp(String),

    #[error("invalid status code '{0}'")]
    Status(String),

    #[error("malformed record: {0}")]
    Record(String),
}

/// CSV record as exported, before any typing
///
/// Extra columns (the collector also writes an `id`) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    pub ip: String,
    pub timestamp: String,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub protocol: String,
    pub status: String,
    #[serde(default)]
    pub bytes_sent: String,
    #[serde(default)]
    pub referer: String,
    #[serde(default)]
    pub user_agent: String,
}

/// One parsed access-log line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRow {
    /// Source address
    pub ip: String,
    /// Request time
    pub timestamp: DateTime<FixedOffset>,
    /// HTTP method
    pub method: String,
    /// Request path
    pub path: String,
    /// HTTP protocol version
    pub protocol: String,
    /// Response status code
    pub status: u16,
    /// Response size in bytes
    pub bytes_sent: u64,
    /// Referer header
    pub referer: String,
    /// User-Agent header
    pub user_agent: String,
}

impl LogRow {
    /// Parse a CSV record against the file's header row
    pub fn from_record(record: &StringRecord, headers: &StringRecord) -> Result<Self, RowParseError> {
        let raw: RawRecord = record
            .deserialize(Some(headers))
            .map_err(|e| RowParseError::Record(e.to_string()))?;
        Self::try_from(raw)
    }

    /// Client or server error (4xx/5xx)
    pub fn is_error(&self) -> bool {
        (400..=599).contains(&self.status)
    }
}

impl TryFrom<RawRecord> for LogRow {
    type Error = RowParseError;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        let timestamp = parse_timestamp(&raw.timestamp)?;

        let status_text = unquote(&raw.status);
        let status = status_text
            .parse::<u16>()
            .map_err(|_| RowParseError::Status(status_text.to_string()))?;

        let bytes_sent = unquote(&raw.bytes_sent).parse::<u64>().unwrap_or(0);

        Ok(Self {
            ip: raw.ip.trim().to_string(),
            timestamp,
            method: unquote(&raw.method).to_string(),
            path: raw.path,
            protocol: unquote(&raw.protocol).to_string(),
            status,
            bytes_sent,
            referer: unquote(&raw.referer).to_string(),
            user_agent: unquote(&raw.user_agent).to_string(),
        })
    }
}

/// Parse a collector timestamp; RFC 3339 is accepted as well
pub fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>, RowParseError> {
    let value = unquote(value);
    DateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map_err(|_| RowParseError::Timestamp(value.to_string()))
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches('"')
}
