//! CSV source reading

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{debug, warn};

use super::record::LogRow;
use crate::error::Result;

/// Access-log CSV file on disk
#[derive(Debug, Clone)]
pub struct LogSource {
    path: PathBuf,
}

/// Header row plus every record of the file, untyped
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub headers: StringRecord,
    pub records: Vec<StringRecord>,
}

impl LogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file. The file may be appended to between calls, so
    /// nothing is cached.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let file = File::open(&self.path)?;
        let snapshot = read_snapshot(file)?;
        debug!(
            "Read {} records from {}",
            snapshot.records.len(),
            self.path.display()
        );
        Ok(snapshot)
    }

    /// Read and parse up to `limit` records, dropping malformed rows
    pub fn read_rows(&self, limit: Option<usize>) -> Result<Vec<LogRow>> {
        let snapshot = self.snapshot()?;
        let take = limit.unwrap_or(snapshot.records.len());
        let (rows, _) = parse_records(&snapshot.records[..take.min(snapshot.records.len())], &snapshot.headers);
        Ok(rows)
    }
}

/// Read a CSV document with a header row
pub fn read_snapshot<R: Read>(reader: R) -> Result<Snapshot> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::Headers)
        .escape(Some(b'\\'))
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let mut records = Vec::new();
    for record in reader.records() {
        records.push(record?);
    }

    Ok(Snapshot { headers, records })
}

/// Parse records into rows; returns the rows and how many were dropped
pub fn parse_records(records: &[StringRecord], headers: &StringRecord) -> (Vec<LogRow>, usize) {
    let mut rows = Vec::with_capacity(records.len());
    let mut dropped = 0;

    for record in records {
        match LogRow::from_record(record, headers) {
            Ok(row) => rows.push(row),
            Err(e) => {
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                warn!("Dropping log row at line {}: {}", line, e);
                dropped += 1;
            }
        }
    }

    (rows, dropped)
}
