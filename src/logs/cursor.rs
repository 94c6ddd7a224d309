//! Circular batch cursor over the access-log CSV
//!
//! The source is treated as a continuous stream: after the last record the
//! cursor wraps to the start of the file. The file is re-read on every draw.

use serde::Serialize;
use tracing::debug;

use super::record::LogRow;
use super::source::{parse_records, LogSource};
use crate::error::Result;

/// Default number of source records per batch
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// One draw from the cursor
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    /// Batch identifier, starting at 1
    pub id: u64,
    /// Record offset the batch was read from
    pub offset: usize,
    /// Parsed rows in file order
    pub rows: Vec<LogRow>,
    /// Source records dropped as malformed
    pub dropped: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Stateful cursor; position and batch counter are owned here only
#[derive(Debug)]
pub struct BatchCursor {
    source: LogSource,
    batch_size: usize,
    position: usize,
    batches_drawn: u64,
}

impl BatchCursor {
    pub fn new(source: LogSource, batch_size: usize) -> Self {
        Self {
            source,
            batch_size: batch_size.max(1),
            position: 0,
            batches_drawn: 0,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Identifier of the most recent batch (0 before the first draw)
    pub fn current_batch_id(&self) -> u64 {
        self.batches_drawn
    }

    /// Draw the next batch of up to `batch_size` records
    pub fn next_batch(&mut self) -> Result<Batch> {
        let snapshot = self.source.snapshot()?;
        let total = snapshot.records.len();

        let start = self.position.min(total);
        let end = (start + self.batch_size).min(total);
        let (rows, dropped) = parse_records(&snapshot.records[start..end], &snapshot.headers);

        self.batches_drawn += 1;
        self.position += self.batch_size;
        if self.position >= total {
            self.position = 0;
        }

        debug!(
            "Batch {} drawn: records {}..{} of {}, {} rows, {} dropped",
            self.batches_drawn,
            start,
            end,
            total,
            rows.len(),
            dropped
        );

        Ok(Batch {
            id: self.batches_drawn,
            offset: start,
            rows,
            dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "ip,timestamp,method,path,protocol,status,bytes_sent,referer,user_agent\n";

    fn csv_with_rows(count: usize) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(HEADER.as_bytes()).unwrap();
        for i in 0..count {
            writeln!(
                file,
                "10.0.0.{},2024-12-30 14:{:02}:00 +0000,GET,/page/{},HTTP/1.1,200,128,-,Mozilla/5.0",
                i % 4,
                i % 60,
                i
            )
            .unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_batches_wrap_around() {
        let file = csv_with_rows(25);
        let mut cursor = BatchCursor::new(LogSource::new(file.path()), 10);

        let sizes: Vec<(u64, usize)> = (0..4)
            .map(|_| {
                let batch = cursor.next_batch().unwrap();
                (batch.id, batch.len())
            })
            .collect();

        assert_eq!(sizes, vec![(1, 10), (2, 10), (3, 5), (4, 10)]);
        assert_eq!(cursor.position(), 10);
        assert_eq!(cursor.current_batch_id(), 4);
    }

    #[test]
    fn test_exact_multiple_wraps_to_zero() {
        let file = csv_with_rows(20);
        let mut cursor = BatchCursor::new(LogSource::new(file.path()), 10);

        cursor.next_batch().unwrap();
        let second = cursor.next_batch().unwrap();
        assert_eq!(second.offset, 10);
        assert_eq!(cursor.position(), 0);

        let third = cursor.next_batch().unwrap();
        assert_eq!(third.offset, 0);
        assert_eq!(third.id, 3);
    }

    #[test]
    fn test_picks_up_appended_rows() {
        let mut file = csv_with_rows(5);
        let mut cursor = BatchCursor::new(LogSource::new(file.path()), 10);
        assert_eq!(cursor.next_batch().unwrap().len(), 5);

        for i in 0..10 {
            writeln!(
                file,
                "10.0.1.{},2024-12-30 15:00:{:02} +0000,GET,/,HTTP/1.1,200,1,-,curl/8.0",
                i, i
            )
            .unwrap();
        }
        file.flush().unwrap();

        assert_eq!(cursor.next_batch().unwrap().len(), 10);
    }

    #[test]
    fn test_empty_file_yields_empty_batch() {
        let file = csv_with_rows(0);
        let mut cursor = BatchCursor::new(LogSource::new(file.path()), 10);

        let batch = cursor.next_batch().unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.id, 1);
        assert_eq!(cursor.position(), 0);
    }
}
