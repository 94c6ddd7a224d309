//! Access-log ingestion
//!
//! Reads the collector's CSV export, types each record, and serves it in
//! fixed-size batches through a circular cursor.

pub mod cursor;
pub mod record;
pub mod source;

pub use cursor::{Batch, BatchCursor, DEFAULT_BATCH_SIZE};
pub use record::{LogRow, RowParseError};
pub use source::LogSource;
