use thiserror::Error;

use crate::llm::memory::MemoryError;
use crate::llm::provider::LlmError;
use crate::logs::record::RowParseError;

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("cannot compute metrics over an empty batch")]
    EmptyBatch,

    #[error("row parse error: {0}")]
    RowParse(#[from] RowParseError),

    #[error("model invocation failed: {0}")]
    ModelInvocation(#[from] LlmError),

    #[error("response parse error: {0}")]
    ResponseParse(String),

    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("context store error: {0}")]
    ContextStore(#[from] MemoryError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TriageError>;
