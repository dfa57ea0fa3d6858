//! Error types for the financial analysis pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {

    // =============================
    // Workflow Errors
    // =============================

    #[error("Handler not found: {0}")]
    HandlerNotFound(String),

    #[error("Duplicate output key: {0}")]
    DuplicateOutputKey(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Evaluation error: {0}")]
    EvaluationError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
