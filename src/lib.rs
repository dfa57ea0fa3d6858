//! Financial Analysis Pipeline
//!
//! A workflow engine for LLM-driven financial-ratio analysis that:
//! - Runs predefined multi-step workflows over 10-K figures
//! - Recovers structured JSON outputs from malformed model responses
//! - Threads step answers into later task templates
//! - Validates extracted figures against ranges, identities, and references
//! - Judges finished runs against known-correct reference analyses
//! - Persists every run as an immutable, hash-verified record
//!
//! STEP LOOP:
//! RENDER TASK → DISPATCH HANDLER → RECOVER OUTPUT → RECORD → SYNTHESIZE

pub mod error;
pub mod evaluator;
pub mod executor;
pub mod handlers;
pub mod llm;
pub mod models;
pub mod recovery;
pub mod runlog;
pub mod validator;
pub mod workflows;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use executor::WorkflowExecutor;
