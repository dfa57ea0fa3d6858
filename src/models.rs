//! Core data models for the financial analysis pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use std::fmt;

//
// ================= Step Output =================
//

/// Answer payload of a recovered step output.
///
/// Model responses carry either a scalar answer ("0.69") or a field map
/// ("current_assets": 5308.0, ...). Both forms survive recovery unchanged;
/// display points render the map as compact JSON in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Fields(serde_json::Map<String, serde_json::Value>),
}

impl AnswerValue {
    /// Converts a decoded JSON value into an answer payload. Null maps to
    /// `None`; numbers, booleans, and arrays are carried as canonical text.
    pub fn from_json(value: serde_json::Value) -> Option<AnswerValue> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(text) => Some(AnswerValue::Text(text)),
            serde_json::Value::Object(fields) => Some(AnswerValue::Fields(fields)),
            other => Some(AnswerValue::Text(other.to_string())),
        }
    }

    pub fn as_fields(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        match self {
            AnswerValue::Fields(fields) => Some(fields),
            AnswerValue::Text(_) => None,
        }
    }
}

/// Structured output of a single handler call.
///
/// Every handler produces one of these, no matter how malformed the
/// underlying model response was; on recovery failure the explanation
/// describes the failure and the answer carries the raw text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub explanation: String,
    pub citation: Option<String>,
    pub answer: Option<AnswerValue>,
}

impl OutputRecord {
    pub fn new(explanation: impl Into<String>, citation: Option<String>, answer: Option<AnswerValue>) -> Self {
        Self { explanation: explanation.into(), citation, answer }
    }

    /// Record produced when recovery fails: the raw response text is kept
    /// as the answer so downstream consumers still see what the model said.
    pub fn fallback(explanation: impl Into<String>, raw: &str) -> Self {
        Self {
            explanation: explanation.into(),
            citation: None,
            answer: Some(AnswerValue::Text(raw.to_string())),
        }
    }

    /// Record produced when the model call itself failed. No answer is
    /// stored, so later template references to this step stay unresolved.
    pub fn degraded(explanation: impl Into<String>) -> Self {
        Self { explanation: explanation.into(), citation: None, answer: None }
    }

    /// Display form of the answer, when one exists.
    pub fn answer_text(&self) -> Option<String> {
        self.answer.as_ref().map(|answer| answer.to_string())
    }
}

//
// ================= Workflow Definition =================
//

/// One step of a workflow: which handler runs, the task template it
/// receives, and the key its answer is stored under for later steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    pub handler: String,
    pub task: String,
    pub output_key: String,
    #[serde(default)]
    pub update_context: bool,
}

impl StepSpec {
    pub fn new(handler: impl Into<String>, task: impl Into<String>, output_key: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            task: task.into(),
            output_key: output_key.into(),
            update_context: false,
        }
    }

    /// Marks this step's answer for appending to the shared context block.
    pub fn with_context_update(mut self) -> Self {
        self.update_context = true;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    pub steps: Vec<StepSpec>,
}

//
// ================= Run Results =================
//

/// Audit-trail entry for one executed step: the handler name, the task
/// text as rendered (placeholders substituted), and the recovered output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub handler: String,
    pub task: String,
    pub output: OutputRecord,
}

/// Complete result of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub task: String,
    pub steps: Vec<StepRecord>,
    pub final_answer: String,
}

/// Persisted form of a run, one immutable record per execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub workflow: String,
    pub timestamp: DateTime<Utc>,
    pub result: AnalysisRun,
    pub result_hash: String,
}

//
// ================= Validation =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Valid,
    Warning,
    Error,
    Unverified,
}

/// Outcome of one validation check. Validation is advisory: results are
/// reported, never raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub message: String,
    pub expected_value: Option<f64>,
    pub actual_value: Option<f64>,
    pub error_percentage: Option<f64>,
}

impl ValidationResult {
    pub fn valid(message: impl Into<String>) -> Self {
        Self::with_status(ValidationStatus::Valid, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_status(ValidationStatus::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_status(ValidationStatus::Error, message)
    }

    pub fn unverified(message: impl Into<String>) -> Self {
        Self::with_status(ValidationStatus::Unverified, message)
    }

    fn with_status(status: ValidationStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            expected_value: None,
            actual_value: None,
            error_percentage: None,
        }
    }

    pub fn with_expected(mut self, value: f64) -> Self {
        self.expected_value = Some(value);
        self
    }

    pub fn with_actual(mut self, value: f64) -> Self {
        self.actual_value = Some(value);
        self
    }

    pub fn with_error_percentage(mut self, value: f64) -> Self {
        self.error_percentage = Some(value);
        self
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerValue::Text(text) => f.write_str(text),
            AnswerValue::Fields(fields) => {
                let rendered = serde_json::to_string(fields).map_err(|_| fmt::Error)?;
                f.write_str(&rendered)
            }
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationStatus::Valid => "valid",
            ValidationStatus::Warning => "warning",
            ValidationStatus::Error => "error",
            ValidationStatus::Unverified => "unverified",
        };
        write!(f, "{}", s)
    }
}
