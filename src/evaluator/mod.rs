//! Run evaluation against reference analyses
//!
//! One judge call comparing a completed run with the known-correct analysis
//! for the company: does the final answer say the same thing, and does the
//! step-by-step reasoning arrive there the same way? Like the validator,
//! this is advisory tooling over a finished run; it never gates execution.

use crate::error::{PipelineError, Result};
use crate::llm::{ChatMessage, ModelClient};
use crate::models::AnalysisRun;
use crate::recovery;
use crate::validator::ReferenceEntry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Judge verdict over one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub answer_match: bool,
    pub justification_match: bool,
    pub explanation: String,
}

/// Judges completed runs against reference analyses.
pub struct RunEvaluator {
    judge: Arc<dyn ModelClient>,
}

impl RunEvaluator {
    pub fn new(judge: Arc<dyn ModelClient>) -> Self {
        Self { judge }
    }

    /// Asks the judge whether the run's answer and reasoning are equivalent
    /// to the reference analysis. Equivalence is semantic, so wording and
    /// even the calculation route may differ between the two.
    pub async fn evaluate(
        &self,
        reference: &ReferenceEntry,
        run: &AnalysisRun,
    ) -> Result<Evaluation> {
        let prompt = build_judge_prompt(reference, run);
        let response = self.judge.generate(&[ChatMessage::user(prompt)]).await?;
        let evaluation = parse_evaluation(&response)?;

        info!(
            company = %reference.company,
            answer_match = evaluation.answer_match,
            justification_match = evaluation.justification_match,
            "run evaluated against reference analysis"
        );
        Ok(evaluation)
    }
}

fn build_judge_prompt(reference: &ReferenceEntry, run: &AnalysisRun) -> String {
    let pipeline_justification = run
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| {
            format!("Step {} ({}): {}", index + 1, step.handler, step.output.explanation)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a financial analysis evaluator. Compare the following two analyses:\n\n\
         EXPECTED ANALYSIS:\n\
         Answer: {}\n\
         Justification: {}\n\n\
         PIPELINE ANALYSIS:\n\
         Answer: {}\n\
         Justification: {}\n\n\
         Evaluate if:\n\
         1. The final answer is equivalent (they may use different wording but convey the same meaning)\n\
         2. The justification is similar (they may use different calculations but arrive at the same conclusion)\n\n\
         Return your evaluation as a JSON object with these fields:\n\
         - answer_match: boolean (true if answers are equivalent)\n\
         - justification_match: boolean (true if justifications are similar)\n\
         - explanation: string (brief explanation of your evaluation)",
        reference.answer, reference.justification, run.final_answer, pipeline_justification
    )
}

/// Judges are asked for bare JSON but wrap it in prose and fences like any
/// other model, so the verdict goes through the same extraction and repair
/// as step outputs before decoding.
fn parse_evaluation(response: &str) -> Result<Evaluation> {
    let payload = recovery::extract_payload(response).ok_or_else(|| {
        PipelineError::EvaluationError("no verdict object in judge response".to_string())
    })?;
    serde_json::from_str(&payload).map_err(|error| {
        PipelineError::EvaluationError(format!("judge verdict did not parse: {}", error))
    })
}
