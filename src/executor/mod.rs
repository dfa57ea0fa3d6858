//! Sequential workflow executor
//!
//! Runs a workflow's steps in order: render the task template against
//! earlier answers, dispatch the handler, record the audit step, then make
//! one synthesis call over the full transcript. Handler problems degrade
//! into their records; the only hard errors are workflow-shape defects,
//! caught before any step runs.

use crate::error::{PipelineError, Result};
use crate::handlers::HandlerRegistry;
use crate::llm::{ChatMessage, ModelClient};
use crate::models::{AnalysisRun, AnswerValue, StepRecord, Workflow};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct WorkflowExecutor {
    handlers: HandlerRegistry,
    supervisor: Arc<dyn ModelClient>,
}

impl WorkflowExecutor {
    pub fn new(handlers: HandlerRegistry, supervisor: Arc<dyn ModelClient>) -> Self {
        Self { handlers, supervisor }
    }

    /// Runs every step of the workflow, then synthesizes the final answer.
    /// Completes for any registered workflow; individual step failures
    /// surface in the step records rather than as errors.
    pub async fn run(&self, task: &str, context: &str, workflow: &Workflow) -> Result<AnalysisRun> {
        self.validate(workflow)?;

        info!(
            workflow = %workflow.name,
            step_count = workflow.steps.len(),
            "starting analysis run"
        );

        let mut state = ExecutionState::new(context);
        let mut steps = Vec::with_capacity(workflow.steps.len());

        for (index, spec) in workflow.steps.iter().enumerate() {
            let rendered = state.render(&spec.task);
            debug!(step = index + 1, handler = %spec.handler, "dispatching step");

            let handler = self
                .handlers
                .get(&spec.handler)
                .ok_or_else(|| PipelineError::HandlerNotFound(spec.handler.clone()))?;
            let output = handler.execute(&rendered, state.context()).await;

            state.store(&spec.output_key, output.answer.as_ref());
            if spec.update_context {
                state.extend_context(&spec.handler, output.answer.as_ref());
            }

            debug!(
                step = index + 1,
                handler = %spec.handler,
                answer_present = output.answer.is_some(),
                "step finished"
            );
            steps.push(StepRecord {
                handler: spec.handler.clone(),
                task: rendered,
                output,
            });
        }

        let final_answer = self.synthesize(task, &steps).await;

        info!(workflow = %workflow.name, steps = steps.len(), "analysis run complete");
        Ok(AnalysisRun {
            task: task.to_string(),
            steps,
            final_answer,
        })
    }

    /// Workflow-shape defects abort the run before any model call: every
    /// referenced handler must be registered and output keys must be
    /// unique.
    fn validate(&self, workflow: &Workflow) -> Result<()> {
        let mut seen = HashSet::new();
        for spec in &workflow.steps {
            if !self.handlers.contains(&spec.handler) {
                return Err(PipelineError::HandlerNotFound(spec.handler.clone()));
            }
            if !seen.insert(spec.output_key.as_str()) {
                return Err(PipelineError::DuplicateOutputKey(spec.output_key.clone()));
            }
        }
        Ok(())
    }

    /// One closing supervisor call over the full step transcript. Transport
    /// failure degrades to the last recorded step answer.
    async fn synthesize(&self, task: &str, steps: &[StepRecord]) -> String {
        let transcript = build_transcript(steps);
        let prompt = format!(
            "Task: {}\n\n\
             The following analyses were performed by specialized agents:\n\n\
             {}\n\n\
             Synthesize these results to provide a comprehensive answer to the original task.\n\
             Your answer should be clear, concise, and based solely on the information provided.",
            task, transcript
        );

        debug!(transcript_steps = steps.len(), "synthesizing final answer");
        match self.supervisor.generate(&[ChatMessage::user(prompt)]).await {
            Ok(answer) => answer,
            Err(error) => {
                warn!(%error, "synthesis call failed, degrading final answer");
                degraded_final_answer(steps, &error)
            }
        }
    }
}

fn build_transcript(steps: &[StepRecord]) -> String {
    let mut transcript = String::new();
    for (index, step) in steps.iter().enumerate() {
        transcript.push_str(&format!("Step {}: {}\n", index + 1, step.handler));
        transcript.push_str(&format!("Task: {}\n", step.task));
        transcript.push_str(&format!("Explanation: {}\n", step.output.explanation));
        if let Some(citation) = &step.output.citation {
            transcript.push_str(&format!("Citation: {}\n", citation));
        }
        transcript.push_str(&format!(
            "Answer: {}\n\n",
            step.output.answer_text().unwrap_or_default()
        ));
    }
    transcript
}

fn degraded_final_answer(steps: &[StepRecord], error: &PipelineError) -> String {
    match steps.iter().rev().find_map(|step| step.output.answer_text()) {
        Some(answer) => format!("{} (final synthesis unavailable: {})", answer, error),
        None => format!("Analysis produced no usable answer (final synthesis unavailable: {})", error),
    }
}

/// Working state for one run: stored answer strings keyed by output key,
/// plus the context block handlers receive. Built per run, dropped with it.
struct ExecutionState {
    outputs: HashMap<String, String>,
    context: String,
}

impl ExecutionState {
    fn new(context: &str) -> Self {
        Self {
            outputs: HashMap::new(),
            context: context.to_string(),
        }
    }

    fn context(&self) -> &str {
        &self.context
    }

    fn store(&mut self, key: &str, answer: Option<&AnswerValue>) {
        match answer {
            Some(answer) => {
                self.outputs.insert(key.to_string(), answer.to_string());
            }
            None => {
                debug!(output_key = %key, "step produced no answer, leaving output key unset");
            }
        }
    }

    fn extend_context(&mut self, handler: &str, answer: Option<&AnswerValue>) {
        let answer = answer.map(|a| a.to_string()).unwrap_or_default();
        self.context.push_str(&format!(
            "\n\nPrevious analysis result:\n{}: {}\n",
            handler, answer
        ));
    }

    /// Replaces `{key}` placeholders with stored answer strings. A key with
    /// no stored answer stays literal, so one missing step degrades only
    /// its placeholder, never the whole render. Substituted text is not
    /// rescanned.
    fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) if is_placeholder_key(&after[..close]) => {
                    let key = &after[..close];
                    match self.outputs.get(key) {
                        Some(value) => out.push_str(value),
                        None => {
                            warn!(
                                output_key = %key,
                                "task template references an unknown output key, keeping placeholder"
                            );
                            out.push('{');
                            out.push_str(key);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                _ => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

fn is_placeholder_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
