//! Handler trait and registry
//!
//! A handler is one specialist role in a workflow: it receives a rendered
//! task plus the shared context and always produces a structured record.
//! Model-backed handlers wrap a system prompt around a single client call
//! and run the response through recovery.

use crate::llm::{ChatMessage, ModelClient};
use crate::models::OutputRecord;
use crate::recovery;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// One specialist role. Execution is infallible by construction: transport
/// and parse problems degrade into the returned record instead of erroring,
/// so a workflow always runs to completion.
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &str;
    async fn execute(&self, task: &str, context: &str) -> OutputRecord;
}

/// Registry for looking up handlers by workflow step name
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn list(&self) -> Vec<&str> {
        self.handlers.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Model-backed handler: a system prompt defining the specialist role plus
/// a client to call. The user turn carries the rendered task and the
/// shared context.
pub struct PromptHandler {
    name: String,
    system_prompt: String,
    client: Arc<dyn ModelClient>,
}

impl PromptHandler {
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        client: Arc<dyn ModelClient>,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            client,
        }
    }
}

#[async_trait]
impl Handler for PromptHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, task: &str, context: &str) -> OutputRecord {
        let messages = vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(format!("Task: {}\n\nContext: {}", task, context)),
        ];

        match self.client.generate(&messages).await {
            Ok(response) => recovery::recover(&response),
            Err(error) => {
                warn!(handler = %self.name, %error, "model call failed, producing degraded record");
                OutputRecord::degraded(format!("Model call failed: {}", error))
            }
        }
    }
}

//
// ================= Specialist Roles =================
//

const CONCEPT_SELECTOR_PROMPT: &str = r#"You are a financial concept expert. Identify which financial metric and formula answer the question, and explain why that metric is the appropriate one.

Respond in JSON with these fields:
- explanation: your reasoning for selecting the concept
- citation: the financial principle or definition you relied on
- answer: an object with the concept name, its formula, and the required inputs

Example:
```json
{
    "explanation": "The question asks about short-term liquidity without relying on inventory...",
    "citation": "The quick ratio measures the ability to cover current liabilities with liquid assets.",
    "answer": {
        "concept": "Quick Ratio",
        "formula": "(Current Assets - Inventory) / Current Liabilities",
        "required_data": ["Current Assets", "Inventory", "Current Liabilities"]
    }
}
```"#;

const DATA_RETRIEVER_PROMPT: &str = r#"You are a financial data extraction expert. Extract the exact numerical values the calculation needs from the financial document in the context.

For each request:
1. Locate the relevant statement (balance sheet, income statement, cash flow)
2. Extract the exact line-item values
3. Check units and fiscal years
4. Return the figures as structured JSON

Line items by ratio:
- Quick Ratio: Total Current Assets, Raw Materials and Supplies, Work in Process and Finished Goods, Total Current Liabilities
- Inventory Turnover: Cost of Sales, Total Inventory
- Capital Intensity: Capital Expenditures, Revenue, Fixed Assets, Total Assets, Net Income

Respond in JSON with these fields:
- explanation: how you located the figures
- citation: the statement lines you read them from
- answer: an object mapping each line item and fiscal year to its numeric value

Example:
```json
{
    "explanation": "I read the current asset lines from the FY2023 balance sheet...",
    "citation": "Balance sheet, current assets section",
    "answer": {
        "Total Current Assets FY2023": 5308,
        "Total Current Assets FY2022": 5853,
        "Total Current Liabilities FY2023": 4476,
        "Total Current Liabilities FY2022": 5103
    }
}
```"#;

const INFORMATION_STRUCTURER_PROMPT: &str = r#"You are a financial data structuring expert. Organize raw extracted figures so the calculation can run directly.

Match data points by fiscal period and aggregate the components the formula needs.

Respond in JSON with these fields:
- explanation: how you organized the data
- citation: the source figures you started from
- answer: the structured data ready for calculation

Example:
```json
{
    "explanation": "I grouped the figures by fiscal year and combined the inventory components...",
    "citation": "Current Assets FY2023: 5308, Raw Materials FY2023: 992, Work in Process and Finished Goods FY2023: 1221",
    "answer": {
        "FY2023": {"Quick Assets": 3095, "Current Liabilities": 4476},
        "FY2022": {"Quick Assets": 3414, "Current Liabilities": 5103}
    }
}
```"#;

const CALCULATOR_PROMPT: &str = r#"You are a financial calculation expert. Perform the required arithmetic on the structured data precisely, showing each step.

Respond in JSON with these fields:
- explanation: the calculation, step by step
- citation: the input figures you used
- answer: the computed results at appropriate precision

Example:
```json
{
    "explanation": "Quick ratio = quick assets / current liabilities. FY2023: 3095 / 4476 = 0.69...",
    "citation": "Quick Assets FY2023: 3095, Current Liabilities FY2023: 4476",
    "answer": {
        "Quick Ratio FY2023": 0.69,
        "Quick Ratio FY2022": 0.67,
        "Percentage Change": 3.0
    }
}
```"#;

const EXPLAINER_VALIDATOR_PROMPT: &str = r#"You are a financial analysis validation expert. Check that the calculations answer the original question and explain what the results mean in business terms.

Respond in JSON with these fields:
- explanation: your validation process and interpretation
- citation: the calculation results you reviewed
- answer: a final conclusion that directly answers the question

Example:
```json
{
    "explanation": "I rechecked the ratio arithmetic and compared both fiscal years...",
    "citation": "Quick Ratio FY2023: 0.69, Quick Ratio FY2022: 0.67",
    "answer": "The quick ratio improved from 0.67 to 0.69, a modest gain in short-term liquidity."
}
```"#;

pub fn financial_concept_selector(client: Arc<dyn ModelClient>) -> PromptHandler {
    PromptHandler::new("financial_concept_selector", CONCEPT_SELECTOR_PROMPT, client)
}

pub fn data_retriever(client: Arc<dyn ModelClient>) -> PromptHandler {
    PromptHandler::new("data_retriever", DATA_RETRIEVER_PROMPT, client)
}

pub fn information_structurer(client: Arc<dyn ModelClient>) -> PromptHandler {
    PromptHandler::new("information_structurer", INFORMATION_STRUCTURER_PROMPT, client)
}

pub fn calculator(client: Arc<dyn ModelClient>) -> PromptHandler {
    PromptHandler::new("calculator", CALCULATOR_PROMPT, client)
}

pub fn explainer_validator(client: Arc<dyn ModelClient>) -> PromptHandler {
    PromptHandler::new("explainer_validator", EXPLAINER_VALIDATOR_PROMPT, client)
}

/// Create a registry with the five specialist roles the shipped workflows
/// dispatch to, all backed by the same client.
pub fn create_default_registry(client: Arc<dyn ModelClient>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(data_retriever(client.clone())));
    registry.register(Arc::new(financial_concept_selector(client.clone())));
    registry.register(Arc::new(information_structurer(client.clone())));
    registry.register(Arc::new(calculator(client.clone())));
    registry.register(Arc::new(explainer_validator(client)));
    registry
}
