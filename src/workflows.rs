//! Predefined ratio-analysis workflows
//!
//! Each workflow is the same five-step shape over a 10-K filing: retrieve
//! the figures, pick the formula, structure the inputs, calculate, then
//! explain. Later steps reference earlier answers through `{output_key}`
//! placeholders in their task text.

use crate::models::{StepSpec, Workflow};

/// Amcor quick-ratio analysis across FY2023 and FY2022.
pub fn amcor_quick_ratio() -> Workflow {
    Workflow {
        name: "amcor_quick_ratio".to_string(),
        steps: vec![
            StepSpec::new(
                "data_retriever",
                "Extract the following financial data from the Amcor 10-K report for both \
                 FY2023 and FY2022: Total current assets, Raw materials and supplies, Work \
                 in process and finished goods, and Total current liabilities.",
                "extracted_data",
            ),
            StepSpec::new(
                "financial_concept_selector",
                "Identify the formula and components needed to calculate the Quick Ratio \
                 for Amcor.",
                "financial_concept",
            ),
            StepSpec::new(
                "information_structurer",
                "Using the extracted data: {extracted_data}, prepare the structured inputs \
                 needed to calculate the Quick Ratio for both FY2023 and FY2022. \
                 Specifically, calculate Quick Assets (Current Assets - Inventories) for \
                 both years.",
                "structured_data",
            ),
            StepSpec::new(
                "calculator",
                "Using the structured data: {structured_data}, calculate the Quick Ratio \
                 for FY2023 and FY2022, and determine the percentage change between the \
                 two years.",
                "calculations",
            ),
            StepSpec::new(
                "explainer_validator",
                "Based on the calculations: {calculations}, determine whether Amcor's \
                 quick ratio improved or declined between FY2023 and FY2022. Provide a \
                 clear explanation with the percentage change.",
                "final_answer",
            ),
        ],
    }
}

/// AES Corporation inventory-turnover analysis for FY2022.
pub fn aes_inventory_turnover() -> Workflow {
    Workflow {
        name: "aes_inventory_turnover".to_string(),
        steps: vec![
            StepSpec::new(
                "data_retriever",
                "Extract the following financial data from the AES Corporation 10-K \
                 report for FY2022: Total cost of sales and Inventory value.",
                "extracted_data",
            ),
            StepSpec::new(
                "financial_concept_selector",
                "Identify the formula and components needed to calculate the Inventory \
                 Turnover Ratio for AES Corporation.",
                "financial_concept",
            ),
            StepSpec::new(
                "information_structurer",
                "Using the extracted data: {extracted_data}, prepare the structured inputs \
                 needed to calculate the Inventory Turnover Ratio for FY2022.",
                "structured_data",
            ),
            StepSpec::new(
                "calculator",
                "Using the structured data: {structured_data}, calculate the Inventory \
                 Turnover Ratio for AES Corporation for FY2022.",
                "calculations",
            ),
            StepSpec::new(
                "explainer_validator",
                "Based on the calculations: {calculations}, explain how many times AES \
                 Corporation sold its inventory in FY2022. Provide a clear and concise \
                 explanation.",
                "final_answer",
            ),
        ],
    }
}

/// 3M capital-intensity assessment for FY2022.
pub fn three_m_capital_intensity() -> Workflow {
    Workflow {
        name: "three_m_capital_intensity".to_string(),
        steps: vec![
            StepSpec::new(
                "data_retriever",
                "Extract the following financial data from the 3M 10-K report for FY2022: \
                 CAPEX (Purchases of property, plant and equipment), Net sales/Revenue, \
                 Property plant and equipment net (Fixed assets), Total assets, and Net \
                 income.",
                "extracted_data",
            ),
            StepSpec::new(
                "financial_concept_selector",
                "Identify the formulas and components needed to assess whether 3M is a \
                 capital-intensive business, including CAPEX/Revenue ratio, Fixed \
                 assets/Total Assets ratio, and Return on Assets (ROA).",
                "financial_concept",
            ),
            StepSpec::new(
                "information_structurer",
                "Using the extracted data: {extracted_data}, prepare the structured inputs \
                 needed to calculate CAPEX/Revenue ratio, Fixed assets/Total Assets ratio, \
                 and Return on Assets (ROA) for FY2022.",
                "structured_data",
            ),
            StepSpec::new(
                "calculator",
                "Using the structured data: {structured_data}, calculate the CAPEX/Revenue \
                 ratio, Fixed assets/Total Assets ratio, and Return on Assets (ROA) for 3M \
                 for FY2022.",
                "calculations",
            ),
            StepSpec::new(
                "explainer_validator",
                "Based on the calculations: {calculations}, determine whether 3M is a \
                 capital-intensive business. Provide a clear explanation referencing the \
                 calculated metrics.",
                "final_answer",
            ),
        ],
    }
}

/// All predefined workflows, in demo order.
pub fn all_workflows() -> Vec<Workflow> {
    vec![
        amcor_quick_ratio(),
        aes_inventory_turnover(),
        three_m_capital_intensity(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::create_default_registry;
    use crate::llm::ScriptedClient;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn every_workflow_has_five_steps_with_unique_keys() {
        for workflow in all_workflows() {
            assert_eq!(workflow.steps.len(), 5, "workflow {}", workflow.name);

            let keys: HashSet<&str> = workflow
                .steps
                .iter()
                .map(|step| step.output_key.as_str())
                .collect();
            assert_eq!(keys.len(), 5, "workflow {}", workflow.name);
        }
    }

    #[test]
    fn every_step_resolves_in_the_default_registry() {
        let registry = create_default_registry(Arc::new(ScriptedClient::exhausted()));
        for workflow in all_workflows() {
            for step in &workflow.steps {
                assert!(
                    registry.contains(&step.handler),
                    "workflow {} references unregistered handler {}",
                    workflow.name,
                    step.handler
                );
            }
        }
    }

    #[test]
    fn later_steps_reference_earlier_output_keys() {
        let workflow = amcor_quick_ratio();
        assert!(workflow.steps[2].task.contains("{extracted_data}"));
        assert!(workflow.steps[3].task.contains("{structured_data}"));
        assert!(workflow.steps[4].task.contains("{calculations}"));
    }

    #[test]
    fn no_step_requests_context_updates() {
        for workflow in all_workflows() {
            assert!(workflow.steps.iter().all(|step| !step.update_context));
        }
    }
}
