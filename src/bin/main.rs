use financial_analysis_pipeline::{
    evaluator::RunEvaluator,
    executor::WorkflowExecutor,
    handlers::create_default_registry,
    llm::{anthropic::AnthropicClient, openai::OpenAiClient, ModelClient, RetryingClient, ScriptedClient},
    models::AnalysisRun,
    runlog,
    validator::{FinancialDataValidator, ReferenceEntry},
    workflows,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

// Amcor balance sheet excerpt used as the analysis context
const AMCOR_DATA: &str = "Amcor plc and Subsidiaries
Consolidated Balance Sheets
($ in millions, except share and per share data)
As of June 30,
2023    2022
Assets
Current assets:
Cash and cash equivalents    $    689     $    775
Trade receivables, net of allowance for credit losses of $21 and $25, respectively    1,875     1,935
Inventories, net
Raw materials and supplies    992     1,114
Work in process and finished goods    1,221     1,325
Prepaid expenses and other current assets    531     512
Assets held for sale, net         192
Total current assets    5,308     5,853
Non-current assets:
Property, plant, and equipment, net    3,762     3,646
Operating lease assets    533     560
Deferred tax assets    134     130
Other intangible assets, net    1,524     1,657
Goodwill    5,366     5,285
Employee benefit assets    67     89
Other non-current assets    309     206
Total non-current assets    11,695     11,573
Total assets    $    17,003     $    17,426
Liabilities
Current liabilities:
Current portion of long-term debt    $    13     $    14
Short-term debt    80     136
Trade payables    2,690     3,073
Accrued employee costs    396     471
Other current liabilities    1,297     1,344
Liabilities held for sale         65
Total current liabilities    4,476     5,103
Non-current liabilities:
Long-term debt, less current portion    6,653     6,340
Operating lease liabilities    463     493
Deferred tax liabilities    616     677
Employee benefit obligations    224     201
Other non-current liabilities    481     471
Total non-current liabilities    8,437     8,182
Total liabilities    $    12,913     $    13,285
";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Financial Analysis Pipeline starting");

    let client = select_client();
    let registry = create_default_registry(client.clone());
    let executor = WorkflowExecutor::new(registry, client.clone());

    let workflow = workflows::amcor_quick_ratio();
    let task = "What is Amcor's quick ratio for FY2023 and FY2022?";

    info!(workflow = %workflow.name, task = %task, "Running workflow");

    match executor.run(task, AMCOR_DATA, &workflow).await {
        Ok(run) => {
            println!("\n=== ANALYSIS RESULT ===");
            println!("Task: {}", run.task);
            println!("\nStep transcript:");
            for (i, step) in run.steps.iter().enumerate() {
                println!(
                    "  {}. {}: {}",
                    i + 1,
                    step.handler,
                    step.output
                        .answer_text()
                        .unwrap_or_else(|| "(no answer)".to_string())
                );
            }
            println!("\nFinal answer:\n{}", run.final_answer);

            let reference = amcor_reference();
            let validator =
                FinancialDataValidator::with_reference_entries(vec![reference.clone()]);
            print_validation(&run, &validator);

            let evaluator = RunEvaluator::new(client);
            match evaluator.evaluate(&reference, &run).await {
                Ok(evaluation) => {
                    println!("\n=== REFERENCE EVALUATION ===");
                    println!("  Answer match: {}", evaluation.answer_match);
                    println!("  Justification match: {}", evaluation.justification_match);
                    println!("  {}", evaluation.explanation);
                }
                Err(e) => println!("\nReference evaluation unavailable: {}", e),
            }

            let path = runlog::save_run(&workflow.name, &run, Path::new("logs"))?;
            println!("\nAnalysis complete. Results saved to: {}", path.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("Workflow failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}

/// Picks a live provider when an API key is configured, otherwise falls
/// back to scripted responses so the demo runs offline. Live providers get
/// retries; the scripted double is deterministic and needs none.
fn select_client() -> Arc<dyn ModelClient> {
    if let Ok(client) = OpenAiClient::from_env() {
        info!("Using OpenAI provider");
        return Arc::new(RetryingClient::new(Arc::new(client), 3));
    }
    if let Ok(client) = AnthropicClient::from_env() {
        info!("Using Anthropic provider");
        return Arc::new(RetryingClient::new(Arc::new(client), 3));
    }
    info!("No provider key configured, using scripted offline responses");
    Arc::new(ScriptedClient::new(scripted_amcor_responses()))
}

/// Advisory checks over whatever figures the first (retrieval) step
/// produced: magnitude ranges plus comparison against the known-correct
/// Amcor values.
fn print_validation(run: &AnalysisRun, validator: &FinancialDataValidator) {
    let Some(fields) = run
        .steps
        .first()
        .and_then(|step| step.output.answer.as_ref())
        .and_then(|answer| answer.as_fields())
    else {
        return;
    };

    println!("\n=== RANGE VALIDATION ===");
    for (field, result) in validator.validate_range(fields) {
        println!("  {}: {} ({})", field, result.status, result.message);
    }

    println!("\n=== GROUND TRUTH COMPARISON ===");
    for (field, result) in validator.compare_with_reference("Amcor", fields) {
        println!("  {}: {} ({})", field, result.status, result.message);
    }
}

/// Known-correct figures and conclusion for the Amcor question, used both
/// for ground-truth comparison and as the judge's reference analysis.
fn amcor_reference() -> ReferenceEntry {
    let mut values = serde_json::Map::new();
    for (field, figure) in [
        ("Total Current Assets FY2023", 5308.0),
        ("Total Current Assets FY2022", 5853.0),
        ("Raw Materials and Supplies FY2023", 992.0),
        ("Raw Materials and Supplies FY2022", 1114.0),
        ("Work in Process and Finished Goods FY2023", 1221.0),
        ("Work in Process and Finished Goods FY2022", 1325.0),
        ("Total Current Liabilities FY2023", 4476.0),
        ("Total Current Liabilities FY2022", 5103.0),
    ] {
        values.insert(field.to_string(), serde_json::json!(figure));
    }

    ReferenceEntry {
        company: "Amcor".to_string(),
        answer: "Amcor's quick ratio improved from 0.67 in FY2022 to 0.69 in FY2023."
            .to_string(),
        justification: "Quick Ratio = (Total Current Assets - Inventories) / Total Current \
                        Liabilities. FY2023: (5308 - 992 - 1221) / 4476 = 0.69. FY2022: \
                        (5853 - 1114 - 1325) / 5103 = 0.67."
            .to_string(),
        values,
    }
}

/// Canned responses for one Amcor quick-ratio run: five specialist outputs,
/// the synthesis answer, then the judge verdict. The first two are
/// deliberately messy (fenced block, trailing comma) the way real model
/// output tends to be.
fn scripted_amcor_responses() -> Vec<String> {
    vec![
        r#"```json
{
  "explanation": "Extracted the requested line items from the consolidated balance sheets for FY2023 and FY2022.",
  "citation": "Amcor plc 10-K, Consolidated Balance Sheets",
  "answer": {
    "Total current assets FY2023": 5308,
    "Total current assets FY2022": 5853,
    "Raw materials and supplies FY2023": 992,
    "Raw materials and supplies FY2022": 1114,
    "Work in process and finished goods FY2023": 1221,
    "Work in process and finished goods FY2022": 1325,
    "Total current liabilities FY2023": 4476,
    "Total current liabilities FY2022": 5103
  }
}
```"#
            .to_string(),
        r#"{
  "explanation": "The quick ratio measures short-term liquidity using only assets readily convertible to cash.",
  "answer": "Quick Ratio = (Total Current Assets - Inventories) / Total Current Liabilities",
}"#
        .to_string(),
        r#"{
  "explanation": "Computed quick assets by subtracting both inventory components from total current assets for each year.",
  "answer": {
    "Quick assets FY2023": 3095,
    "Quick assets FY2022": 3414,
    "Total current liabilities FY2023": 4476,
    "Total current liabilities FY2022": 5103
  }
}"#
        .to_string(),
        r#"{
  "explanation": "Divided quick assets by current liabilities for each year, then computed the relative change.",
  "answer": {
    "Quick ratio FY2023": 0.69,
    "Quick ratio FY2022": 0.67,
    "Percentage change": 3.36
  }
}"#
        .to_string(),
        r#"{
  "explanation": "Compared the two ratios and validated the direction of the change.",
  "answer": "Amcor's quick ratio improved from 0.67 in FY2022 to 0.69 in FY2023, an increase of roughly 3.4%."
}"#
        .to_string(),
        "Amcor's quick ratio was 0.69 in FY2023 (quick assets of $3,095M against current \
         liabilities of $4,476M) and 0.67 in FY2022 (quick assets of $3,414M against \
         current liabilities of $5,103M). The ratio improved by about 3.4% year over \
         year, indicating slightly stronger short-term liquidity."
            .to_string(),
        r#"{
  "answer_match": true,
  "justification_match": true,
  "explanation": "Both analyses compute a quick ratio of 0.69 for FY2023 and 0.67 for FY2022 from the same balance sheet figures and agree the ratio improved."
}"#
        .to_string(),
    ]
}
