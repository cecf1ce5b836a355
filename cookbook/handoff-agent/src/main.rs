//! Triage agent that hands billing questions to a specialist.
//!
//! Reads `turnstile.toml` when present, otherwise defaults plus `TURNSTILE_*` variables. Without
//! an API key the demo runs against a scripted model so it works offline.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use turnstile::{
    init_tracing, Agent, ContextVariables, FunctionTool, LanguageModel, ModelCompletion,
    OpenAIClient, PiiDetector, RunRequest, Runner, RuntimeConfig, StubModel, ToolCallRequest,
    ToolError, ToolOutput, Usage,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = Path::new("turnstile.toml");
    let config = if config_path.exists() {
        RuntimeConfig::from_env_or_file(config_path)?
    } else {
        RuntimeConfig::from_env()?
    };
    init_tracing(&config.logging)?;

    let billing = Arc::new(
        Agent::new("billing")
            .with_model(config.model.model.clone())
            .with_instructions("You answer invoice and payment questions. Use the tools.")
            .with_tool(
                FunctionTool::sync("invoice_total", "Total of the customer's last invoice", |_, vars| {
                    let customer = vars
                        .get("customer_id")
                        .ok_or_else(|| ToolError::failed("no customer in context"))?;
                    Ok(json!({ "customer": customer, "total_eur": 129.5 }).into())
                })
                .with_parameters(json!({"type": "object", "properties": {}})),
            ),
    );

    let target = Arc::clone(&billing);
    let triage = Agent::new("triage")
        .with_model(config.model.model.clone())
        .with_instructions("Route billing questions to the billing agent; answer everything else.")
        .with_input_guardrail(Arc::new(PiiDetector::new()))
        .with_tool(FunctionTool::sync(
            "transfer_to_billing",
            "Hand the conversation to the billing specialist",
            move |_, _| Ok(ToolOutput::handoff(Arc::clone(&target))),
        ));

    let model: Arc<dyn LanguageModel> = match config.model.api_key {
        Some(_) => Arc::new(OpenAIClient::from_config(&config.model)?),
        None => StubModel::new(vec![
            ModelCompletion::tool_calls(vec![ToolCallRequest::new("call_1", "transfer_to_billing", "{}")])
                .with_usage(Usage::new(52, 11, 63)),
            ModelCompletion::tool_calls(vec![ToolCallRequest::new("call_2", "invoice_total", "{}")])
                .with_usage(Usage::new(71, 9, 80)),
            ModelCompletion::text("Your last invoice came to EUR 129.50.").with_usage(Usage::new(96, 14, 110)),
        ]),
    };

    let sessions = config.session.open()?;
    let vars: ContextVariables = [("customer_id", "cust-0042")].into_iter().collect();
    let request = RunRequest::user(triage, "How much was my last invoice?")
        .with_config(config.run.to_run_config())
        .with_context_variables(vars)
        .with_session(sessions, "demo-conversation");

    let result = Runner::new(model).run(request).await?;

    println!("[{}] {}", result.agent.name(), result.final_output);
    for step in &result.steps {
        let tools: Vec<_> = step.tool_calls.iter().map(|call| call.tool_name.as_str()).collect();
        println!("  step {} ({}) tools={:?}", step.step_number, step.agent_name, tools);
    }
    println!(
        "  tokens: prompt={} completion={} total={}",
        result.usage.prompt_tokens, result.usage.completion_tokens, result.usage.total_tokens
    );
    Ok(())
}
