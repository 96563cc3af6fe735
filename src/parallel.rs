//! Batch extraction fan-out: one gateway call per prompt item, launches
//! staggered to avoid a thundering herd on the RPM window, results merged
//! into a single document in a fixed key order.

use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::warn;

use crate::gateway::AiGateway;
use crate::openai::structured_result;
use crate::prompts::{build_prompt, PromptItem};

/// Merge order for the well-known extraction sections.
pub const DESIRED_KEY_ORDER: &[&str] = &[
    "contact",
    "soft_skills",
    "tech_skills",
    "about",
    "experience",
    "projects",
    "education",
    "certifications",
];

struct PromptOutcome {
    prompt_type: String,
    result: Result<Value, String>,
}

pub async fn execute_parallel_extraction(
    gateway: Arc<AiGateway>,
    prompts_dir: String,
    stagger: Duration,
    document_text: String,
    items: Vec<PromptItem>,
    credential: String,
    model: String,
    max_output_tokens: u32,
    deterministic: bool,
) -> Value {
    let mut set = JoinSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let gateway = Arc::clone(&gateway);
        let prompts_dir = prompts_dir.clone();
        let document_text = document_text.clone();
        let credential = credential.clone();
        let model = model.clone();

        set.spawn(async move {
            if index > 0 {
                sleep(stagger * index as u32).await;
            }
            let prompt_type = item.prompt_type.clone();
            let result = run_one(
                &gateway,
                &prompts_dir,
                &document_text,
                &item,
                &credential,
                &model,
                max_output_tokens,
                deterministic,
            )
            .await;
            PromptOutcome {
                prompt_type,
                result,
            }
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => warn!(error = %e, "extraction task panicked"),
        }
    }

    merge_outcomes(outcomes)
}

#[allow(clippy::too_many_arguments)]
async fn run_one(
    gateway: &AiGateway,
    prompts_dir: &str,
    document_text: &str,
    item: &PromptItem,
    credential: &str,
    model: &str,
    max_output_tokens: u32,
    deterministic: bool,
) -> Result<Value, String> {
    let prompt = build_prompt(prompts_dir, document_text, item).map_err(|e| e.to_string())?;
    let response = gateway
        .invoke(credential, model, &prompt, Some(max_output_tokens), deterministic)
        .await
        .map_err(|e| e.to_string())?;
    structured_result(&response).map_err(|e| e.to_string())
}

/// Pick each well-known key from the first successful prompt that produced
/// it, append any remaining keys, and collect per-prompt failures under
/// `_execution_errors`.
fn merge_outcomes(outcomes: Vec<PromptOutcome>) -> Value {
    let mut merged = Map::new();

    for key in DESIRED_KEY_ORDER {
        for outcome in &outcomes {
            if let Ok(Value::Object(data)) = &outcome.result {
                if let Some(value) = data.get(*key) {
                    merged.insert((*key).to_string(), value.clone());
                    break;
                }
            }
        }
    }

    let mut failures = Vec::new();
    for outcome in &outcomes {
        match &outcome.result {
            Ok(Value::Object(data)) => {
                for (key, value) in data {
                    if !merged.contains_key(key) {
                        merged.insert(key.clone(), value.clone());
                    }
                }
            }
            Ok(other) => {
                // Non-object payloads are kept under the prompt's own type
                merged
                    .entry(outcome.prompt_type.clone())
                    .or_insert_with(|| other.clone());
            }
            Err(error) => failures.push(json!({
                "prompt_type": outcome.prompt_type,
                "error": error,
            })),
        }
    }

    if !failures.is_empty() {
        merged.insert("_execution_errors".to_string(), Value::Array(failures));
    }

    Value::Object(merged)
}
