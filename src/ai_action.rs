//! AI-assisted editing action pipeline: a free-form prompt with placeholder
//! substitution over the optional document text and caller-provided JSON.

use std::sync::Arc;
use tracing::info;

use crate::document::extract_document_text;
use crate::extraction::{complete_job, fail_job};
use crate::handlers::{AppState, JobContext};
use crate::job_store::{JobStatus, JobStore};
use crate::openai::structured_result;
use crate::prompts::{DOCUMENT_PLACEHOLDER, RESUME_JSON_PLACEHOLDER};
use crate::tokens::{approx_tokens_from_chars, max_output_tokens, Operation};

#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub action_type: String,
    pub tab: String,
    pub prompt: Option<String>,
    pub resume_json: String,
}

/// Fill the action prompt. The prompt already carries whatever context it
/// needs; only the two placeholders are substituted.
pub fn build_action_prompt(action: &ActionRequest, document_text: &str) -> String {
    let base = match &action.prompt {
        Some(prompt) if !prompt.is_empty() => prompt.clone(),
        _ => format!(
            "Perform action '{}' on tab '{}' using provided resume JSON and optional document text.",
            action.action_type, action.tab
        ),
    };
    base.replace(DOCUMENT_PLACEHOLDER, document_text)
        .replace(RESUME_JSON_PLACEHOLDER, &action.resume_json)
}

pub async fn process_ai_action(
    state: Arc<AppState>,
    job_id: String,
    ctx: JobContext,
    action: ActionRequest,
    file: Option<Vec<u8>>,
) {
    state
        .store
        .update(&job_id, JobStatus::Processing, Some(10), None, None)
        .await;

    let _active = match state.jobs.try_begin(&ctx.user_id, &ctx.credential) {
        Ok(guard) => guard,
        Err(reason) => {
            fail_job(&state, &job_id, format!("Rate limit exceeded: {reason}")).await;
            return;
        }
    };

    let document_text = match &file {
        Some(content) => match extract_document_text(content) {
            Ok(text) => text,
            Err(e) => {
                fail_job(&state, &job_id, e.to_string()).await;
                return;
            }
        },
        None => String::new(),
    };

    let combined_len = document_text.len() + action.resume_json.len();
    let input_tokens = approx_tokens_from_chars(combined_len);
    state
        .store
        .update(&job_id, JobStatus::Processing, Some(40), None, None)
        .await;

    // Output budget scales with combined input, like extraction.
    let budget = max_output_tokens(input_tokens, Operation::Extract, ctx.max_output_tokens);
    let prompt = build_action_prompt(&action, &document_text);

    let outcome = state
        .gateway
        .invoke(&ctx.credential, &ctx.model, &prompt, Some(budget), ctx.deterministic)
        .await
        .and_then(|response| structured_result(&response));

    match outcome {
        Ok(result) => {
            info!(job_id, action_type = %action.action_type, "ai action completed");
            complete_job(&state, &job_id, result).await;
        }
        Err(e) => fail_job(&state, &job_id, e.to_string()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(prompt: Option<&str>) -> ActionRequest {
        ActionRequest {
            action_type: "rewrite".to_string(),
            tab: "experience".to_string(),
            prompt: prompt.map(String::from),
            resume_json: r#"{"name":"Ada"}"#.to_string(),
        }
    }

    #[test]
    fn placeholders_are_substituted() {
        let filled = build_action_prompt(
            &action(Some("Doc: {{PDF_TEXT}} Resume: {{USER_RESUME_JSON}}")),
            "BODY",
        );
        assert_eq!(filled, r#"Doc: BODY Resume: {"name":"Ada"}"#);
    }

    #[test]
    fn missing_prompt_falls_back_to_action_description() {
        let filled = build_action_prompt(&action(None), "");
        assert!(filled.contains("'rewrite'"));
        assert!(filled.contains("'experience'"));
    }
}
