//! Document classification pipeline: one strict-JSON classifier prompt.

use std::sync::Arc;
use tracing::info;

use crate::document::extract_document_text;
use crate::extraction::{complete_job, fail_job};
use crate::handlers::{AppState, JobContext};
use crate::job_store::{JobStatus, JobStore};
use crate::openai::structured_result;
use crate::tokens::{approx_tokens_from_chars, max_output_tokens, Operation};

pub fn build_classify_prompt(document_text: &str) -> String {
    format!(
        r#"You are a strict classifier. Analyze the following text and return ONLY a valid JSON object:

{{
  "resume_likelihood": 0.0,
  "toxic_free_likelihood": 0.0
}}

Definitions:
- resume_likelihood: probability [0..1] that the document resembles a resume/CV.
- toxic_free_likelihood: probability [0..1] that the document contains NO toxic/hateful content.

Constraints:
- JSON only (no prose, no explanation).

--- START OF TEXT ---
{document_text}
--- END OF TEXT ---"#
    )
}

pub async fn process_classification(
    state: Arc<AppState>,
    job_id: String,
    ctx: JobContext,
    file: Vec<u8>,
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

    let document_text = match extract_document_text(&file) {
        Ok(text) => text,
        Err(e) => {
            fail_job(&state, &job_id, e.to_string()).await;
            return;
        }
    };
    let input_tokens = approx_tokens_from_chars(document_text.len());
    state
        .store
        .update(&job_id, JobStatus::Processing, Some(40), None, None)
        .await;

    let budget = max_output_tokens(input_tokens, Operation::Classify, ctx.max_output_tokens);
    let prompt = build_classify_prompt(&document_text);

    let outcome = state
        .gateway
        .invoke(&ctx.credential, &ctx.model, &prompt, Some(budget), ctx.deterministic)
        .await
        .and_then(|response| structured_result(&response));

    match outcome {
        Ok(result) => {
            info!(job_id, "classification completed");
            complete_job(&state, &job_id, result).await;
        }
        Err(e) => fail_job(&state, &job_id, e.to_string()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifier_prompt_wraps_the_document() {
        let prompt = build_classify_prompt("SOME TEXT");
        assert!(prompt.contains("resume_likelihood"));
        assert!(prompt.contains("toxic_free_likelihood"));
        assert!(prompt.contains("--- START OF TEXT ---\nSOME TEXT\n--- END OF TEXT ---"));
    }
}
